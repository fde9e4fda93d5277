//! Global time-ordered task queue.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

/// One-shot scheduled action.
type Task = Box<dyn FnOnce() + Send>;

/// Ordering key: schedule time first, then insertion order, so tasks tagged
/// with the same timestamp fire FIFO-by-schedule-time.
type Key = (i64, u64);

#[derive(Default)]
struct Inner {
    entries: BTreeMap<Key, Task>,
    next_seq: u64,
}

/// Time-ordered queue of one-shot tasks.
///
/// The queue itself never blocks and never spawns: callers drive it by
/// calling [`TaskQueue::perform`] with the current time, which runs every
/// task due at or before that instant. Tasks run outside the queue lock, so
/// they are free to schedule or cancel further work.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
}

impl TaskQueue {
    /// Construct an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to fire at unix time `when`.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex has been poisoned.
    pub fn schedule_at(&self, when: i64, task: impl FnOnce() + Send + 'static) -> TaskHandle {
        let mut inner = self.inner.lock().expect("task queue mutex poisoned");
        let key = (when, inner.next_seq);
        inner.next_seq += 1;
        inner.entries.insert(key, Box::new(task));
        TaskHandle {
            queue: Arc::downgrade(&self.inner),
            key,
        }
    }

    /// Run every task due at or before `now`, in `(time, insertion)` order.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex has been poisoned.
    pub fn perform(&self, now: i64) {
        loop {
            let task = {
                let mut inner = self.inner.lock().expect("task queue mutex poisoned");
                let due = inner
                    .entries
                    .first_key_value()
                    .filter(|((when, _), _)| *when <= now)
                    .map(|(key, _)| *key);
                match due {
                    Some(key) => inner.entries.remove(&key),
                    None => break,
                }
            };
            if let Some(task) = task {
                task();
            }
        }
    }

    /// Number of tasks still pending.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex has been poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("task queue mutex poisoned").entries.len()
    }

    /// Whether no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one scheduled task, usable to remove it before it fires.
///
/// Dropping the handle does not cancel the task; owners that must not
/// outlive their scheduled work call [`TaskHandle::cancel`] explicitly.
pub struct TaskHandle {
    queue: Weak<Mutex<Inner>>,
    key: Key,
}

impl TaskHandle {
    /// Remove the task from the queue. A no-op when the task already fired
    /// or the queue is gone.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex has been poisoned.
    pub fn cancel(&self) {
        if let Some(inner) = self.queue.upgrade() {
            inner
                .lock()
                .expect("task queue mutex poisoned")
                .entries
                .remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce() + Send>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = {
            let seen = seen.clone();
            move |label: &'static str| -> Box<dyn FnOnce() + Send> {
                let seen = seen.clone();
                Box::new(move || seen.lock().unwrap().push(label))
            }
        };
        (seen, record)
    }

    #[test]
    fn fires_in_time_then_fifo_order() {
        let queue = TaskQueue::new();
        let (seen, record) = recorder();

        queue.schedule_at(10, record("b"));
        queue.schedule_at(5, record("a"));
        queue.schedule_at(10, record("c"));

        queue.perform(10);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn only_due_tasks_fire() {
        let queue = TaskQueue::new();
        let (seen, record) = recorder();

        queue.schedule_at(1, record("now"));
        queue.schedule_at(100, record("later"));

        queue.perform(1);
        assert_eq!(*seen.lock().unwrap(), vec!["now"]);
        assert_eq!(queue.len(), 1);

        queue.perform(100);
        assert_eq!(*seen.lock().unwrap(), vec!["now", "later"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_tasks_never_fire() {
        let queue = TaskQueue::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = {
            let fired = fired.clone();
            queue.schedule_at(1, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        handle.cancel();
        queue.perform(1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Cancelling after the fact is a harmless no-op.
        handle.cancel();
    }

    #[test]
    fn tasks_may_schedule_more_tasks() {
        let queue = TaskQueue::new();
        let (seen, record) = recorder();

        {
            let queue_again = queue.clone();
            let nested = record("nested");
            queue.schedule_at(1, move || {
                queue_again.schedule_at(1, nested);
            });
        }

        queue.perform(1);
        assert_eq!(*seen.lock().unwrap(), vec!["nested"]);
    }
}
