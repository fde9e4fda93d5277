//! Shared, user-visible log line buffer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::info;

/// Default number of retained log lines.
const DEFAULT_CAPACITY: usize = 1_024;

/// One retained log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Unix timestamp the line was recorded at.
    pub timestamp: i64,
    /// The formatted message.
    pub message: String,
}

/// Bounded ring buffer of client log lines.
///
/// This is the buffer surfaced to the user (and inspected by tests); lines
/// are additionally mirrored to the `tracing` subscriber. When full, the
/// oldest lines are dropped.
#[derive(Debug, Clone)]
pub struct SessionLog {
    inner: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl SessionLog {
    /// Construct a log retaining at most `capacity` lines.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "session log capacity must be positive");
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Construct a log with the default retention.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Append a line stamped with `timestamp`.
    ///
    /// # Panics
    ///
    /// Panics if the log mutex has been poisoned.
    pub fn push(&self, timestamp: i64, message: impl Into<String>) {
        let message = message.into();
        info!(target: "brook::session", timestamp, message = %message);

        let mut lines = self.inner.lock().expect("session log mutex poisoned");
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(LogEntry { timestamp, message });
    }

    /// Snapshot of the retained lines, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the log mutex has been poisoned.
    #[must_use]
    pub fn lines(&self) -> Vec<LogEntry> {
        self.inner
            .lock()
            .expect("session log mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Whether any retained line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|entry| entry.message.contains(needle))
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_lines_in_order() {
        let log = SessionLog::new();
        log.push(1, "first");
        log.push(2, "second");

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "first");
        assert_eq!(lines[1].message, "second");
        assert!(log.contains("second"));
        assert!(!log.contains("third"));
    }

    #[test]
    fn oldest_lines_drop_at_capacity() {
        let log = SessionLog::with_capacity(2);
        log.push(1, "a");
        log.push(2, "b");
        log.push(3, "c");

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "b");
        assert_eq!(lines[1].message, "c");
    }
}
