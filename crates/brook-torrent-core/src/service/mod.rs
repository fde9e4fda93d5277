//! Collaborator interfaces consumed by the download creation pipeline.

use std::sync::{Arc, Mutex};

use brook_bencode::Value;
use brook_runtime::{Clock, SessionLog, TaskQueue};
use tracing::warn;

use crate::error::PipelineResult;
use crate::model::{InfoHash, SharedDownload, Source};

/// Registry owning all active downloads, keyed by info hash.
///
/// `construct` hands the caller an unregistered download; ownership
/// transfers to the registry on a successful `insert`. A download whose
/// insertion is rejected must be destroyed by the caller (dropping the
/// handle).
pub trait DownloadRegistry: Send {
    /// Parse and validate a source into an unregistered download.
    ///
    /// # Errors
    ///
    /// Fails with a construction error when the document is malformed or
    /// otherwise rejected.
    fn construct(&mut self, source: Source) -> PipelineResult<SharedDownload>;

    /// Register a constructed download. Returns `false` when the registry
    /// rejects it (e.g. a duplicate info hash).
    fn insert(&mut self, download: SharedDownload) -> bool;

    /// Look up a registered download.
    fn find(&self, hash: &InfoHash) -> Option<SharedDownload>;

    /// Remove a registered download. Returns whether it was present.
    fn erase(&mut self, hash: &InfoHash) -> bool;

    /// Whether a download with this hash is registered.
    fn contains(&self, hash: &InfoHash) -> bool {
        self.find(hash).is_some()
    }
}

/// Named-operation execution service (the RPC surface).
///
/// Global queries pass no target; per-download operations target the
/// download handle, which may or may not be registered yet.
pub trait CommandLayer: Send {
    /// Execute a named command.
    ///
    /// # Errors
    ///
    /// Fails with a command error when the command is unknown or its
    /// execution is rejected.
    fn execute(
        &mut self,
        name: &str,
        args: &[Value],
        target: Option<&SharedDownload>,
    ) -> PipelineResult<Value>;

    /// Execute a textual `name=arg,...` command as supplied by the user.
    ///
    /// # Errors
    ///
    /// Fails with a command error, as [`CommandLayer::execute`].
    fn execute_raw(
        &mut self,
        command: &str,
        target: Option<&SharedDownload>,
    ) -> PipelineResult<Value> {
        let (name, rest) = command
            .split_once('=')
            .unwrap_or((command, ""));
        let args: Vec<Value> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(Value::from).collect()
        };
        self.execute(name.trim(), &args, target)
    }

    /// Fire a named event, logging any failure instead of returning it.
    fn execute_catching(
        &mut self,
        event: &str,
        target: Option<&SharedDownload>,
        log_prefix: &str,
    ) {
        if let Err(err) = self.execute(event, &[], target) {
            warn!(event, error = %err, "{log_prefix}{err}");
        }
    }
}

/// Asynchronous fetch service for network sources.
pub trait FetchQueue: Send {
    /// Start fetching `uri`. The returned handle fires exactly one of its
    /// done or failed callbacks when the transfer settles.
    fn enqueue(&mut self, uri: &str) -> FetchHandle;
}

type DoneCallback = Box<dyn FnOnce(Vec<u8>) + Send>;
type FailedCallback = Box<dyn FnOnce(String) + Send>;

enum FetchOutcome {
    Done(Vec<u8>),
    Failed(String),
}

#[derive(Default)]
struct FetchShared {
    done: Option<DoneCallback>,
    failed: Option<FailedCallback>,
    outcome: Option<FetchOutcome>,
    delivered: bool,
}

impl FetchShared {
    /// Pull out the callback matching the settled outcome, once both exist.
    fn take_delivery(&mut self) -> Option<Box<dyn FnOnce() + Send>> {
        if self.delivered {
            return None;
        }
        match &self.outcome {
            Some(FetchOutcome::Done(_)) if self.done.is_some() => {
                self.delivered = true;
                let callback = self.done.take().expect("done callback present");
                let Some(FetchOutcome::Done(buffer)) = self.outcome.take() else {
                    unreachable!("outcome variant checked above");
                };
                Some(Box::new(move || callback(buffer)))
            }
            Some(FetchOutcome::Failed(_)) if self.failed.is_some() => {
                self.delivered = true;
                let callback = self.failed.take().expect("failed callback present");
                let Some(FetchOutcome::Failed(message)) = self.outcome.take() else {
                    unreachable!("outcome variant checked above");
                };
                Some(Box::new(move || callback(message)))
            }
            _ => None,
        }
    }
}

/// Handle to one in-flight fetch.
///
/// Callers register at most one done and one failed callback; the fetch
/// implementation settles the handle at most once, firing whichever
/// callback matches the outcome. The callbacks are mutually exclusive, and
/// an outcome that settles before its callback is registered is delivered
/// upon registration.
#[derive(Clone, Default)]
pub struct FetchHandle {
    shared: Arc<Mutex<FetchShared>>,
}

impl FetchHandle {
    /// Construct an unsettled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn deliver_if_ready(&self) {
        let delivery = self
            .shared
            .lock()
            .expect("fetch handle mutex poisoned")
            .take_delivery();
        if let Some(delivery) = delivery {
            delivery();
        }
    }

    /// Register the success callback, receiving the accumulated buffer.
    ///
    /// # Panics
    ///
    /// Panics if a done callback was already registered.
    pub fn on_done(&self, callback: impl FnOnce(Vec<u8>) + Send + 'static) {
        {
            let mut shared = self.shared.lock().expect("fetch handle mutex poisoned");
            assert!(
                shared.done.is_none() && !shared.delivered,
                "fetch handle already has a done callback"
            );
            shared.done = Some(Box::new(callback));
        }
        self.deliver_if_ready();
    }

    /// Register the failure callback, receiving the failure message.
    ///
    /// # Panics
    ///
    /// Panics if a failed callback was already registered.
    pub fn on_failed(&self, callback: impl FnOnce(String) + Send + 'static) {
        {
            let mut shared = self.shared.lock().expect("fetch handle mutex poisoned");
            assert!(
                shared.failed.is_none(),
                "fetch handle already has a failed callback"
            );
            shared.failed = Some(Box::new(callback));
        }
        self.deliver_if_ready();
    }

    /// Settle the fetch successfully with the accumulated buffer.
    ///
    /// # Panics
    ///
    /// Panics if the handle mutex has been poisoned.
    pub fn complete(&self, buffer: Vec<u8>) {
        {
            let mut shared = self.shared.lock().expect("fetch handle mutex poisoned");
            if shared.outcome.is_some() || shared.delivered {
                return;
            }
            shared.outcome = Some(FetchOutcome::Done(buffer));
        }
        self.deliver_if_ready();
    }

    /// Settle the fetch with a failure message.
    ///
    /// # Panics
    ///
    /// Panics if the handle mutex has been poisoned.
    pub fn fail(&self, message: impl Into<String>) {
        {
            let mut shared = self.shared.lock().expect("fetch handle mutex poisoned");
            if shared.outcome.is_some() || shared.delivered {
                return;
            }
            shared.outcome = Some(FetchOutcome::Failed(message.into()));
        }
        self.deliver_if_ready();
    }
}

/// Explicitly injected handles to every shared facility the pipeline uses.
///
/// Owned by the process entry point and cloned into each factory; there is
/// no ambient global state.
#[derive(Clone)]
pub struct PipelineContext {
    /// Global time-ordered task queue.
    pub queue: TaskQueue,
    /// Cached current time.
    pub clock: Clock,
    /// Shared user-visible log.
    pub log: SessionLog,
    /// The download registry.
    pub registry: Arc<Mutex<dyn DownloadRegistry>>,
    /// The command layer.
    pub commands: Arc<Mutex<dyn CommandLayer>>,
    /// The network fetch queue.
    pub fetch: Arc<Mutex<dyn FetchQueue>>,
}
