//! The download factory: rendezvous scheduling and failure handling.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use brook_bencode::Value;
use brook_runtime::TaskHandle;
use brook_torrent_core::{InfoHash, PipelineContext, PipelineError, PipelineResult, Source};
use tracing::warn;

use crate::{initialize, resolver};

const STATE_POISONED: &str = "factory state mutex poisoned";

/// Outcome notification closure, invoked exactly once per factory.
type OutcomeCallback = Box<dyn FnOnce() + Send>;

/// One download creation request.
///
/// A factory is populated (flags, variables, commands), then driven by
/// [`DownloadFactory::load`] (or [`DownloadFactory::load_raw_data`]) and
/// [`DownloadFactory::commit`]. Load and commit complete independently and
/// in either order; when both have completed the merge-and-initialize
/// pipeline runs. Success or failure, the outcome callback fires exactly
/// once. Dropping the factory cancels any still-pending scheduled task.
pub struct DownloadFactory {
    ctx: PipelineContext,
    state: Arc<Mutex<FactoryState>>,
    load_task: Option<TaskHandle>,
    commit_task: Option<TaskHandle>,
}

pub(crate) struct FactoryState {
    pub(crate) uri: String,
    pub(crate) source: Option<Source>,
    pub(crate) variables: BTreeMap<String, Value>,
    pub(crate) commands: Vec<String>,
    pub(crate) loaded: bool,
    pub(crate) committed: bool,
    pub(crate) succeeded: bool,
    pub(crate) immediate: bool,
    pub(crate) session: bool,
    pub(crate) start: bool,
    pub(crate) print_log: bool,
    pub(crate) is_file: bool,
    pub(crate) result: Option<InfoHash>,
    pub(crate) outcome: Option<OutcomeCallback>,
    pub(crate) pending_error: Option<PipelineError>,
}

impl DownloadFactory {
    /// Construct a factory, seeding per-download variables from the global
    /// defaults.
    ///
    /// # Panics
    ///
    /// Panics if a collaborator mutex has been poisoned.
    #[must_use]
    pub fn new(ctx: PipelineContext) -> Self {
        let directory = ctx
            .commands
            .lock()
            .expect("command layer mutex poisoned")
            .execute("directory.default", &[], None)
            .unwrap_or_else(|_| Value::from(""));

        let mut variables = BTreeMap::new();
        variables.insert("connection_leech".to_string(), Value::from(""));
        variables.insert("connection_seed".to_string(), Value::from(""));
        variables.insert("directory".to_string(), directory);
        variables.insert("tied_to_file".to_string(), Value::from(false));

        Self {
            ctx,
            state: Arc::new(Mutex::new(FactoryState {
                uri: String::new(),
                source: None,
                variables,
                commands: Vec::new(),
                loaded: false,
                committed: false,
                succeeded: false,
                immediate: false,
                session: false,
                start: false,
                print_log: true,
                is_file: false,
                result: None,
                outcome: None,
                pending_error: None,
            })),
            load_task: None,
            commit_task: None,
        }
    }

    /// Drain the task queue synchronously after each request, giving the
    /// caller a blocking call on the same code path as the deferred case.
    pub fn set_immediate(&mut self, immediate: bool) {
        self.state.lock().expect(STATE_POISONED).immediate = immediate;
    }

    /// Mark this creation as a session restore rather than a new addition.
    pub fn set_session(&mut self, session: bool) {
        self.state.lock().expect(STATE_POISONED).session = session;
    }

    /// Desired started/stopped state once the download is registered.
    pub fn set_start(&mut self, start: bool) {
        self.state.lock().expect(STATE_POISONED).start = start;
    }

    /// Whether failures are appended to the shared session log.
    pub fn set_print_log(&mut self, print_log: bool) {
        self.state.lock().expect(STATE_POISONED).print_log = print_log;
    }

    /// Register the outcome notification, fired exactly once on success or
    /// failure.
    pub fn set_outcome(&mut self, outcome: impl FnOnce() + Send + 'static) {
        self.state.lock().expect(STATE_POISONED).outcome = Some(Box::new(outcome));
    }

    /// Append a post-creation command, executed in order against the new
    /// download after insertion.
    pub fn push_command(&mut self, command: impl Into<String>) {
        self.state
            .lock()
            .expect(STATE_POISONED)
            .commands
            .push(command.into());
    }

    /// Override a per-download variable (e.g. `directory`, `tied_to_file`,
    /// `connection_leech`).
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.state
            .lock()
            .expect(STATE_POISONED)
            .variables
            .insert(key.into(), value.into());
    }

    /// The URI this factory was asked to load, empty for raw-data preloads.
    #[must_use]
    pub fn uri(&self) -> String {
        self.state.lock().expect(STATE_POISONED).uri.clone()
    }

    /// Info hash of the created download. Populated only for a successful
    /// immediate-mode creation.
    #[must_use]
    pub fn result(&self) -> Option<InfoHash> {
        self.state.lock().expect(STATE_POISONED).result
    }

    /// Schedule resolution of `uri` on the global task queue.
    ///
    /// # Errors
    ///
    /// In immediate mode, a source failure that occurs while draining the
    /// queue is returned to the caller; deferred failures are reported via
    /// the outcome notification only.
    ///
    /// # Panics
    ///
    /// Panics if a source is already attached (load requested twice, or
    /// after a raw-data preload).
    pub fn load(&mut self, uri: impl Into<String>) -> PipelineResult<()> {
        self.state.lock().expect(STATE_POISONED).uri = uri.into();

        let ctx = self.ctx.clone();
        let state = Arc::downgrade(&self.state);
        let when = self.ctx.clock.seconds();
        self.load_task = Some(self.ctx.queue.schedule_at(when, move || {
            if let Some(state) = state.upgrade() {
                receive_load(&ctx, &state);
            }
        }));

        self.perform_if_immediate()
    }

    /// Attach an already-retrieved metadata blob, skipping source
    /// classification. Must be called before any load is requested.
    ///
    /// # Panics
    ///
    /// Panics if a source is already attached.
    pub fn load_raw_data(&mut self, input: Vec<u8>) {
        let mut state = self.state.lock().expect(STATE_POISONED);
        assert!(
            state.source.is_none(),
            "DownloadFactory::load*() called with a source already attached"
        );
        state.source = Some(Source::Stream(input));
        state.loaded = true;
    }

    /// Declare intent to finalize; schedules the commit half of the
    /// rendezvous.
    ///
    /// # Errors
    ///
    /// In immediate mode, a failure that occurs while draining the queue is
    /// returned to the caller.
    pub fn commit(&mut self) -> PipelineResult<()> {
        let ctx = self.ctx.clone();
        let state = Arc::downgrade(&self.state);
        let when = self.ctx.clock.seconds();
        self.commit_task = Some(self.ctx.queue.schedule_at(when, move || {
            if let Some(state) = state.upgrade() {
                receive_commit(&ctx, &state);
            }
        }));

        self.perform_if_immediate()
    }

    fn perform_if_immediate(&self) -> PipelineResult<()> {
        let immediate = self.state.lock().expect(STATE_POISONED).immediate;
        if immediate {
            self.ctx.queue.perform(self.ctx.clock.seconds());
        }
        match self.state.lock().expect(STATE_POISONED).pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for DownloadFactory {
    fn drop(&mut self) {
        // A factory must not outlive its scheduled tasks.
        if let Some(task) = self.load_task.take() {
            task.cancel();
        }
        if let Some(task) = self.commit_task.take() {
            task.cancel();
        }
    }
}

fn receive_load(ctx: &PipelineContext, state: &Arc<Mutex<FactoryState>>) {
    let uri = {
        let state = state.lock().expect(STATE_POISONED);
        assert!(
            state.source.is_none(),
            "DownloadFactory::load*() called with a source already attached"
        );
        state.uri.clone()
    };

    if resolver::is_data_uri(&uri) {
        receive_failed(
            ctx,
            state,
            PipelineError::transport("Data URIs are not supported"),
        );
    } else if resolver::is_magnet_uri(&uri) {
        {
            let mut state = state.lock().expect(STATE_POISONED);
            state.source = Some(Source::Document(resolver::synthesize_magnet(&uri)));
            state
                .variables
                .insert("tied_to_file".to_string(), Value::from(false));
        }
        receive_loaded(ctx, state);
    } else if resolver::is_network_uri(&uri) {
        state
            .lock()
            .expect(STATE_POISONED)
            .variables
            .insert("tied_to_file".to_string(), Value::from(false));

        let handle = ctx
            .fetch
            .lock()
            .expect("fetch queue mutex poisoned")
            .enqueue(&uri);

        {
            let ctx = ctx.clone();
            let state = Arc::downgrade(state);
            handle.on_done(move |buffer| {
                if let Some(state) = state.upgrade() {
                    state.lock().expect(STATE_POISONED).source = Some(Source::Stream(buffer));
                    receive_loaded(&ctx, &state);
                }
            });
        }
        {
            let ctx = ctx.clone();
            let state = Arc::downgrade(state);
            handle.on_failed(move |message| {
                if let Some(state) = state.upgrade() {
                    receive_failed(&ctx, &state, PipelineError::transport(message));
                }
            });
        }
    } else {
        match resolver::load_local_file(&uri) {
            Ok(document) => {
                {
                    let mut state = state.lock().expect(STATE_POISONED);
                    state.source = Some(Source::Document(document));
                    state.is_file = true;
                }
                receive_loaded(ctx, state);
            }
            Err(error) => receive_failed(ctx, state, error),
        }
    }
}

fn receive_loaded(ctx: &PipelineContext, state: &Arc<Mutex<FactoryState>>) {
    let committed = {
        let mut state = state.lock().expect(STATE_POISONED);
        state.loaded = true;
        state.committed
    };
    if committed {
        receive_success(ctx, state);
    }
}

fn receive_commit(ctx: &PipelineContext, state: &Arc<Mutex<FactoryState>>) {
    let loaded = {
        let mut state = state.lock().expect(STATE_POISONED);
        state.committed = true;
        if !state.loaded {
            // A commit that cannot complete synchronously must not be
            // waited on.
            state.immediate = false;
        }
        state.loaded
    };
    if loaded {
        receive_success(ctx, state);
    }
}

fn receive_success(ctx: &PipelineContext, state: &Arc<Mutex<FactoryState>>) {
    {
        let mut state = state.lock().expect(STATE_POISONED);
        if state.succeeded {
            return;
        }
        state.succeeded = true;
    }
    initialize::run(ctx, state);
}

/// Single failure entry point: log, notify, and escalate when an immediate
/// caller is waiting synchronously for a definitive answer.
pub(crate) fn receive_failed(
    ctx: &PipelineContext,
    state: &Arc<Mutex<FactoryState>>,
    error: PipelineError,
) {
    let (print_log, uri, immediate, outcome) = {
        let mut state = state.lock().expect(STATE_POISONED);
        (
            state.print_log,
            state.uri.clone(),
            state.immediate,
            state.outcome.take(),
        )
    };

    warn!(uri = %uri, error = %error, "download creation failed");
    if print_log {
        ctx.log
            .push(ctx.clock.seconds(), format!("{error}: \"{uri}\""));
    }

    if let Some(outcome) = outcome {
        outcome();
    }

    if immediate && error.is_escalatable() {
        state.lock().expect(STATE_POISONED).pending_error = Some(error);
    }
}

/// Deliver the outcome notification, at most once.
pub(crate) fn fire_outcome(state: &Arc<Mutex<FactoryState>>) {
    let outcome = state.lock().expect(STATE_POISONED).outcome.take();
    if let Some(outcome) = outcome {
        outcome();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_test_support::stub_context;

    #[test]
    fn new_factory_seeds_variables_from_global_defaults() {
        let test = stub_context();
        let factory = DownloadFactory::new(test.ctx.clone());

        let state = factory.state.lock().unwrap();
        assert_eq!(
            state.variables.get("directory").and_then(Value::as_str),
            Some("./")
        );
        assert_eq!(
            state.variables.get("tied_to_file").and_then(Value::as_int),
            Some(0)
        );
        assert!(state.print_log);
        assert!(!state.immediate);
    }

    #[test]
    fn uri_is_recorded_at_load_time() {
        let test = stub_context();
        let mut factory = DownloadFactory::new(test.ctx.clone());
        assert_eq!(factory.uri(), "");

        factory.load("watch/a.torrent").unwrap();
        assert_eq!(factory.uri(), "watch/a.torrent");
    }

    #[test]
    #[should_panic(expected = "source already attached")]
    fn double_raw_data_preload_is_rejected() {
        let test = stub_context();
        let mut factory = DownloadFactory::new(test.ctx.clone());
        factory.load_raw_data(b"de".to_vec());
        factory.load_raw_data(b"de".to_vec());
    }
}
