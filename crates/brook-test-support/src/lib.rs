#![deny(unsafe_code)]

//! Test doubles and fixtures for exercising the download creation pipeline.

pub mod commands;
pub mod fetch;
pub mod fixtures;
pub mod registry;

use std::sync::{Arc, Mutex, Once};

use brook_runtime::{Clock, SessionLog, TaskQueue};
use brook_torrent_core::{PipelineContext, Settings};

pub use commands::{ExecutedCommand, StubCommandLayer};
pub use fetch::ManualFetchQueue;
pub use registry::StubRegistry;

/// Fixed test epoch, far enough in the past that a fresh clock never runs
/// ahead of persisted timestamps.
pub const TEST_EPOCH: i64 = 1_700_000_000;

/// A pipeline context wired to stub collaborators, with typed handles to
/// each stub for scripting and inspection.
pub struct TestContext {
    pub ctx: PipelineContext,
    pub registry: Arc<Mutex<StubRegistry>>,
    pub commands: Arc<Mutex<StubCommandLayer>>,
    pub fetch: Arc<Mutex<ManualFetchQueue>>,
}

/// Build a [`TestContext`] with default settings and a clock fixed at
/// [`TEST_EPOCH`].
#[must_use]
pub fn stub_context() -> TestContext {
    stub_context_with(&Settings::default())
}

/// Build a [`TestContext`] around explicit settings.
#[must_use]
pub fn stub_context_with(settings: &Settings) -> TestContext {
    let registry = Arc::new(Mutex::new(StubRegistry::new()));
    let commands = Arc::new(Mutex::new(StubCommandLayer::new(
        settings,
        registry.clone(),
    )));
    let fetch = Arc::new(Mutex::new(ManualFetchQueue::new()));

    let ctx = PipelineContext {
        queue: TaskQueue::new(),
        clock: Clock::fixed(TEST_EPOCH),
        log: SessionLog::new(),
        registry: registry.clone(),
        commands: commands.clone(),
        fetch: fetch.clone(),
    };

    TestContext {
        ctx,
        registry,
        commands,
        fetch,
    }
}

/// Install a compact `tracing` subscriber once per test binary.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
