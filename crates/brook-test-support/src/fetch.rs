//! Hand-driven fetch queue double.

use brook_torrent_core::{FetchHandle, FetchQueue};

/// Fetch queue whose transfers settle only when the test says so.
///
/// Each enqueued request is recorded together with its handle; tests settle
/// them via [`ManualFetchQueue::complete_next`] / [`ManualFetchQueue::fail_next`],
/// or script every request to fail at enqueue time with
/// [`ManualFetchQueue::auto_fail`].
#[derive(Default)]
pub struct ManualFetchQueue {
    requests: Vec<(String, FetchHandle)>,
    settled: usize,
    auto_fail: Option<String>,
}

impl ManualFetchQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle every subsequent request with `message` the moment it is
    /// enqueued.
    pub fn auto_fail(&mut self, message: impl Into<String>) {
        self.auto_fail = Some(message.into());
    }

    /// URIs requested so far, in order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requests.iter().map(|(uri, _)| uri.clone()).collect()
    }

    /// Settle the oldest unsettled request successfully.
    ///
    /// # Panics
    ///
    /// Panics when no request is pending.
    pub fn complete_next(&mut self, buffer: Vec<u8>) {
        let (_, handle) = self
            .requests
            .get(self.settled)
            .expect("no pending fetch request");
        handle.complete(buffer);
        self.settled += 1;
    }

    /// Settle the oldest unsettled request with a failure.
    ///
    /// # Panics
    ///
    /// Panics when no request is pending.
    pub fn fail_next(&mut self, message: impl Into<String>) {
        let (_, handle) = self
            .requests
            .get(self.settled)
            .expect("no pending fetch request");
        handle.fail(message.into());
        self.settled += 1;
    }
}

impl FetchQueue for ManualFetchQueue {
    fn enqueue(&mut self, uri: &str) -> FetchHandle {
        let handle = FetchHandle::new();
        if let Some(message) = &self.auto_fail {
            handle.fail(message.clone());
            self.settled += 1;
        }
        self.requests.push((uri.to_string(), handle.clone()));
        handle
    }
}
