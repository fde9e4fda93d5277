//! Cached wall-clock time in whole seconds.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Monotonic-enough "current time" shared across the process.
///
/// The value only advances when [`Clock::refresh`] (or [`Clock::advance`] in
/// tests) is called, so every task scheduled within one turn of the loop
/// observes the same timestamp.
#[derive(Debug, Clone)]
pub struct Clock {
    seconds: Arc<AtomicI64>,
}

impl Clock {
    /// Construct a clock seeded from the system time.
    #[must_use]
    pub fn new() -> Self {
        Self::fixed(Utc::now().timestamp())
    }

    /// Construct a clock pinned to an explicit unix timestamp.
    #[must_use]
    pub fn fixed(seconds: i64) -> Self {
        Self {
            seconds: Arc::new(AtomicI64::new(seconds)),
        }
    }

    /// Cached time in unix seconds.
    #[must_use]
    pub fn seconds(&self) -> i64 {
        self.seconds.load(Ordering::Relaxed)
    }

    /// Re-read the system clock. Never moves the cached value backwards.
    pub fn refresh(&self) {
        let now = Utc::now().timestamp();
        self.seconds.fetch_max(now, Ordering::Relaxed);
    }

    /// Advance the cached time by `seconds` without touching the system
    /// clock. Intended for deterministic tests.
    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::Relaxed);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_stays_until_advanced() {
        let clock = Clock::fixed(1_000);
        assert_eq!(clock.seconds(), 1_000);
        clock.advance(5);
        assert_eq!(clock.seconds(), 1_005);
    }

    #[test]
    fn clones_share_the_cached_value() {
        let clock = Clock::fixed(50);
        let other = clock.clone();
        clock.advance(1);
        assert_eq!(other.seconds(), 51);
    }

    #[test]
    fn refresh_does_not_rewind() {
        let clock = Clock::fixed(i64::MAX - 10);
        clock.refresh();
        assert!(clock.seconds() >= i64::MAX - 10);
    }
}
