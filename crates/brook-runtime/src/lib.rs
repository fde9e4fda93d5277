#![deny(unsafe_code)]

//! Process-wide scheduling primitives shared by the Brook workspace.
//!
//! All pipeline work runs on one logical thread of control, driven by a
//! global time-ordered [`TaskQueue`]. The [`Clock`] caches the current time
//! so that every task scheduled in one pass carries the same timestamp, and
//! the [`SessionLog`] is the shared, user-visible log line buffer.

mod clock;
mod log;
mod queue;

pub use clock::Clock;
pub use log::{LogEntry, SessionLog};
pub use queue::{TaskHandle, TaskQueue};
