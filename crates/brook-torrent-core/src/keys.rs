//! Persisted document layout shared between the pipeline and the session.
//!
//! The client bookkeeping section keys form a fixed, versionless set:
//! `state`, `state_changed`, `state_counter`, `complete`, `hashing`,
//! `timestamp.started`, `timestamp.finished`, `timestamp.last_active`,
//! `tied_to_file`, `loaded_file`, `custom1`..`custom5`, `priority`, `key`,
//! `total_uploaded`, `total_downloaded`, `chunks_done`/`chunks_wanted`,
//! `throttle_name`, `ignore_commands`, `views`,
//! `connection_leech`/`connection_seed`, the four `choke_heuristics.*`
//! keys, and an optional `directory`.

/// Top-level key of the client bookkeeping section.
pub const BOOKKEEPING: &str = "brook";

/// Top-level key of the resume section (peer addresses, file priorities,
/// tracker settings).
pub const RESUME: &str = "resume";

/// Top-level key of the stash a magnet placeholder carries so its
/// initialization can be replayed once full metadata arrives. The format
/// (`start`, `print_log`, `commands`) is read by the metadata-resolution
/// step and must stay stable.
pub const META_STASH: &str = "brook_meta_download";

/// Sidecar file suffix holding a persisted bookkeeping section.
pub const BOOKKEEPING_SIDECAR_SUFFIX: &str = ".brook";

/// Sidecar file suffix holding a persisted resume section.
pub const RESUME_SIDECAR_SUFFIX: &str = ".resume";

/// Largest `state_counter` accepted from a persisted document; anything
/// above this is treated as corruption.
pub const STATE_COUNTER_LIMIT: i64 = 1 << 20;

/// `hashing` value for a download that is not being hash-checked.
pub const HASHING_STOPPED: i64 = 0;
