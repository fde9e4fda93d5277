#![deny(unsafe_code)]

//! Engine-agnostic torrent domain types and collaborator interfaces.
//!
//! The download creation pipeline consumes the torrent engine, the download
//! registry, the command layer, and the fetch queue through the narrow
//! traits defined here; concrete adapters live elsewhere.

pub mod error;
pub mod keys;
pub mod model;
pub mod resume;
pub mod service;
pub mod settings;

pub use error::{PipelineError, PipelineResult};
pub use model::{Download, InfoHash, SharedDownload, Source, TorrentFile};
pub use service::{
    CommandLayer, DownloadRegistry, FetchHandle, FetchQueue, PipelineContext,
};
pub use settings::Settings;
