//! Core torrent domain types shared across the workspace.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use brook_bencode::Value;
use serde::{Deserialize, Serialize};

/// Fixed-size identifier uniquely naming a torrent's metadata within the
/// registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex rendering of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// What the factory hands the registry: either a raw serialized stream or
/// an already-parsed metadata document. At most one exists per factory; the
/// enum makes holding both unrepresentable.
#[derive(Debug, Clone)]
pub enum Source {
    /// Raw bencoded bytes, not yet parsed.
    Stream(Vec<u8>),
    /// A parsed metadata document.
    Document(Value),
}

/// Individual file exposed by a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Relative path of the file within the torrent payload.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
}

/// Shared handle to a download.
///
/// The pipeline constructs the download, holds a handle while initializing
/// it, and transfers ownership to the registry on insertion; afterwards it
/// reaches the download only through the registry or command layer.
pub type SharedDownload = Arc<Mutex<Download>>;

/// One torrent known to the client.
///
/// The metadata document's engine-opaque portion (the `info` tree) is
/// immutable once the download exists; the bookkeeping and resume sections
/// are mutated by the creation pipeline and, after handoff, by the download
/// itself. The remaining fields mirror engine state the command layer
/// drives.
#[derive(Debug)]
pub struct Download {
    info_hash: InfoHash,
    meta_download: bool,
    document: Value,
    files: Vec<TorrentFile>,

    /// Queue priority, 0..=3.
    pub priority: i64,
    /// Minimum unchoked upload slots.
    pub uploads_min: i64,
    /// Maximum unchoked upload slots.
    pub uploads_max: i64,
    /// Minimum unchoked download slots.
    pub downloads_min: i64,
    /// Maximum unchoked download slots.
    pub downloads_max: i64,
    /// Minimum connected peers.
    pub peers_min: i64,
    /// Maximum connected peers.
    pub peers_max: i64,
    /// Peer count requested from trackers.
    pub tracker_numwant: i64,
    /// Largest file size the engine will create, `-1` for unlimited.
    pub max_file_size: i64,
    /// Per-download tracker key, non-zero once assigned.
    pub tracker_key: u32,
    /// Whether UDP trackers may be used.
    pub udp_trackers: bool,
    /// Whether peer exchange is enabled.
    pub peer_exchange: bool,
    /// Working directory for the payload.
    pub directory: String,
    /// Base directory override replacing the relative root, when set.
    pub directory_base: Option<String>,
    /// Path of the file this download is tied to, empty when untied.
    pub tied_to_file: String,
    /// Desired started/stopped state.
    pub started: bool,
    /// Set when a post-creation command failed against this download.
    pub hash_failed: bool,
    /// Last user-visible status message.
    pub message: String,
    /// Throttle class name, empty for the global throttle.
    pub throttle_name: String,
    /// Persisted aggregate upload counter.
    pub total_uploaded: u64,
    /// Persisted aggregate download counter.
    pub total_downloaded: u64,
    /// Persisted chunk completion, `(done, wanted)`.
    pub chunks: Option<(i64, i64)>,
    /// Peer addresses restored from the resume section.
    pub resume_peers: Vec<String>,
    /// Per-file priorities restored from the resume section.
    pub file_priorities: Vec<i64>,
    /// Tracker enablement restored from the resume section, keyed by URL.
    pub tracker_state: BTreeMap<String, bool>,
}

impl Download {
    /// Construct a download around its parsed document.
    #[must_use]
    pub fn new(
        info_hash: InfoHash,
        document: Value,
        meta_download: bool,
        files: Vec<TorrentFile>,
    ) -> Self {
        Self {
            info_hash,
            meta_download,
            document,
            files,
            priority: 0,
            uploads_min: 0,
            uploads_max: 0,
            downloads_min: 0,
            downloads_max: 0,
            peers_min: 0,
            peers_max: 0,
            tracker_numwant: -1,
            max_file_size: -1,
            tracker_key: 0,
            udp_trackers: true,
            peer_exchange: false,
            directory: String::new(),
            directory_base: None,
            tied_to_file: String::new(),
            started: false,
            hash_failed: false,
            message: String::new(),
            throttle_name: String::new(),
            total_uploaded: 0,
            total_downloaded: 0,
            chunks: None,
            resume_peers: Vec::new(),
            file_priorities: Vec::new(),
            tracker_state: BTreeMap::new(),
        }
    }

    /// Wrap this download in the shared handle used across the registry
    /// boundary.
    #[must_use]
    pub fn into_shared(self) -> SharedDownload {
        Arc::new(Mutex::new(self))
    }

    /// Identifier of this download within the registry.
    #[must_use]
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Whether this is a metadata-only (magnet) placeholder.
    #[must_use]
    pub fn is_meta_download(&self) -> bool {
        self.meta_download
    }

    /// The full persisted metadata document.
    #[must_use]
    pub fn bencode(&self) -> &Value {
        &self.document
    }

    /// Mutable access to the persisted metadata document. Callers must not
    /// touch the engine-opaque `info` tree.
    pub fn bencode_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    /// Files carried by the torrent payload.
    #[must_use]
    pub fn files(&self) -> &[TorrentFile] {
        &self.files
    }

    /// Mark this download as failed and record why, without removing it
    /// from the registry.
    pub fn set_hash_failed(&mut self, message: impl Into<String>) {
        self.hash_failed = true;
        self.message = message.into();
    }

    /// Split every file larger than `threshold` bytes into numbered parts
    /// carrying `suffix`, each at most `threshold` bytes.
    ///
    /// A non-positive threshold leaves the file list untouched.
    pub fn split_files(&mut self, threshold: i64, suffix: &str) {
        let Ok(threshold) = u64::try_from(threshold) else {
            return;
        };
        if threshold == 0 {
            return;
        }

        let mut split = Vec::with_capacity(self.files.len());
        for file in self.files.drain(..) {
            if file.size_bytes <= threshold {
                split.push(file);
                continue;
            }
            let parts = file.size_bytes.div_ceil(threshold);
            let mut remaining = file.size_bytes;
            for index in 0..parts {
                let size = remaining.min(threshold);
                remaining -= size;
                split.push(TorrentFile {
                    path: format!("{}{suffix}{index:03}", file.path),
                    size_bytes: size,
                });
            }
        }
        self.files = split;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download_with_files(files: Vec<TorrentFile>) -> Download {
        Download::new(InfoHash::from_bytes([7; 20]), Value::map(), false, files)
    }

    #[test]
    fn info_hash_renders_lowercase_hex() {
        let hash = InfoHash::from_bytes([0xab; 20]);
        assert_eq!(hash.to_string(), "ab".repeat(20));
        assert_eq!(hash.as_bytes(), &[0xab; 20]);
    }

    #[test]
    fn split_files_partitions_large_entries() {
        let mut download = download_with_files(vec![
            TorrentFile {
                path: "small.bin".into(),
                size_bytes: 100,
            },
            TorrentFile {
                path: "large.bin".into(),
                size_bytes: 2_500,
            },
        ]);

        download.split_files(1_000, ".part");

        let files = download.files();
        assert_eq!(files.len(), 4);
        assert_eq!(files[0].path, "small.bin");
        assert_eq!(files[1].path, "large.bin.part000");
        assert_eq!(files[1].size_bytes, 1_000);
        assert_eq!(files[2].path, "large.bin.part001");
        assert_eq!(files[3].path, "large.bin.part002");
        assert_eq!(files[3].size_bytes, 500);
    }

    #[test]
    fn split_files_ignores_disabled_threshold() {
        let mut download = download_with_files(vec![TorrentFile {
            path: "a".into(),
            size_bytes: 10,
        }]);
        download.split_files(-1, ".part");
        assert_eq!(download.files().len(), 1);
    }

    #[test]
    fn hash_failed_flag_keeps_the_message() {
        let mut download = download_with_files(Vec::new());
        download.set_hash_failed("Command on torrent creation failed: boom");
        assert!(download.hash_failed);
        assert!(download.message.contains("boom"));
    }
}
