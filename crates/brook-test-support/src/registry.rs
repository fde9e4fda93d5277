//! In-memory download registry standing in for the torrent engine.

use std::collections::BTreeMap;

use brook_bencode::Value;
use brook_torrent_core::{
    Download, DownloadRegistry, InfoHash, PipelineError, PipelineResult, SharedDownload, Source,
    TorrentFile,
};
use sha2::{Digest, Sha256};

/// Registry double backed by a plain map.
///
/// Construction performs just enough validation to exercise the pipeline:
/// the document must decode to a dictionary, and it must carry either an
/// `info` tree or a `magnet-uri` placeholder. The info hash is a digest of
/// the `info` tree (or the whole document for magnets), so equal metadata
/// collides the way a real engine's would.
#[derive(Default)]
pub struct StubRegistry {
    downloads: BTreeMap<InfoHash, SharedDownload>,
    reject_insert: bool,
    construct_error: Option<String>,
}

impl StubRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert` report rejection.
    pub fn reject_inserts(&mut self) {
        self.reject_insert = true;
    }

    /// Make every subsequent `construct` fail with `message`.
    pub fn fail_construction(&mut self, message: impl Into<String>) {
        self.construct_error = Some(message.into());
    }

    /// Number of registered downloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.downloads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }

    /// Handle to the single registered download.
    ///
    /// # Panics
    ///
    /// Panics unless exactly one download is registered.
    #[must_use]
    pub fn only(&self) -> SharedDownload {
        assert_eq!(self.downloads.len(), 1, "expected exactly one download");
        self.downloads
            .values()
            .next()
            .expect("registry checked non-empty")
            .clone()
    }
}

fn digest_20(bytes: &[u8]) -> InfoHash {
    let digest = Sha256::digest(bytes);
    let mut hash = [0_u8; 20];
    hash.copy_from_slice(&digest[..20]);
    InfoHash::from_bytes(hash)
}

fn files_of(info: &Value) -> Vec<TorrentFile> {
    let name = info.get_key_str("name").unwrap_or("unnamed").to_string();
    if let Some(length) = info.get_key_value("length") {
        return vec![TorrentFile {
            path: name,
            size_bytes: u64::try_from(length).unwrap_or(0),
        }];
    }
    let Some(entries) = info.get_key("files").and_then(Value::as_list) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let length = entry.get_key_value("length")?;
            let components = entry.get_key("path").and_then(Value::as_list)?;
            let mut path = name.clone();
            for component in components {
                path.push('/');
                path.push_str(component.as_str()?);
            }
            Some(TorrentFile {
                path,
                size_bytes: u64::try_from(length).unwrap_or(0),
            })
        })
        .collect()
}

impl DownloadRegistry for StubRegistry {
    fn construct(&mut self, source: Source) -> PipelineResult<SharedDownload> {
        if let Some(message) = &self.construct_error {
            return Err(PipelineError::construction(message.clone()));
        }

        let document = match source {
            Source::Document(document) => document,
            Source::Stream(bytes) => brook_bencode::decode(&bytes)
                .map_err(|err| PipelineError::construction(err.to_string()))?,
        };
        if document.as_map().is_none() {
            return Err(PipelineError::construction(
                "torrent document is not a dictionary",
            ));
        }

        let meta_download = document.has_key("magnet-uri") && !document.has_key("info");
        let (info_hash, files) = match document.get_key("info") {
            Some(info) => (digest_20(&brook_bencode::encode(info)), files_of(info)),
            None if meta_download => (digest_20(&brook_bencode::encode(&document)), Vec::new()),
            None => {
                return Err(PipelineError::construction(
                    "torrent document carries no info tree",
                ));
            }
        };

        Ok(Download::new(info_hash, document, meta_download, files).into_shared())
    }

    fn insert(&mut self, download: SharedDownload) -> bool {
        if self.reject_insert {
            return false;
        }
        let hash = download.lock().expect("download mutex poisoned").info_hash();
        if self.downloads.contains_key(&hash) {
            return false;
        }
        self.downloads.insert(hash, download);
        true
    }

    fn find(&self, hash: &InfoHash) -> Option<SharedDownload> {
        self.downloads.get(hash).cloned()
    }

    fn erase(&mut self, hash: &InfoHash) -> bool {
        self.downloads.remove(hash).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn construct_rejects_documents_without_an_info_tree() {
        let mut registry = StubRegistry::new();
        let err = registry
            .construct(Source::Document(Value::map()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Construction { .. }));
    }

    #[test]
    fn magnet_placeholders_are_meta_downloads() {
        let mut registry = StubRegistry::new();
        let mut document = Value::map();
        document.insert_key("magnet-uri", "magnet:?xt=urn:btih:abc");

        let download = registry.construct(Source::Document(document)).unwrap();
        assert!(download.lock().unwrap().is_meta_download());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut registry = StubRegistry::new();
        let bytes = fixtures::torrent_bytes(&fixtures::single_file_torrent("a", 1_000));

        let first = registry.construct(Source::Stream(bytes.clone())).unwrap();
        let second = registry.construct(Source::Stream(bytes)).unwrap();
        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn multi_file_layout_prefixes_the_torrent_name() {
        let mut registry = StubRegistry::new();
        let document =
            fixtures::multi_file_torrent("album", &[("one.flac", 10), ("art/cover.png", 20)]);

        let download = registry.construct(Source::Document(document)).unwrap();
        let download = download.lock().unwrap();
        assert_eq!(download.files()[0].path, "album/one.flac");
        assert_eq!(download.files()[1].path, "album/art/cover.png");
    }
}
