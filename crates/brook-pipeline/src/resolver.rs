//! URI classification and synchronous source resolution.

use std::path::PathBuf;

use brook_bencode::Value;
use brook_torrent_core::{PipelineError, PipelineResult};

/// Whether `uri` is a base64 data URI. Recognized but not supported by the
/// pipeline; only plain network schemes are fetched.
#[must_use]
pub(crate) fn is_data_uri(uri: &str) -> bool {
    uri.strip_prefix("data:")
        .is_some_and(|rest| rest.contains("base64,"))
}

/// Whether `uri` is a magnet link.
#[must_use]
pub(crate) fn is_magnet_uri(uri: &str) -> bool {
    uri.starts_with("magnet:?")
}

/// Whether `uri` names a network source the fetch queue can retrieve.
#[must_use]
pub(crate) fn is_network_uri(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://") || uri.starts_with("ftp://")
}

/// Expand a leading tilde to the user's home directory.
#[must_use]
pub(crate) fn expand_path(path: &str) -> PathBuf {
    if path == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home);
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Read and parse a local torrent file.
pub(crate) fn load_local_file(uri: &str) -> PipelineResult<Value> {
    let path = expand_path(uri);
    let bytes = std::fs::read(&path)
        .map_err(|_| PipelineError::transport("Could not open file"))?;
    brook_bencode::decode(&bytes)
        .map_err(|_| PipelineError::parse("Reading torrent file failed"))
}

/// Synthesize the minimal single-key document embedding a magnet URI.
#[must_use]
pub(crate) fn synthesize_magnet(uri: &str) -> Value {
    let mut document = Value::map();
    document.insert_key("magnet-uri", uri);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn classification_is_prefix_and_case_sensitive() {
        assert!(is_data_uri("data:application/x-bittorrent;base64,ZGU="));
        assert!(!is_data_uri("data:text/plain,hello"));

        assert!(is_magnet_uri("magnet:?xt=urn:btih:abc"));
        assert!(!is_magnet_uri("MAGNET:?xt=urn:btih:abc"));
        assert!(!is_magnet_uri("magnet:xt=urn:btih:abc"));

        assert!(is_network_uri("http://example.com/a.torrent"));
        assert!(is_network_uri("https://example.com/a.torrent"));
        assert!(is_network_uri("ftp://example.com/a.torrent"));
        assert!(!is_network_uri("HTTP://example.com/a.torrent"));
        assert!(!is_network_uri("file:///a.torrent"));
    }

    #[test]
    fn anything_else_is_a_local_path() {
        // No prefix match means local file, whatever the string looks like.
        for uri in ["a.torrent", "/tmp/a.torrent", "ssh://host/a", "htt://x"] {
            assert!(!is_data_uri(uri));
            assert!(!is_magnet_uri(uri));
            assert!(!is_network_uri(uri));
        }
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_path("~"), PathBuf::from(&home));
            assert_eq!(
                expand_path("~/watch/a.torrent"),
                PathBuf::from(&home).join("watch/a.torrent")
            );
        }
        assert_eq!(expand_path("/abs/a.torrent"), PathBuf::from("/abs/a.torrent"));
    }

    #[test]
    fn missing_file_is_a_transport_failure() {
        let err = load_local_file("/definitely/not/here.torrent").unwrap_err();
        assert_eq!(err.to_string(), "Could not open file");
        assert!(err.is_escalatable());
    }

    #[test]
    fn malformed_file_is_a_parse_failure() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"not bencode at all")?;

        let err = load_local_file(file.path().to_str().unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "Reading torrent file failed");
        Ok(())
    }

    #[test]
    fn magnet_document_embeds_the_uri() {
        let uri = "magnet:?xt=urn:btih:0123456789abcdef0123";
        let document = synthesize_magnet(uri);
        assert_eq!(document.get_key_str("magnet-uri"), Some(uri));
    }
}
