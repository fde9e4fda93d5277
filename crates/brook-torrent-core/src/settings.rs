//! Global client settings consulted during download creation.

use serde::{Deserialize, Serialize};

/// Global defaults applied to every new download.
///
/// The pipeline reads these through the command layer (`throttle.*`,
/// `system.file.*`, …); this struct is how the hosting process carries and
/// deserializes them. Negative values disable the corresponding knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default working directory for new downloads.
    pub directory_default: String,
    /// Connection class applied while leeching, empty for the default.
    pub connection_leech: String,
    /// Connection class applied while seeding, empty for the default.
    pub connection_seed: String,
    /// Minimum unchoked upload slots per download.
    pub min_uploads: i64,
    /// Maximum unchoked upload slots per download.
    pub max_uploads: i64,
    /// Minimum unchoked download slots per download.
    pub min_downloads: i64,
    /// Maximum unchoked download slots per download.
    pub max_downloads: i64,
    /// Minimum connected peers per download.
    pub min_peers: i64,
    /// Maximum connected peers per download.
    pub max_peers: i64,
    /// Minimum connected peers for completed downloads, `-1` to reuse the
    /// normal class.
    pub min_peers_seed: i64,
    /// Maximum connected peers for completed downloads, `-1` to reuse the
    /// normal class.
    pub max_peers_seed: i64,
    /// Peer count requested from trackers, `-1` for the tracker default.
    pub tracker_numwant: i64,
    /// Whether UDP trackers are used at all.
    pub use_udp_trackers: bool,
    /// Largest file size the engine will create, `-1` for unlimited.
    pub max_file_size: i64,
    /// Split files larger than this many bytes, `-1` to disable splitting.
    pub split_size: i64,
    /// Suffix appended to split file parts.
    pub split_suffix: String,
    /// Whether peer exchange is enabled for new downloads.
    pub peer_exchange: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory_default: "./".to_string(),
            connection_leech: String::new(),
            connection_seed: String::new(),
            min_uploads: 0,
            max_uploads: 50,
            min_downloads: 0,
            max_downloads: 50,
            min_peers: 40,
            max_peers: 100,
            min_peers_seed: -1,
            max_peers_seed: -1,
            tracker_numwant: -1,
            use_udp_trackers: true,
            max_file_size: -1,
            split_size: -1,
            split_suffix: ".part".to_string(),
            peer_exchange: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_optional_knobs_disabled() {
        let settings = Settings::default();
        assert_eq!(settings.min_peers_seed, -1);
        assert_eq!(settings.split_size, -1);
        assert_eq!(settings.max_file_size, -1);
        assert!(settings.use_udp_trackers);
    }

    #[test]
    fn partial_config_fills_in_defaults() -> anyhow::Result<()> {
        let settings: Settings =
            serde_json::from_str(r#"{"directory_default":"/data","max_peers":250}"#)?;
        assert_eq!(settings.directory_default, "/data");
        assert_eq!(settings.max_peers, 250);
        assert_eq!(settings.max_uploads, 50);
        assert_eq!(settings.split_suffix, ".part");
        Ok(())
    }
}
