//! Loaders for the persisted resume section.
//!
//! The resume section avoids re-deriving peer addresses, per-file
//! priorities, and tracker settings on every startup. Each loader is
//! tolerant: missing or oddly-shaped entries are skipped, never fatal.

use brook_bencode::Value;

use crate::model::Download;

/// Restore known peer addresses from `resume["peers"]`.
///
/// Each entry is a map carrying an `ip` string and a `port` integer;
/// entries missing either field are skipped.
pub fn load_addresses(download: &mut Download, resume: &Value) {
    let Some(peers) = resume.get_key("peers").and_then(Value::as_list) else {
        return;
    };

    for peer in peers {
        let Some(ip) = peer.get_key_str("ip") else {
            continue;
        };
        let Some(port) = peer.get_key_value("port") else {
            continue;
        };
        if !(1..=i64::from(u16::MAX)).contains(&port) {
            continue;
        }
        download.resume_peers.push(format!("{ip}:{port}"));
    }
}

/// Restore per-file priorities from `resume["files"]`.
///
/// The list is index-aligned with the torrent's file list; files without a
/// `priority` entry keep the engine default (priority 1).
pub fn load_file_priorities(download: &mut Download, resume: &Value) {
    let Some(files) = resume.get_key("files").and_then(Value::as_list) else {
        return;
    };

    download.file_priorities = files
        .iter()
        .map(|file| file.get_key_value("priority").unwrap_or(1))
        .collect();
}

/// Restore tracker enablement from `resume["trackers"]`, a map of tracker
/// URL to a map with an `enabled` integer.
pub fn load_tracker_settings(download: &mut Download, resume: &Value) {
    let Some(trackers) = resume.get_key("trackers").and_then(Value::as_map) else {
        return;
    };

    for (url, state) in trackers {
        let enabled = state.get_key_value("enabled").unwrap_or(1) != 0;
        download.tracker_state.insert(url.clone(), enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InfoHash;

    fn empty_download() -> Download {
        Download::new(InfoHash::from_bytes([1; 20]), Value::map(), false, Vec::new())
    }

    fn peer(ip: &str, port: i64) -> Value {
        let mut entry = Value::map();
        entry.insert_key("ip", ip);
        entry.insert_key("port", port);
        entry
    }

    #[test]
    fn addresses_skip_malformed_entries() {
        let mut resume = Value::map();
        let mut bad = Value::map();
        bad.insert_key("ip", "10.0.0.3");
        resume.insert_key(
            "peers",
            vec![peer("10.0.0.1", 6_881), peer("10.0.0.2", 0), bad],
        );

        let mut download = empty_download();
        load_addresses(&mut download, &resume);
        assert_eq!(download.resume_peers, vec!["10.0.0.1:6881"]);
    }

    #[test]
    fn file_priorities_default_when_absent() {
        let mut resume = Value::map();
        let mut first = Value::map();
        first.insert_key("priority", 0_i64);
        resume.insert_key("files", vec![first, Value::map()]);

        let mut download = empty_download();
        load_file_priorities(&mut download, &resume);
        assert_eq!(download.file_priorities, vec![0, 1]);
    }

    #[test]
    fn tracker_settings_record_enablement() {
        let mut resume = Value::map();
        let mut trackers = Value::map();
        let mut disabled = Value::map();
        disabled.insert_key("enabled", 0_i64);
        trackers.insert_key("http://a.example/announce", Value::map());
        trackers.insert_key("http://b.example/announce", disabled);
        resume.insert_key("trackers", trackers);

        let mut download = empty_download();
        load_tracker_settings(&mut download, &resume);
        assert_eq!(
            download.tracker_state.get("http://a.example/announce"),
            Some(&true)
        );
        assert_eq!(
            download.tracker_state.get("http://b.example/announce"),
            Some(&false)
        );
    }

    #[test]
    fn missing_sections_are_tolerated() {
        let mut download = empty_download();
        let resume = Value::map();
        load_addresses(&mut download, &resume);
        load_file_priorities(&mut download, &resume);
        load_tracker_settings(&mut download, &resume);
        assert!(download.resume_peers.is_empty());
        assert!(download.file_priorities.is_empty());
        assert!(download.tracker_state.is_empty());
    }
}
