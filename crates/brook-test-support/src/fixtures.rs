//! Canned torrent documents.

use brook_bencode::Value;

/// Minimal single-file torrent document named `name`.
#[must_use]
pub fn single_file_torrent(name: &str, size: i64) -> Value {
    let mut info = Value::map();
    info.insert_key("name", name);
    info.insert_key("length", size);
    info.insert_key("piece length", 16_384_i64);
    info.insert_key("pieces", Value::Bytes(vec![0_u8; 20]));

    let mut document = Value::map();
    document.insert_key("announce", "http://tracker.example/announce");
    document.insert_key("info", info);
    document
}

/// Multi-file torrent document. Each file is `(relative/path, size)`; path
/// components are split on `/`.
#[must_use]
pub fn multi_file_torrent(name: &str, files: &[(&str, i64)]) -> Value {
    let entries: Vec<Value> = files
        .iter()
        .map(|(path, size)| {
            let components: Vec<Value> = path.split('/').map(Value::from).collect();
            let mut entry = Value::map();
            entry.insert_key("length", *size);
            entry.insert_key("path", components);
            entry
        })
        .collect();

    let mut info = Value::map();
    info.insert_key("name", name);
    info.insert_key("files", entries);
    info.insert_key("piece length", 16_384_i64);
    info.insert_key("pieces", Value::Bytes(vec![0_u8; 20]));

    let mut document = Value::map();
    document.insert_key("announce", "http://tracker.example/announce");
    document.insert_key("info", info);
    document
}

/// Serialized form of a torrent document.
#[must_use]
pub fn torrent_bytes(document: &Value) -> Vec<u8> {
    brook_bencode::encode(document)
}

/// Magnet link with a fixed-length dummy hash derived from `tag`.
#[must_use]
pub fn magnet_uri(tag: &str) -> String {
    let mut hash = String::with_capacity(40);
    for byte in tag.bytes().cycle().take(20) {
        hash.push_str(&format!("{byte:02x}"));
    }
    format!("magnet:?xt=urn:btih:{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_round_trips_through_the_codec() {
        let document = single_file_torrent("a", 1_000);
        let decoded = brook_bencode::decode(&torrent_bytes(&document)).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn magnet_uri_has_a_forty_hex_hash() {
        let uri = magnet_uri("x");
        let hash = uri.strip_prefix("magnet:?xt=urn:btih:").unwrap();
        assert_eq!(hash.len(), 40);
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}
