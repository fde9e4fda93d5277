//! The hierarchical document value tree.

use std::collections::BTreeMap;

/// Map type used for bencoded dictionaries. Keys are UTF-8 strings and
/// iterate in sorted order, matching the canonical encoding.
pub type Map = BTreeMap<String, Value>;

/// One node of a metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Signed integer.
    Integer(i64),
    /// Byte string. Torrent payloads are not guaranteed to be UTF-8.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed dictionary.
    Map(Map),
}

impl Value {
    /// Construct an empty dictionary value.
    #[must_use]
    pub fn map() -> Self {
        Self::Map(Map::new())
    }

    /// Construct an empty list value.
    #[must_use]
    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    /// Integer payload, when this value is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Raw byte payload, when this value is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// UTF-8 view of the byte payload, when valid.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// List payload, when this value is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable list payload, when this value is a list.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary payload, when this value is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Mutable dictionary payload, when this value is a map.
    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Whether this value is a byte string.
    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// Look up a key in a dictionary value.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Mutable lookup of a key in a dictionary value.
    pub fn get_key_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.as_map_mut().and_then(|map| map.get_mut(key))
    }

    /// Whether a dictionary value carries `key` at all.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.get_key(key).is_some()
    }

    /// Whether `key` exists and holds an integer.
    #[must_use]
    pub fn has_key_value(&self, key: &str) -> bool {
        self.get_key(key).is_some_and(|value| value.as_int().is_some())
    }

    /// Whether `key` exists and holds a byte string.
    #[must_use]
    pub fn has_key_string(&self, key: &str) -> bool {
        self.get_key(key).is_some_and(Value::is_bytes)
    }

    /// Integer stored under `key`, when present.
    #[must_use]
    pub fn get_key_value(&self, key: &str) -> Option<i64> {
        self.get_key(key).and_then(Value::as_int)
    }

    /// UTF-8 string stored under `key`, when present and valid.
    #[must_use]
    pub fn get_key_str(&self, key: &str) -> Option<&str> {
        self.get_key(key).and_then(Value::as_str)
    }

    /// Insert `value` under `key`, overwriting any existing entry.
    ///
    /// # Panics
    ///
    /// Panics if this value is not a dictionary; the document sections the
    /// client owns are always maps.
    pub fn insert_key(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Value {
        let map = self.as_map_mut().expect("insert_key on non-map value");
        let key = key.into();
        map.insert(key.clone(), value.into());
        map.get_mut(&key).expect("entry just inserted")
    }

    /// Insert `value` under `key` only when the key is absent, returning the
    /// resulting entry ("insert if absent" semantics).
    ///
    /// # Panics
    ///
    /// Panics if this value is not a dictionary.
    pub fn insert_preserve(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Value {
        let map = self.as_map_mut().expect("insert_preserve on non-map value");
        map.entry(key.into()).or_insert_with(|| value.into())
    }

    /// Like [`Value::insert_preserve`], but only keeps an existing entry when
    /// it has the same variant as the default ("preserve type" semantics).
    ///
    /// # Panics
    ///
    /// Panics if this value is not a dictionary.
    pub fn insert_preserve_type(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Value {
        let map = self.as_map_mut().expect("insert_preserve_type on non-map value");
        let key = key.into();
        let value = value.into();
        let entry = map.entry(key).or_insert_with(|| value.clone());
        if std::mem::discriminant(entry) != std::mem::discriminant(&value) {
            *entry = value;
        }
        entry
    }

    /// Remove `key` from a dictionary value, returning the removed entry.
    pub fn erase_key(&mut self, key: &str) -> Option<Value> {
        self.as_map_mut().and_then(|map| map.remove(key))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Self::Map(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserve_keeps_existing_entries() {
        let mut root = Value::map();
        root.insert_key("state", 1_i64);
        root.insert_preserve("state", 0_i64);
        assert_eq!(root.get_key_value("state"), Some(1));

        root.insert_preserve("complete", 0_i64);
        assert_eq!(root.get_key_value("complete"), Some(0));
    }

    #[test]
    fn insert_preserve_type_replaces_mismatched_variant() {
        let mut root = Value::map();
        root.insert_key("connection_leech", 7_i64);
        root.insert_preserve_type("connection_leech", "seed");
        assert_eq!(root.get_key_str("connection_leech"), Some("seed"));

        root.insert_key("connection_seed", "existing");
        root.insert_preserve_type("connection_seed", "");
        assert_eq!(root.get_key_str("connection_seed"), Some("existing"));
    }

    #[test]
    fn typed_key_probes_distinguish_variants() {
        let mut root = Value::map();
        root.insert_key("priority", 3_i64);
        root.insert_key("throttle_name", "slow");

        assert!(root.has_key_value("priority"));
        assert!(!root.has_key_string("priority"));
        assert!(root.has_key_string("throttle_name"));
        assert!(!root.has_key_value("throttle_name"));
        assert!(!root.has_key("missing"));
    }

    #[test]
    fn non_utf8_bytes_have_no_str_view() {
        let value = Value::Bytes(vec![0xff, 0xfe]);
        assert!(value.as_str().is_none());
        assert_eq!(value.as_bytes(), Some(&[0xff, 0xfe][..]));
    }
}
