//! Out-of-band call metadata.
//!
//! [`Metadata`] is an ordered multimap from lower-cased ASCII keys to string
//! values. It is the application-facing view of gRPC headers and trailers:
//! transport-reserved entries (`content-type`, `te`, `grpc-*`) and binary
//! (`-bin`) entries are filtered out when reading from the wire.

use std::collections::BTreeMap;
use std::fmt;

use tonic::metadata::{Ascii, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue};

use crate::{GreeterError, Result};

/// Header names owned by the transport; never surfaced as metadata.
const RESERVED_KEYS: &[&str] = &["content-type", "te"];
const RESERVED_PREFIX: &str = "grpc-";

/// Ordered key → values mapping attached to a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from `(key, value)` pairs, appending repeated keys.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut md = Self::new();
        for (key, value) in pairs {
            md.append(key, value);
        }
        md
    }

    /// Append a value under `key`, keeping any values already present.
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values under `key` with `value`.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), vec![value.into()]);
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }

    /// All values stored under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Remove `key`, returning its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(&key.to_ascii_lowercase())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate keys in order with their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Append every value of `other` into `self`.
    pub fn merge(&mut self, other: Metadata) {
        for (key, values) in other.entries {
            self.entries.entry(key).or_default().extend(values);
        }
    }

    /// Encode as a tonic [`MetadataMap`] for the wire.
    pub fn to_metadata_map(&self) -> Result<MetadataMap> {
        let mut map = MetadataMap::new();
        self.write_into(&mut map)?;
        Ok(map)
    }

    /// Append every entry to an existing [`MetadataMap`].
    pub fn write_into(&self, map: &mut MetadataMap) -> Result<()> {
        for (key, values) in &self.entries {
            let name = MetadataKey::<Ascii>::from_bytes(key.as_bytes())
                .map_err(|e| GreeterError::InvalidMetadata(format!("key {key:?}: {e}")))?;
            for value in values {
                let value = value.parse::<MetadataValue<Ascii>>().map_err(|e| {
                    GreeterError::InvalidMetadata(format!("value for {key:?}: {e}"))
                })?;
                map.append(name.clone(), value);
            }
        }
        Ok(())
    }

    /// Decode application metadata from a tonic [`MetadataMap`].
    ///
    /// Reserved transport headers, binary entries and values that are not
    /// visible ASCII are skipped.
    pub fn from_metadata_map(map: &MetadataMap) -> Self {
        let mut md = Self::new();
        for entry in map.iter() {
            let KeyAndValueRef::Ascii(key, value) = entry else {
                continue;
            };
            let key = key.as_str();
            if is_reserved(key) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                md.append(key, value);
            }
        }
        md
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key) || key.starts_with(RESERVED_PREFIX)
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

impl From<&MetadataMap> for Metadata {
    fn from(map: &MetadataMap) -> Self {
        Self::from_metadata_map(map)
    }
}

impl fmt::Display for Metadata {
    /// Renders as `{from: [server], in: [header], type: [unary]}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, values)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: [{}]", values.join(", "))?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_lowercased_and_values_keep_order() {
        let mut md = Metadata::new();
        md.append("Type", "unary");
        md.append("type", "stream");

        assert_eq!(md.get("TYPE"), Some("unary"));
        assert_eq!(md.get_all("type"), ["unary", "stream"]);
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn insert_replaces_existing_values() {
        let mut md = Metadata::from_pairs([("in", "header"), ("in", "again")]);
        md.insert("in", "trailer");
        assert_eq!(md.get_all("in"), ["trailer"]);
    }

    #[test]
    fn display_is_sorted_by_key() {
        let md = Metadata::from_pairs([("type", "unary"), ("from", "server"), ("in", "header")]);
        assert_eq!(md.to_string(), "{from: [server], in: [header], type: [unary]}");
    }

    #[test]
    fn merge_appends_values() {
        let mut md = Metadata::from_pairs([("from", "client")]);
        md.merge(Metadata::from_pairs([("from", "proxy"), ("type", "unary")]));
        assert_eq!(md.get_all("from"), ["client", "proxy"]);
        assert_eq!(md.get("type"), Some("unary"));
    }

    #[test]
    fn wire_conversion_keeps_repeated_values() {
        let md = Metadata::from_pairs([("from", "client"), ("from", "proxy"), ("type", "stream")]);
        let map = md.to_metadata_map().unwrap();
        assert_eq!(map.get_all("from").iter().count(), 2);

        let back = Metadata::from_metadata_map(&map);
        assert_eq!(back, md);
    }

    #[test]
    fn reserved_headers_are_filtered() {
        let mut map = MetadataMap::new();
        map.insert("content-type", "application/grpc".parse().unwrap());
        map.insert("grpc-status", "0".parse().unwrap());
        map.insert("te", "trailers".parse().unwrap());
        map.insert("from", "server".parse().unwrap());

        let md = Metadata::from_metadata_map(&map);
        assert_eq!(md.len(), 1);
        assert_eq!(md.get("from"), Some("server"));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let md = Metadata::from_pairs([("bad key", "x")]);
        let err = md.to_metadata_map().unwrap_err();
        assert!(matches!(err, GreeterError::InvalidMetadata(_)));
    }

    #[test]
    fn binary_suffix_is_rejected_for_ascii_values() {
        let md = Metadata::from_pairs([("trace-bin", "x")]);
        assert!(md.to_metadata_map().is_err());
    }
}
