//! Entries exchanged with the cache store

/// Separator between a namespace and a key.
pub const NAMESPACE_SEPARATOR: char = '$';

/// A freshly resolved cache-miss entry.
///
/// `encoded` is empty when the source had nothing for `key`; writing such an
/// entry still occupies the cache slot so later reads see a negative hit.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue<V> {
    pub key: String,
    pub value: Option<V>,
    pub encoded: Vec<u8>,
}

impl<V> KeyValue<V> {
    pub fn new(key: String, value: Option<V>, encoded: Vec<u8>) -> Self {
        Self {
            key,
            value,
            encoded,
        }
    }

    /// Entry caching a confirmed absence.
    pub fn negative(key: String) -> Self {
        Self::new(key, None, Vec::new())
    }

    /// True when this entry records "looked up, confirmed absent".
    pub fn is_negative(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Borrowed key/bytes view handed to the store.
    pub fn as_entry(&self) -> Entry<'_> {
        Entry {
            key: &self.key,
            data: &self.encoded,
        }
    }
}

/// A key (or hash field) and its encoded bytes, as written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key: &'a str,
    pub data: &'a [u8],
}

impl<'a> Entry<'a> {
    pub fn new(key: &'a str, data: &'a [u8]) -> Self {
        Self { key, data }
    }
}

/// Prefix `key` with `namespace`; an empty namespace leaves the key unchanged.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{namespace}{NAMESPACE_SEPARATOR}{key}")
    }
}
