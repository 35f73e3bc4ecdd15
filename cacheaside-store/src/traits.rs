//! Cache store contracts.
//!
//! Two capability variants: a flat string-keyed store and a two-level hash
//! store addressed by an outer key plus a field name. Both work in batches so
//! that a backend can serve each call with a single round trip.
//!
//! # Read results
//!
//! Batched reads return a map from requested key (or field) to raw bytes:
//!
//! - key absent from the map: the cache has no opinion, treat as a miss
//! - key present with empty bytes: a cached negative result
//!
//! Backends must preserve that distinction.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cacheaside_core::{Entry, StoreError};
use serde::{Deserialize, Serialize};

/// Raw bytes per key (or field) returned by a batched read.
pub type ReadResult = HashMap<String, Vec<u8>>;

/// Flat string-keyed cache store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Write every entry with the given TTL (`None` = backend default).
    ///
    /// An empty batch is a no-op.
    async fn mset(&self, ttl: Option<Duration>, entries: &[Entry<'_>]) -> Result<(), StoreError>;

    /// Read a batch of keys.
    async fn mget(&self, keys: &[String]) -> Result<ReadResult, StoreError>;

    /// Delete a batch of keys.
    async fn mdel(&self, keys: &[String]) -> Result<(), StoreError>;
}

/// Hash (two-level) cache store.
#[async_trait]
pub trait HashCacheStore: Send + Sync {
    /// Write fields under `key`. The TTL applies to the whole hash key.
    async fn hmset(
        &self,
        key: &str,
        ttl: Option<Duration>,
        entries: &[Entry<'_>],
    ) -> Result<(), StoreError>;

    /// Read a batch of fields under `key`.
    async fn hmget(&self, key: &str, fields: &[String]) -> Result<ReadResult, StoreError>;

    /// Delete a batch of fields under `key`.
    async fn hmdel(&self, key: &str, fields: &[String]) -> Result<(), StoreError>;

    /// Delete the entire hash key.
    async fn hdel(&self, key: &str) -> Result<(), StoreError>;
}

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Keys (or fields) found, including negative entries.
    pub hits: u64,
    /// Keys (or fields) not found or expired.
    pub misses: u64,
    /// Entries written.
    pub writes: u64,
    /// Delete calls that removed something.
    pub deletes: u64,
    /// Live entries, flat keys plus hash fields.
    pub entries: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
