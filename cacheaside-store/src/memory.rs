//! In-memory cache store.
//!
//! Implements both store variants over process-local maps. Expired entries
//! are invisible to reads and reclaimed by [`MemoryStore::purge_expired`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use cacheaside_core::{Entry, StoreError};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::traits::{CacheStore, HashCacheStore, ReadResult, StoreStats};

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// TTL applied when a write does not carry one. `None` = never expire.
    pub default_ttl: Option<Duration>,
}

impl MemoryStoreConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone)]
struct Slot {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
struct HashSlot {
    fields: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
}

fn expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|at| at <= now)
}

/// Process-local store implementing [`CacheStore`] and [`HashCacheStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: MemoryStoreConfig,
    flat: RwLock<HashMap<String, Slot>>,
    hashes: RwLock<HashMap<String, HashSlot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    fn deadline(&self, ttl: Option<Duration>, now: Instant) -> Option<Instant> {
        ttl.or(self.config.default_ttl).map(|ttl| now + ttl)
    }

    fn record_lookup(&self, hits: u64, misses: u64) {
        self.hits.fetch_add(hits, Ordering::Relaxed);
        self.misses.fetch_add(misses, Ordering::Relaxed);
    }

    /// Raw bytes stored under a flat key, without touching statistics.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let flat = self.flat.read().ok()?;
        flat.get(key)
            .filter(|slot| !expired(slot.expires_at, now))
            .map(|slot| slot.data.clone())
    }

    /// Raw bytes stored under a hash field, without touching statistics.
    pub fn hpeek(&self, key: &str, field: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let hashes = self.hashes.read().ok()?;
        hashes
            .get(key)
            .filter(|slot| !expired(slot.expires_at, now))
            .and_then(|slot| slot.fields.get(field).cloned())
    }

    /// Remove every expired flat key and hash key. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut removed = 0;

        {
            let mut flat = self.flat.write().map_err(|_| StoreError::LockPoisoned)?;
            let before = flat.len();
            flat.retain(|_, slot| !expired(slot.expires_at, now));
            removed += before - flat.len();
        }

        let mut hashes = self.hashes.write().map_err(|_| StoreError::LockPoisoned)?;
        let before = hashes.len();
        hashes.retain(|_, slot| !expired(slot.expires_at, now));
        removed += before - hashes.len();

        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    /// Snapshot of usage statistics.
    pub fn stats(&self) -> StoreStats {
        let now = Instant::now();
        let flat_entries = self
            .flat
            .read()
            .map(|flat| {
                flat.values()
                    .filter(|slot| !expired(slot.expires_at, now))
                    .count()
            })
            .unwrap_or_default();
        let hash_entries = self
            .hashes
            .read()
            .map(|hashes| {
                hashes
                    .values()
                    .filter(|slot| !expired(slot.expires_at, now))
                    .map(|slot| slot.fields.len())
                    .sum::<usize>()
            })
            .unwrap_or_default();

        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            entries: (flat_entries + hash_entries) as u64,
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn mset(&self, ttl: Option<Duration>, entries: &[Entry<'_>]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        let expires_at = self.deadline(ttl, now);
        let mut flat = self.flat.write().map_err(|_| StoreError::LockPoisoned)?;
        for entry in entries {
            flat.insert(
                entry.key.to_string(),
                Slot {
                    data: entry.data.to_vec(),
                    expires_at,
                },
            );
        }
        self.writes.fetch_add(entries.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<ReadResult, StoreError> {
        let now = Instant::now();
        let flat = self.flat.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(slot) = flat.get(key).filter(|s| !expired(s.expires_at, now)) {
                found.insert(key.clone(), slot.data.clone());
            }
        }
        let hits = found.len() as u64;
        self.record_lookup(hits, keys.len() as u64 - hits);
        Ok(found)
    }

    async fn mdel(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut flat = self.flat.write().map_err(|_| StoreError::LockPoisoned)?;
        let removed = keys.iter().filter(|key| flat.remove(*key).is_some()).count();
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl HashCacheStore for MemoryStore {
    async fn hmset(
        &self,
        key: &str,
        ttl: Option<Duration>,
        entries: &[Entry<'_>],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        let mut hashes = self.hashes.write().map_err(|_| StoreError::LockPoisoned)?;
        let slot = hashes.entry(key.to_string()).or_default();
        if expired(slot.expires_at, now) {
            *slot = HashSlot::default();
        }
        for entry in entries {
            slot.fields.insert(entry.key.to_string(), entry.data.to_vec());
        }
        if let Some(expires_at) = self.deadline(ttl, now) {
            slot.expires_at = Some(expires_at);
        }
        self.writes.fetch_add(entries.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<ReadResult, StoreError> {
        let now = Instant::now();
        let hashes = self.hashes.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut found = HashMap::with_capacity(fields.len());
        if let Some(slot) = hashes.get(key).filter(|s| !expired(s.expires_at, now)) {
            for field in fields {
                if let Some(data) = slot.fields.get(field) {
                    found.insert(field.clone(), data.clone());
                }
            }
        }
        let hits = found.len() as u64;
        self.record_lookup(hits, fields.len() as u64 - hits);
        Ok(found)
    }

    async fn hmdel(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        let mut hashes = self.hashes.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(slot) = hashes.get_mut(key) else {
            return Ok(());
        };
        let removed = fields
            .iter()
            .filter(|field| slot.fields.remove(*field).is_some())
            .count();
        if slot.fields.is_empty() {
            hashes.remove(key);
        }
        self.deletes.fetch_add(removed as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn hdel(&self, key: &str) -> Result<(), StoreError> {
        let mut hashes = self.hashes.write().map_err(|_| StoreError::LockPoisoned)?;
        if hashes.remove(key).is_some() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_mget_distinguishes_absent_and_negative() {
        let store = MemoryStore::new();
        store
            .mset(None, &[Entry::new("1", b"one"), Entry::new("nil", b"")])
            .await
            .unwrap();

        let found = store.mget(&keys(&["1", "nil", "2"])).await.unwrap();
        assert_eq!(found.get("1").map(Vec::as_slice), Some(&b"one"[..]));
        assert_eq!(found.get("nil").map(Vec::len), Some(0));
        assert!(!found.contains_key("2"));

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.entries, 2);
    }

    #[tokio::test]
    async fn test_mset_empty_is_noop() {
        let store = MemoryStore::new();
        store.mset(None, &[]).await.unwrap();
        assert_eq!(store.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_mdel_removes_keys() {
        let store = MemoryStore::new();
        store
            .mset(None, &[Entry::new("a", b"1"), Entry::new("b", b"2")])
            .await
            .unwrap();
        store.mdel(&keys(&["a", "missing"])).await.unwrap();

        assert!(store.peek("a").is_none());
        assert_eq!(store.peek("b"), Some(b"2".to_vec()));
        assert_eq!(store.stats().deletes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_and_purge() {
        let store = MemoryStore::new();
        store
            .mset(Some(Duration::from_secs(10)), &[Entry::new("short", b"s")])
            .await
            .unwrap();
        store.mset(None, &[Entry::new("forever", b"f")]).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        let found = store.mget(&keys(&["short", "forever"])).await.unwrap();
        assert!(!found.contains_key("short"));
        assert!(found.contains_key("forever"));

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.stats().entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_applies_when_write_has_none() {
        let store = MemoryStore::with_config(
            MemoryStoreConfig::default().with_default_ttl(Duration::from_secs(5)),
        );
        store.mset(None, &[Entry::new("k", b"v")]).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.peek("k").is_none());
    }

    #[tokio::test]
    async fn test_hash_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store
            .hmset(
                "user$1",
                None,
                &[Entry::new("Name", b"\"name1\""), Entry::new("nil", b"")],
            )
            .await
            .unwrap();

        let found = store
            .hmget("user$1", &keys(&["Name", "nil", "Age"]))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("nil").map(Vec::len), Some(0));
        assert!(!found.contains_key("Age"));

        store.hmdel("user$1", &keys(&["Name"])).await.unwrap();
        assert!(store.hpeek("user$1", "Name").is_none());
        assert_eq!(store.hpeek("user$1", "nil"), Some(Vec::new()));

        store.hdel("user$1").await.unwrap();
        assert!(store.hpeek("user$1", "nil").is_none());
        assert_eq!(store.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_hmdel_last_field_drops_hash() {
        let store = MemoryStore::new();
        store
            .hmset("h", None, &[Entry::new("f", b"1")])
            .await
            .unwrap();
        store.hmdel("h", &keys(&["f"])).await.unwrap();
        // hdel on the emptied hash has nothing left to remove
        store.hdel("h").await.unwrap();
        assert_eq!(store.stats().deletes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hash_ttl_covers_whole_key() {
        let store = MemoryStore::new();
        store
            .hmset("h", Some(Duration::from_secs(3)), &[Entry::new("a", b"1")])
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        store
            .hmset("h", Some(Duration::from_secs(3)), &[Entry::new("b", b"2")])
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        let found = store.hmget("h", &keys(&["a", "b"])).await.unwrap();
        assert_eq!(found.len(), 2, "second write refreshes the hash TTL");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.hmget("h", &keys(&["a"])).await.unwrap().is_empty());
    }
}
