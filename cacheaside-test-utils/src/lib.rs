//! cacheaside Test Utilities
//!
//! Shared test infrastructure for the cacheaside workspace:
//! - `User` fixtures and counting source fetchers
//! - A fault-injecting cache store
//! - Proptest generators
//! - Tracing setup for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Re-export the types most tests need
pub use cacheaside::{
    CacheAside, Destination, FetchOptions, Fetcher, HashFetcher, HashSourceFetcher,
    SourceFetcher, WriteErrorAction,
};
pub use cacheaside_core::{
    BoxError, CacheAsideError, Codec, Entry, JsonCodec, MsgPackCodec, Stage, StoreError,
    Strategy,
};
pub use cacheaside_store::{CacheStore, HashCacheStore, MemoryStore, ReadResult};

/// Install a `RUST_LOG`-filtered subscriber that writes through the test
/// harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FIXTURES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub age: u32,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, age: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            age,
        }
    }

    /// `User { id, name: "name{id}", age: 20 }`
    pub fn sample(id: &str) -> Self {
        Self::new(id, format!("name{id}"), 20)
    }
}

/// Key deriver for [`User`] values.
pub fn user_key<A>(user: &User, _args: &A) -> Result<String, BoxError> {
    Ok(user.id.clone())
}

/// One field of a user record, as served by [`HashUserSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserField {
    pub field: String,
    pub value: String,
}

impl UserField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Field deriver for [`UserField`] values.
pub fn user_field<A>(field: &UserField, _args: &A) -> Result<String, BoxError> {
    Ok(field.field.clone())
}

// ============================================================================
// SOURCE FETCHERS
// ============================================================================

#[derive(Debug, Default)]
struct CallLog {
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<String>>>,
    failure: Mutex<Option<String>>,
}

impl CallLog {
    fn record(&self, names: &[String]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(names.to_vec());
        }
    }

    fn check(&self) -> Result<(), BoxError> {
        match self.failure.lock().ok().and_then(|f| f.clone()) {
            Some(reason) => Err(reason.into()),
            None => Ok(()),
        }
    }

    fn set_failure(&self, reason: Option<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = reason;
        }
    }

    fn requests(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

/// In-memory user table that counts how often it is asked.
///
/// Returns matches in reverse request order so callers cannot rely on
/// source ordering. Keys with no user are silently left out.
#[derive(Debug, Default)]
pub struct UserSource {
    users: HashMap<String, User>,
    delay: Option<Duration>,
    log: CallLog,
}

impl UserSource {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            ..Self::default()
        }
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every following fetch fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.log.set_failure(Some(reason.into()));
    }

    pub fn recover(&self) {
        self.log.set_failure(None);
    }

    pub fn calls(&self) -> usize {
        self.log.calls.load(Ordering::SeqCst)
    }

    /// Key batches received, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.log.requests()
    }
}

#[async_trait]
impl<A: Sync + 'static> SourceFetcher<User, A> for UserSource {
    async fn fetch(&self, keys: &[String], _args: &A) -> Result<Vec<User>, BoxError> {
        self.log.record(keys);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.check()?;
        Ok(keys
            .iter()
            .rev()
            .filter_map(|k| self.users.get(k).cloned())
            .collect())
    }
}

/// Per-key field table that counts how often it is asked.
#[derive(Debug, Default)]
pub struct HashUserSource {
    records: HashMap<String, HashMap<String, String>>,
    delay: Option<Duration>,
    log: CallLog,
}

impl HashUserSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        key: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.records
            .entry(key.into())
            .or_default()
            .insert(field.into(), value.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        self.log.set_failure(Some(reason.into()));
    }

    pub fn recover(&self) {
        self.log.set_failure(None);
    }

    pub fn calls(&self) -> usize {
        self.log.calls.load(Ordering::SeqCst)
    }

    /// Field batches received, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.log.requests()
    }
}

#[async_trait]
impl<A: Sync + 'static> HashSourceFetcher<UserField, A> for HashUserSource {
    async fn fetch(
        &self,
        key: &str,
        fields: &[String],
        _args: &A,
    ) -> Result<Vec<UserField>, BoxError> {
        self.log.record(fields);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.check()?;
        let Some(record) = self.records.get(key) else {
            return Ok(Vec::new());
        };
        Ok(fields
            .iter()
            .filter_map(|f| record.get(f).map(|v| UserField::new(f.clone(), v.clone())))
            .collect())
    }
}

// ============================================================================
// FAULTY STORE
// ============================================================================

/// A write attempt seen by [`FaultyStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Outer key for hash writes.
    pub hash_key: Option<String>,
    pub ttl: Option<Duration>,
    pub entries: Vec<(String, Vec<u8>)>,
}

impl RecordedWrite {
    /// Payload written for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, data)| data.as_slice())
    }
}

/// [`MemoryStore`] wrapper with switchable read and write failures.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The wrapped store, for seeding and inspection.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Batched reads received, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Write attempts, failed ones included.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    fn record_write(&self, hash_key: Option<&str>, ttl: Option<Duration>, entries: &[Entry<'_>]) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(RecordedWrite {
                hash_key: hash_key.map(str::to_string),
                ttl,
                entries: entries
                    .iter()
                    .map(|e| (e.key.to_string(), e.data.to_vec()))
                    .collect(),
            });
        }
    }

    fn check_read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                backend: "faulty".to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                backend: "faulty".to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FaultyStore {
    async fn mset(&self, ttl: Option<Duration>, entries: &[Entry<'_>]) -> Result<(), StoreError> {
        self.record_write(None, ttl, entries);
        self.check_write()?;
        self.inner.mset(ttl, entries).await
    }

    async fn mget(&self, keys: &[String]) -> Result<ReadResult, StoreError> {
        self.check_read()?;
        self.inner.mget(keys).await
    }

    async fn mdel(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.mdel(keys).await
    }
}

#[async_trait]
impl HashCacheStore for FaultyStore {
    async fn hmset(
        &self,
        key: &str,
        ttl: Option<Duration>,
        entries: &[Entry<'_>],
    ) -> Result<(), StoreError> {
        self.record_write(Some(key), ttl, entries);
        self.check_write()?;
        self.inner.hmset(key, ttl, entries).await
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<ReadResult, StoreError> {
        self.check_read()?;
        self.inner.hmget(key, fields).await
    }

    async fn hmdel(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.hmdel(key, fields).await
    }

    async fn hdel(&self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.hdel(key).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys and fixtures.

    use super::User;
    use proptest::prelude::*;

    /// A short cache key.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,6}"
    }

    /// Up to `max` keys, duplicates allowed.
    pub fn arb_keys(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_key(), 0..=max)
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (arb_key(), "[A-Za-z ]{0,12}", 0u32..120).prop_map(|(id, name, age)| User::new(id, name, age))
    }
}
