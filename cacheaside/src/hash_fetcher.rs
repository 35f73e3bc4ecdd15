//! Hash fetcher: fields nested under one outer key.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cacheaside_core::{
    CacheAsideError, CacheAsideResult, KeyValue, PreconditionError, StoreError, StoreKind,
};
use cacheaside_store::{HashCacheStore, ReadResult};

use crate::binding::{fetched_values, Binding, FlightKey};
use crate::merge::{assemble, decode_hits, miss_set, Destination};
use crate::policy::{self, CallSite};
use crate::source::{HashSourceFetcher, KeyDeriver};

/// Cache-aside reads over the fields of a hash key.
///
/// The outer key is namespaced; field names are stored as given.
pub struct HashFetcher<V, A = ()> {
    inner: Arc<HashFetcherInner<V, A>>,
}

struct HashFetcherInner<V, A> {
    binding: Binding<V, A>,
    store: Option<Arc<dyn HashCacheStore>>,
    source: Arc<dyn HashSourceFetcher<V, A>>,
    derive_field: KeyDeriver<V, A>,
}

impl<V, A> Clone for HashFetcher<V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V, A> fmt::Debug for HashFetcher<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashFetcher")
            .field("namespace", &self.inner.binding.namespace)
            .field("codec", &self.inner.binding.codec.name())
            .field("options", &self.inner.binding.options)
            .field("store", &self.inner.store.is_some())
            .finish()
    }
}

impl<V, A> HashFetcher<V, A>
where
    V: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    pub(crate) fn new(
        binding: Binding<V, A>,
        store: Option<Arc<dyn HashCacheStore>>,
        source: Arc<dyn HashSourceFetcher<V, A>>,
        derive_field: KeyDeriver<V, A>,
    ) -> Self {
        Self {
            inner: Arc::new(HashFetcherInner {
                binding,
                store,
                source,
                derive_field,
            }),
        }
    }

    fn store(&self) -> Result<&Arc<dyn HashCacheStore>, PreconditionError> {
        self.inner
            .store
            .as_ref()
            .ok_or(PreconditionError::MissingStore {
                store: StoreKind::Hash,
            })
    }

    /// Read one field of `key`.
    pub async fn hget(&self, key: &str, field: &str, args: &A) -> CacheAsideResult<Option<V>> {
        let mut value = None;
        self.hget_into(key, field, &mut value, args).await?;
        Ok(value)
    }

    /// Read one field of `key` into `dest`. Returns whether a value was placed.
    pub async fn hget_into<D>(
        &self,
        key: &str,
        field: &str,
        dest: &mut D,
        args: &A,
    ) -> CacheAsideResult<bool>
    where
        D: Destination<V> + ?Sized,
    {
        self.hmget_into(key, &[field], dest, args).await
    }

    /// Read many fields of `key`. One slot per field, in field order.
    pub async fn hmget<F>(
        &self,
        key: &str,
        fields: &[F],
        args: &A,
    ) -> CacheAsideResult<Vec<Option<V>>>
    where
        F: AsRef<str> + Sync,
    {
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self.resolve(key, &fields, args).await
    }

    /// Read many fields of `key` into `dest`. `dest` is only modified when
    /// the whole call succeeds. Returns whether any value was placed.
    pub async fn hmget_into<F, D>(
        &self,
        key: &str,
        fields: &[F],
        dest: &mut D,
        args: &A,
    ) -> CacheAsideResult<bool>
    where
        F: AsRef<str> + Sync,
        D: Destination<V> + ?Sized,
    {
        dest.check_len(fields.len())?;
        let resolved = self.hmget(key, fields, args).await?;
        Ok(dest.fill(resolved))
    }

    /// Invalidate fields of `key`.
    pub async fn hmdel<F>(&self, key: &str, fields: &[F]) -> CacheAsideResult<()>
    where
        F: AsRef<str> + Sync,
    {
        let store = self.store()?;
        if fields.is_empty() {
            return Ok(());
        }
        let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
        store
            .hmdel(&self.inner.binding.store_key(key), &fields)
            .await
            .map_err(CacheAsideError::CacheWrite)
    }

    /// Invalidate the whole hash key.
    pub async fn hdel(&self, key: &str) -> CacheAsideResult<()> {
        let store = self.store()?;
        store
            .hdel(&self.inner.binding.store_key(key))
            .await
            .map_err(CacheAsideError::CacheWrite)
    }

    async fn resolve(
        &self,
        key: &str,
        fields: &[String],
        args: &A,
    ) -> CacheAsideResult<Vec<Option<V>>> {
        let store = self.store()?;
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let inner = &*self.inner;
        let binding = &inner.binding;
        let options = &binding.options;
        let site = CallSite {
            namespace: &binding.namespace,
            hash_key: Some(key),
            keys: fields,
            args,
        };

        let hash_key = binding.store_key(key);
        let hits = match store.hmget(&hash_key, fields).await {
            Ok(hits) => hits,
            Err(err) => {
                policy::on_read_error(options, &site, err)?;
                ReadResult::new()
            }
        };
        let cached = decode_hits(binding.codec.as_ref(), fields, &hits, str::to_string)?;
        binding.log_partition(Some(key), fields.len(), cached.len());

        let missing = miss_set(fields, &cached);
        if missing.is_empty() || !options.strategy.uses_source() {
            return Ok(assemble(fields, &cached, &Default::default()));
        }

        let source = &inner.source;
        let pending = &missing;
        let values = binding
            .fetch_shared(FlightKey::hash(&hash_key, &missing), move || {
                source.fetch(key, pending, args)
            })
            .await?;

        let mut derived = binding.derive(&values, &missing, |v| (inner.derive_field)(v, args))?;
        let entries = binding.encode_misses(&missing, &mut derived, str::to_string)?;
        if let Err(err) = write(store.as_ref(), &hash_key, options.ttl, &entries).await {
            policy::on_write_error(options, &site, err)?;
        }

        let fetched = fetched_values(missing, entries);
        Ok(assemble(fields, &cached, &fetched))
    }
}

async fn write<V>(
    store: &dyn HashCacheStore,
    hash_key: &str,
    ttl: Option<Duration>,
    entries: &[KeyValue<V>],
) -> Result<(), StoreError> {
    let batch: Vec<_> = entries.iter().map(KeyValue::as_entry).collect();
    store.hmset(hash_key, ttl, &batch).await
}
