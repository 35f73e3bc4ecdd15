//! Flat-key fetcher.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cacheaside_core::{
    CacheAsideError, CacheAsideResult, KeyValue, PreconditionError, StoreError, StoreKind,
};
use cacheaside_store::{CacheStore, ReadResult};

use crate::binding::{fetched_values, Binding, FlightKey};
use crate::merge::{assemble, decode_hits, miss_set, Destination};
use crate::policy::{self, CallSite};
use crate::source::{KeyDeriver, SourceFetcher};

/// Cache-aside reads over flat string keys.
///
/// Cheap to clone; clones share one request coalescer.
pub struct Fetcher<V, A = ()> {
    inner: Arc<FetcherInner<V, A>>,
}

struct FetcherInner<V, A> {
    binding: Binding<V, A>,
    store: Option<Arc<dyn CacheStore>>,
    source: Arc<dyn SourceFetcher<V, A>>,
    derive_key: KeyDeriver<V, A>,
}

impl<V, A> Clone for Fetcher<V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V, A> fmt::Debug for Fetcher<V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("namespace", &self.inner.binding.namespace)
            .field("codec", &self.inner.binding.codec.name())
            .field("options", &self.inner.binding.options)
            .field("store", &self.inner.store.is_some())
            .finish()
    }
}

impl<V, A> Fetcher<V, A>
where
    V: Clone + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    pub(crate) fn new(
        binding: Binding<V, A>,
        store: Option<Arc<dyn CacheStore>>,
        source: Arc<dyn SourceFetcher<V, A>>,
        derive_key: KeyDeriver<V, A>,
    ) -> Self {
        Self {
            inner: Arc::new(FetcherInner {
                binding,
                store,
                source,
                derive_key,
            }),
        }
    }

    fn store(&self) -> Result<&Arc<dyn CacheStore>, PreconditionError> {
        self.inner
            .store
            .as_ref()
            .ok_or(PreconditionError::MissingStore {
                store: StoreKind::Flat,
            })
    }

    /// Read one key.
    pub async fn get(&self, key: &str, args: &A) -> CacheAsideResult<Option<V>> {
        let mut value = None;
        self.get_into(key, &mut value, args).await?;
        Ok(value)
    }

    /// Read one key into `dest`. Returns whether a value was placed.
    pub async fn get_into<D>(&self, key: &str, dest: &mut D, args: &A) -> CacheAsideResult<bool>
    where
        D: Destination<V> + ?Sized,
    {
        self.mget_into(&[key], dest, args).await
    }

    /// Read many keys. The result has one slot per key, in key order.
    pub async fn mget<K>(&self, keys: &[K], args: &A) -> CacheAsideResult<Vec<Option<V>>>
    where
        K: AsRef<str> + Sync,
    {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        self.resolve(&keys, args).await
    }

    /// Read many keys into `dest`. `dest` is only modified when the whole
    /// call succeeds. Returns whether any value was placed.
    pub async fn mget_into<K, D>(&self, keys: &[K], dest: &mut D, args: &A) -> CacheAsideResult<bool>
    where
        K: AsRef<str> + Sync,
        D: Destination<V> + ?Sized,
    {
        dest.check_len(keys.len())?;
        let resolved = self.mget(keys, args).await?;
        Ok(dest.fill(resolved))
    }

    /// Invalidate keys.
    pub async fn mdel<K>(&self, keys: &[K]) -> CacheAsideResult<()>
    where
        K: AsRef<str> + Sync,
    {
        let store = self.store()?;
        if keys.is_empty() {
            return Ok(());
        }
        let binding = &self.inner.binding;
        let store_keys: Vec<String> = keys
            .iter()
            .map(|k| binding.store_key(k.as_ref()))
            .collect();
        store
            .mdel(&store_keys)
            .await
            .map_err(CacheAsideError::CacheWrite)
    }

    async fn resolve(&self, keys: &[String], args: &A) -> CacheAsideResult<Vec<Option<V>>> {
        let store = self.store()?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let inner = &*self.inner;
        let binding = &inner.binding;
        let options = &binding.options;
        let site = CallSite {
            namespace: &binding.namespace,
            hash_key: None,
            keys,
            args,
        };

        let store_keys: Vec<String> = keys.iter().map(|k| binding.store_key(k)).collect();
        let hits = match store.mget(&store_keys).await {
            Ok(hits) => hits,
            Err(err) => {
                policy::on_read_error(options, &site, err)?;
                ReadResult::new()
            }
        };
        let cached = decode_hits(binding.codec.as_ref(), keys, &hits, |k| binding.store_key(k))?;
        binding.log_partition(None, keys.len(), cached.len());

        let missing = miss_set(keys, &cached);
        if missing.is_empty() || !options.strategy.uses_source() {
            return Ok(assemble(keys, &cached, &Default::default()));
        }

        let source = &inner.source;
        let pending = &missing;
        let values = binding
            .fetch_shared(FlightKey::flat(&missing), move || source.fetch(pending, args))
            .await?;

        let mut derived = binding.derive(&values, &missing, |v| (inner.derive_key)(v, args))?;
        let entries = binding.encode_misses(&missing, &mut derived, |k| binding.store_key(k))?;
        if let Err(err) = write(store.as_ref(), options.ttl, &entries).await {
            policy::on_write_error(options, &site, err)?;
        }

        let fetched = fetched_values(missing, entries);
        Ok(assemble(keys, &cached, &fetched))
    }
}

async fn write<V>(
    store: &dyn CacheStore,
    ttl: Option<Duration>,
    entries: &[KeyValue<V>],
) -> Result<(), StoreError> {
    let batch: Vec<_> = entries.iter().map(KeyValue::as_entry).collect();
    store.mset(ttl, &batch).await
}
