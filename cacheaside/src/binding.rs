//! State and steps shared by flat and hash fetchers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use cacheaside_core::{
    namespaced_key, BoxError, CacheAsideError, CacheAsideResult, KeyValue, ValueCodec,
};

use crate::coalesce::Coalescer;
use crate::options::FetchOptions;

/// Outcome of one coalesced source fetch, shared by every waiter.
pub(crate) type SharedFetch<V> = CacheAsideResult<Arc<Vec<V>>>;

/// Identity of a source fetch: the namespaced hash key (hash calls only)
/// plus the sorted, deduplicated miss set. Compared structurally, so names
/// containing any character never alias another set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FlightKey {
    pub hash_key: Option<String>,
    pub names: Vec<String>,
}

impl FlightKey {
    pub fn flat(names: &[String]) -> Self {
        Self {
            hash_key: None,
            names: names.to_vec(),
        }
    }

    pub fn hash(hash_key: &str, names: &[String]) -> Self {
        Self {
            hash_key: Some(hash_key.to_string()),
            names: names.to_vec(),
        }
    }
}

pub(crate) struct Binding<V, A> {
    pub namespace: Arc<str>,
    pub codec: Arc<dyn ValueCodec<V>>,
    pub options: FetchOptions<A>,
    coalescer: Coalescer<FlightKey, SharedFetch<V>>,
}

impl<V, A> Binding<V, A>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(namespace: Arc<str>, codec: Arc<dyn ValueCodec<V>>, options: FetchOptions<A>) -> Self {
        Self {
            namespace,
            codec,
            options,
            coalescer: Coalescer::default(),
        }
    }

    pub fn store_key(&self, key: &str) -> String {
        namespaced_key(&self.namespace, key)
    }

    /// Run the source fetch for `flight`, sharing one execution with every
    /// concurrent caller holding an equal key.
    pub async fn fetch_shared<F, Fut>(&self, flight: FlightKey, fetch: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<V>, BoxError>>,
    {
        let namespace = &*self.namespace;
        let hash_key = flight.hash_key.clone();
        let misses = flight.names.len();
        self.coalescer
            .run(flight, move || async move {
                let hash_key = hash_key.as_deref();
                tracing::debug!(namespace, hash_key, misses, "fetching misses from source");
                let fetched = fetch().await.map_err(CacheAsideError::source_fetch)?;
                tracing::debug!(
                    namespace,
                    hash_key,
                    fetched = fetched.len(),
                    "source fetch finished"
                );
                Ok(Arc::new(fetched))
            })
            .await
    }

    /// Key each fetched value with `derive`, keeping only names in `missing`.
    pub fn derive<F>(
        &self,
        values: &[V],
        missing: &[String],
        derive: F,
    ) -> CacheAsideResult<HashMap<String, V>>
    where
        F: Fn(&V) -> Result<String, BoxError>,
    {
        let mut derived = HashMap::with_capacity(missing.len());
        for value in values {
            let name = derive(value).map_err(CacheAsideError::key_derivation)?;
            if missing.binary_search(&name).is_ok() {
                derived.insert(name, value.clone());
            }
        }
        Ok(derived)
    }

    /// One entry per missing name; names the source had nothing for get an
    /// empty payload so the absence is cached too.
    pub fn encode_misses(
        &self,
        missing: &[String],
        derived: &mut HashMap<String, V>,
        store_name: impl Fn(&str) -> String,
    ) -> CacheAsideResult<Vec<KeyValue<V>>> {
        let mut entries = Vec::with_capacity(missing.len());
        for name in missing {
            let key = store_name(name);
            let entry = match derived.remove(name) {
                Some(value) => {
                    let encoded = self
                        .codec
                        .encode(&value)
                        .map_err(|source| CacheAsideError::Encode {
                            key: key.clone(),
                            source,
                        })?;
                    KeyValue::new(key, Some(value), encoded)
                }
                None => KeyValue::negative(key),
            };
            entries.push(entry);
        }

        let negatives = entries.iter().filter(|kv| kv.is_negative()).count();
        if negatives > 0 {
            tracing::debug!(
                namespace = &*self.namespace,
                negatives,
                "caching confirmed absences"
            );
        }
        Ok(entries)
    }

    pub fn log_partition(&self, hash_key: Option<&str>, requested: usize, hits: usize) {
        tracing::debug!(
            namespace = &*self.namespace,
            hash_key,
            hits,
            misses = requested - hits,
            strategy = %self.options.strategy,
            "partitioned cache read"
        );
    }
}

/// Pair each miss name with its freshly fetched value, dropping absences.
pub(crate) fn fetched_values<V>(
    missing: Vec<String>,
    entries: Vec<KeyValue<V>>,
) -> HashMap<String, V> {
    missing
        .into_iter()
        .zip(entries)
        .filter_map(|(name, kv)| kv.value.map(|value| (name, value)))
        .collect()
}
