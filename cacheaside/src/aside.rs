//! Entry point: a codec, cache stores and a namespace, from which fetchers
//! are bound.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cacheaside_core::{
    BoxError, CacheAsideConfig, Codec, ConfigError, Strategy, ValueCodec,
};
use cacheaside_store::{CacheStore, HashCacheStore};
use serde::{de::DeserializeOwned, Serialize};

use crate::binding::Binding;
use crate::fetcher::Fetcher;
use crate::hash_fetcher::HashFetcher;
use crate::options::FetchOptions;
use crate::source::{HashSourceFetcher, KeyDeriver, SourceFetcher};

/// Shared collaborators for a family of fetchers.
///
/// Binding a fetcher snapshots the default TTL and strategy into that
/// fetcher's [`FetchOptions`]; later changes never reach existing fetchers.
pub struct CacheAside<C> {
    codec: Arc<C>,
    store: Option<Arc<dyn CacheStore>>,
    hash_store: Option<Arc<dyn HashCacheStore>>,
    namespace: Arc<str>,
    ttl: Option<Duration>,
    strategy: Strategy,
}

impl<C> Clone for CacheAside<C> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            store: self.store.clone(),
            hash_store: self.hash_store.clone(),
            namespace: self.namespace.clone(),
            ttl: self.ttl,
            strategy: self.strategy,
        }
    }
}

impl<C: Codec> fmt::Debug for CacheAside<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAside")
            .field("codec", &self.codec.name())
            .field("namespace", &self.namespace)
            .field("store", &self.store.is_some())
            .field("hash_store", &self.hash_store.is_some())
            .field("ttl", &self.ttl)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<C: Codec> CacheAside<C> {
    /// Flat-store instance. Hash fetchers bound from it fail with a
    /// missing-store error. The namespace is validated as by
    /// [`CacheAsideBuilder::build`].
    pub fn new(
        codec: C,
        store: Arc<dyn CacheStore>,
        namespace: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::builder(codec).namespace(namespace).store(store).build()
    }

    /// Hash-store instance. Flat fetchers bound from it fail with a
    /// missing-store error. The namespace is validated as by
    /// [`CacheAsideBuilder::build`].
    pub fn new_hash(
        codec: C,
        hash_store: Arc<dyn HashCacheStore>,
        namespace: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::builder(codec)
            .namespace(namespace)
            .hash_store(hash_store)
            .build()
    }

    pub fn builder(codec: C) -> CacheAsideBuilder<C> {
        CacheAsideBuilder::new(codec)
    }

    /// Builder seeded with namespace, TTL and strategy from `config`.
    pub fn from_config(codec: C, config: &CacheAsideConfig) -> CacheAsideBuilder<C> {
        let builder = Self::builder(codec)
            .namespace(config.namespace.clone())
            .strategy(config.strategy);
        match config.ttl() {
            Some(ttl) => builder.ttl(ttl),
            None => builder,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Options a new binding starts from.
    pub fn default_options<A>(&self) -> FetchOptions<A> {
        FetchOptions {
            ttl: self.ttl,
            strategy: self.strategy,
            ..FetchOptions::default()
        }
    }

    /// Bind a flat fetcher with the default options.
    pub fn fetch<V, A, S, D>(&self, source: S, derive_key: D) -> Fetcher<V, A>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        A: Send + Sync + 'static,
        S: SourceFetcher<V, A> + 'static,
        D: Fn(&V, &A) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.fetch_with(source, derive_key, |options| options)
    }

    /// Bind a flat fetcher, adjusting the default options with `configure`.
    pub fn fetch_with<V, A, S, D, F>(&self, source: S, derive_key: D, configure: F) -> Fetcher<V, A>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        A: Send + Sync + 'static,
        S: SourceFetcher<V, A> + 'static,
        D: Fn(&V, &A) -> Result<String, BoxError> + Send + Sync + 'static,
        F: FnOnce(FetchOptions<A>) -> FetchOptions<A>,
    {
        let derive_key: KeyDeriver<V, A> = Arc::new(derive_key);
        Fetcher::new(
            self.binding(configure(self.default_options())),
            self.store.clone(),
            Arc::new(source),
            derive_key,
        )
    }

    /// Bind a hash fetcher with the default options.
    pub fn hash_fetch<V, A, S, D>(&self, source: S, derive_field: D) -> HashFetcher<V, A>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        A: Send + Sync + 'static,
        S: HashSourceFetcher<V, A> + 'static,
        D: Fn(&V, &A) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.hash_fetch_with(source, derive_field, |options| options)
    }

    /// Bind a hash fetcher, adjusting the default options with `configure`.
    pub fn hash_fetch_with<V, A, S, D, F>(
        &self,
        source: S,
        derive_field: D,
        configure: F,
    ) -> HashFetcher<V, A>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        A: Send + Sync + 'static,
        S: HashSourceFetcher<V, A> + 'static,
        D: Fn(&V, &A) -> Result<String, BoxError> + Send + Sync + 'static,
        F: FnOnce(FetchOptions<A>) -> FetchOptions<A>,
    {
        let derive_field: KeyDeriver<V, A> = Arc::new(derive_field);
        HashFetcher::new(
            self.binding(configure(self.default_options())),
            self.hash_store.clone(),
            Arc::new(source),
            derive_field,
        )
    }

    fn binding<V, A>(&self, options: FetchOptions<A>) -> Binding<V, A>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let codec: Arc<dyn ValueCodec<V>> = self.codec.clone();
        Binding::new(self.namespace.clone(), codec, options)
    }
}

/// Builder for [`CacheAside`].
pub struct CacheAsideBuilder<C> {
    codec: C,
    store: Option<Arc<dyn CacheStore>>,
    hash_store: Option<Arc<dyn HashCacheStore>>,
    namespace: String,
    ttl: Option<Duration>,
    strategy: Strategy,
}

impl<C: Codec> CacheAsideBuilder<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            store: None,
            hash_store: None,
            namespace: String::new(),
            ttl: None,
            strategy: Strategy::default(),
        }
    }

    /// Prefix joined to every cache key with `$`. Empty means no prefix.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Flat store used by [`Fetcher`]s.
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Hash store used by [`HashFetcher`]s.
    pub fn hash_store(mut self, hash_store: Arc<dyn HashCacheStore>) -> Self {
        self.hash_store = Some(hash_store);
        self
    }

    /// Default write TTL for bound fetchers.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Default strategy for bound fetchers.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<CacheAside<C>, ConfigError> {
        CacheAsideConfig::new(self.namespace.clone()).validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> CacheAside<C> {
        CacheAside {
            codec: Arc::new(self.codec),
            store: self.store,
            hash_store: self.hash_store,
            namespace: Arc::from(self.namespace),
            ttl: self.ttl,
            strategy: self.strategy,
        }
    }
}
