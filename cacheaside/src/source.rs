//! Caller-supplied collaborators: source fetchers and key derivers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use cacheaside_core::BoxError;

/// Resolves a batch of flat keys against the system of record.
///
/// The returned values need not follow the order of `keys`, and keys with no
/// record may simply be left out. Each value is mapped back to its key with
/// the binding's key deriver.
#[async_trait]
pub trait SourceFetcher<V, A = ()>: Send + Sync {
    async fn fetch(&self, keys: &[String], args: &A) -> Result<Vec<V>, BoxError>;
}

/// Resolves a batch of fields under one hash key against the system of record.
#[async_trait]
pub trait HashSourceFetcher<V, A = ()>: Send + Sync {
    async fn fetch(&self, key: &str, fields: &[String], args: &A) -> Result<Vec<V>, BoxError>;
}

/// Recovers the cache key (or hash field) of a fetched value.
///
/// Must be a pure function of the value and the call arguments.
pub type KeyDeriver<V, A> = Arc<dyn Fn(&V, &A) -> Result<String, BoxError> + Send + Sync>;

#[async_trait]
impl<V, A, T> SourceFetcher<V, A> for Arc<T>
where
    T: SourceFetcher<V, A> + ?Sized,
    V: Send + 'static,
    A: Sync + 'static,
{
    async fn fetch(&self, keys: &[String], args: &A) -> Result<Vec<V>, BoxError> {
        (**self).fetch(keys, args).await
    }
}

#[async_trait]
impl<V, A, T> HashSourceFetcher<V, A> for Arc<T>
where
    T: HashSourceFetcher<V, A> + ?Sized,
    V: Send + 'static,
    A: Sync + 'static,
{
    async fn fetch(&self, key: &str, fields: &[String], args: &A) -> Result<Vec<V>, BoxError> {
        (**self).fetch(key, fields, args).await
    }
}

/// Source fetcher built from an async closure. See [`source_fn`].
pub struct SourceFn<F>(F);

/// Wrap `f(keys, args)` as a [`SourceFetcher`]. The closure receives owned
/// copies so the returned future can be `'static`.
pub fn source_fn<F>(f: F) -> SourceFn<F> {
    SourceFn(f)
}

#[async_trait]
impl<V, A, F, Fut> SourceFetcher<V, A> for SourceFn<F>
where
    F: Fn(Vec<String>, A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<V>, BoxError>> + Send,
    V: Send + 'static,
    A: Clone + Send + Sync + 'static,
{
    async fn fetch(&self, keys: &[String], args: &A) -> Result<Vec<V>, BoxError> {
        (self.0)(keys.to_vec(), args.clone()).await
    }
}

/// Hash source fetcher built from an async closure. See [`hash_source_fn`].
pub struct HashSourceFn<F>(F);

/// Wrap `f(key, fields, args)` as a [`HashSourceFetcher`].
pub fn hash_source_fn<F>(f: F) -> HashSourceFn<F> {
    HashSourceFn(f)
}

#[async_trait]
impl<V, A, F, Fut> HashSourceFetcher<V, A> for HashSourceFn<F>
where
    F: Fn(String, Vec<String>, A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<V>, BoxError>> + Send,
    V: Send + 'static,
    A: Clone + Send + Sync + 'static,
{
    async fn fetch(&self, key: &str, fields: &[String], args: &A) -> Result<Vec<V>, BoxError> {
        (self.0)(key.to_string(), fields.to_vec(), args.clone()).await
    }
}
