//! Per-binding fetch options and error observers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cacheaside_core::{CacheAsideConfig, CacheAsideError, Strategy};

/// Context handed to error observers.
pub struct ErrorEvent<'a, A> {
    /// The cache failure being reported.
    pub error: &'a CacheAsideError,
    /// Outer hash key for hash calls, `None` for flat calls.
    pub hash_key: Option<&'a str>,
    /// Requested keys (flat) or fields (hash), without namespace.
    pub keys: &'a [String],
    /// Extra arguments passed to the call.
    pub args: &'a A,
}

impl<A> fmt::Debug for ErrorEvent<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEvent")
            .field("error", self.error)
            .field("hash_key", &self.hash_key)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// What to do with a failed cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorAction {
    /// Keep going; the fetched values are still returned.
    Swallow,
    /// Fail the call with the write error.
    Propagate,
}

pub type ReadErrorObserver<A> = Arc<dyn Fn(&ErrorEvent<'_, A>) + Send + Sync>;
pub type WriteErrorObserver<A> = Arc<dyn Fn(&ErrorEvent<'_, A>) -> WriteErrorAction + Send + Sync>;

/// Options fixed when a fetcher is bound. Immutable afterwards.
pub struct FetchOptions<A = ()> {
    /// Write TTL, `None` = store default.
    pub ttl: Option<Duration>,
    pub strategy: Strategy,
    /// Notified of read failures that the strategy swallows.
    pub on_read_error: Option<ReadErrorObserver<A>>,
    /// Decides the fate of write failures.
    pub on_write_error: Option<WriteErrorObserver<A>>,
}

impl<A> Default for FetchOptions<A> {
    fn default() -> Self {
        Self {
            ttl: None,
            strategy: Strategy::default(),
            on_read_error: None,
            on_write_error: None,
        }
    }
}

impl<A> Clone for FetchOptions<A> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            strategy: self.strategy,
            on_read_error: self.on_read_error.clone(),
            on_write_error: self.on_write_error.clone(),
        }
    }
}

impl<A> fmt::Debug for FetchOptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("ttl", &self.ttl)
            .field("strategy", &self.strategy)
            .field("on_read_error", &self.on_read_error.is_some())
            .field("on_write_error", &self.on_write_error.is_some())
            .finish()
    }
}

impl<A> FetchOptions<A> {
    /// No TTL, default strategy, no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL and strategy from a deployment config.
    pub fn from_config(config: &CacheAsideConfig) -> Self {
        Self {
            ttl: config.ttl(),
            strategy: config.strategy,
            ..Self::default()
        }
    }

    /// Expire written entries after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Clear the TTL so writes use the store default.
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Strategy for cache read and write failures.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Observe read failures that the strategy swallows.
    pub fn with_read_error_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ErrorEvent<'_, A>) + Send + Sync + 'static,
    {
        self.on_read_error = Some(Arc::new(observer));
        self
    }

    /// Decide per failure whether a write error is swallowed or propagated.
    pub fn with_write_error_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ErrorEvent<'_, A>) -> WriteErrorAction + Send + Sync + 'static,
    {
        self.on_write_error = Some(Arc::new(observer));
        self
    }
}
