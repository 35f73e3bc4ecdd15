//! cacheaside - Cache-Aside Fetch Orchestration
//!
//! Reads a batch of keys from a cache, resolves whatever is missing from a
//! source of truth, writes the fetched values (and confirmed absences) back,
//! and returns the results in request order. Concurrent calls that miss on
//! the same key set share a single source fetch.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let aside = CacheAside::new(JsonCodec, store, "user")?;
//!
//! let users = aside.fetch_with(
//!     UserSource::new(db),
//!     |user: &User, _: &()| Ok(user.id.clone()),
//!     |options| options.with_ttl(Duration::from_secs(300)),
//! );
//!
//! let found = users.mget(&["1", "2", "3"], &()).await?;
//! ```
//!
//! # Strategies
//!
//! Only cache read and write failures are subject to [`Strategy`]:
//!
//! - [`Strategy::FirstUseCache`] (default): cache errors fail the call
//! - [`Strategy::FailBackToSource`]: cache errors are logged, reported to the
//!   observers and the call proceeds against the source
//! - [`Strategy::OnlyUseCache`]: the source is never consulted

mod aside;
mod binding;
mod coalesce;
mod fetcher;
mod hash_fetcher;
mod merge;
mod options;
mod policy;
mod source;

pub use aside::{CacheAside, CacheAsideBuilder};
pub use fetcher::Fetcher;
pub use hash_fetcher::HashFetcher;
pub use merge::Destination;
pub use options::{
    ErrorEvent, FetchOptions, ReadErrorObserver, WriteErrorAction, WriteErrorObserver,
};
pub use source::{
    hash_source_fn, source_fn, HashSourceFetcher, HashSourceFn, KeyDeriver, SourceFetcher,
    SourceFn,
};

pub use cacheaside_core::{
    BoxError, CacheAsideConfig, CacheAsideError, CacheAsideResult, Codec, CodecError,
    ConfigError, JsonCodec, MsgPackCodec, PreconditionError, Stage, StoreError, StoreKind,
    Strategy,
};
pub use cacheaside_store::{CacheStore, HashCacheStore, MemoryStore, MemoryStoreConfig};
#[cfg(feature = "redis")]
pub use cacheaside_store::{RedisConfig, RedisStore};
