//! cacheaside Store - Cache Store Contracts and Backends
//!
//! Defines the flat and hash store contracts the orchestrator talks to, plus
//! an in-memory backend and (behind the `redis` feature) a Redis backend.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod traits;

pub use memory::{MemoryStore, MemoryStoreConfig};
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisStore};
pub use traits::{CacheStore, HashCacheStore, ReadResult, StoreStats};
