//! cacheaside Core - Data Types, Errors and Codecs
//!
//! Shared vocabulary for the cacheaside workspace. Contains no I/O and no
//! orchestration logic; every other crate depends on this one.

pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod strategy;

pub use codec::{Codec, JsonCodec, MsgPackCodec, ValueCodec};
pub use config::CacheAsideConfig;
pub use entry::{namespaced_key, Entry, KeyValue, NAMESPACE_SEPARATOR};
pub use error::{
    BoxError, CacheAsideError, CacheAsideResult, CodecError, ConfigError, PreconditionError,
    SharedError, Stage, StoreError, StoreKind,
};
pub use strategy::Strategy;
