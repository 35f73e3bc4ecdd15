//! Error types for cacheaside operations

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by caller-supplied source fetchers and key derivers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared form of a caller-supplied error so every coalesced waiter can hold it.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection to {backend} failed: {reason}")]
    Connection { backend: String, reason: String },

    #[error("Command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Build a command failure from any displayable cause.
    pub fn command(command: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

/// Codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{codec} encode failed: {reason}")]
    Encode { codec: String, reason: String },

    #[error("{codec} decode failed: {reason}")]
    Decode { codec: String, reason: String },
}

/// Errors raised before any cache or source work starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("{store} store is not configured")]
    MissingStore { store: StoreKind },

    #[error("result destination holds {capacity} slots but {requested} keys were requested")]
    InvalidDestination { capacity: usize, requested: usize },
}

/// Which cache store variant a binding needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Flat,
    Hash,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Flat => write!(f, "flat"),
            StoreKind::Hash => write!(f, "hash"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Stage of a fetch call that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Precondition,
    CacheRead,
    CacheWrite,
    SourceFetch,
    KeyDerivation,
    Encode,
    Decode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Precondition => "precondition",
            Stage::CacheRead => "cache read",
            Stage::CacheWrite => "cache write",
            Stage::SourceFetch => "source fetch",
            Stage::KeyDerivation => "key derivation",
            Stage::Encode => "encode",
            Stage::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Master error type for all cacheaside calls.
#[derive(Debug, Clone, Error)]
pub enum CacheAsideError {
    #[error("cacheaside: precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("cacheaside: cache read failed: {0}")]
    CacheRead(#[source] StoreError),

    #[error("cacheaside: cache write failed: {0}")]
    CacheWrite(#[source] StoreError),

    #[error("cacheaside: source fetch failed: {0}")]
    SourceFetch(#[source] SharedError),

    #[error("cacheaside: key derivation failed: {0}")]
    KeyDerivation(#[source] SharedError),

    #[error("cacheaside: encode failed for {key}: {source}")]
    Encode { key: String, source: CodecError },

    #[error("cacheaside: decode failed for {key}: {source}")]
    Decode { key: String, source: CodecError },
}

impl CacheAsideError {
    /// Wrap a source fetcher failure.
    pub fn source_fetch(err: BoxError) -> Self {
        Self::SourceFetch(Arc::from(err))
    }

    /// Wrap a key or field derivation failure.
    pub fn key_derivation(err: BoxError) -> Self {
        Self::KeyDerivation(Arc::from(err))
    }

    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Precondition(_) => Stage::Precondition,
            Self::CacheRead(_) => Stage::CacheRead,
            Self::CacheWrite(_) => Stage::CacheWrite,
            Self::SourceFetch(_) => Stage::SourceFetch,
            Self::KeyDerivation(_) => Stage::KeyDerivation,
            Self::Encode { .. } => Stage::Encode,
            Self::Decode { .. } => Stage::Decode,
        }
    }

    /// Cache read/write failures are the only errors a strategy may downgrade.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::CacheRead(_) | Self::CacheWrite(_))
    }
}

/// Result type alias for cacheaside operations.
pub type CacheAsideResult<T> = Result<T, CacheAsideError>;

// =============================================================================
// TESTS
// =============================================================================
