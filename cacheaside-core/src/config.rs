//! Configuration for a cacheaside binding

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::NAMESPACE_SEPARATOR;
use crate::error::ConfigError;
use crate::strategy::Strategy;

pub const ENV_NAMESPACE: &str = "CACHEASIDE_NAMESPACE";
pub const ENV_TTL_SECS: &str = "CACHEASIDE_TTL_SECS";
pub const ENV_STRATEGY: &str = "CACHEASIDE_STRATEGY";

/// Deployment-level settings for one cacheaside instance.
///
/// Observers cannot be expressed here; they are attached in code on the
/// fetch options derived from this config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheAsideConfig {
    /// Prefix applied to every stored key (or outer hash key).
    pub namespace: String,
    /// Write TTL in seconds. 0 sets no TTL, so the store's own default applies.
    pub ttl_secs: u64,
    pub strategy: Strategy,
}

impl CacheAsideConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Write TTL, `None` when the store's default should apply.
    pub fn ttl(&self) -> Option<Duration> {
        if self.ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.ttl_secs))
        }
    }

    /// Validate the configuration.
    ///
    /// The namespace must not contain the namespace separator, otherwise two
    /// namespaces could produce the same stored key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.contains(NAMESPACE_SEPARATOR) {
            return Err(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: self.namespace.clone(),
                reason: format!("namespace must not contain '{}'", NAMESPACE_SEPARATOR),
            });
        }
        Ok(())
    }

    /// Load from `CACHEASIDE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup. Unset variables keep defaults;
    /// set but unparsable variables are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            config.namespace = namespace;
        }

        if let Some(raw) = lookup(ENV_TTL_SECS) {
            config.ttl_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: ENV_TTL_SECS.to_string(),
                value: raw.clone(),
                reason: "expected a whole number of seconds".to_string(),
            })?;
        }

        if let Some(raw) = lookup(ENV_STRATEGY) {
            config.strategy = raw
                .trim()
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: ENV_STRATEGY.to_string(),
                    value: raw.clone(),
                    reason,
                })?;
        }

        config.validate()?;
        Ok(config)
    }
}
