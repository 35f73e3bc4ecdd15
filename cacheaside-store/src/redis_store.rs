//! Redis-backed cache store.
//!
//! Every batch is issued as one round trip: writes go through a pipeline,
//! reads use `MGET`/`HMGET`. A Redis nil maps to "absent from the read
//! result"; a stored empty string is returned as a negative entry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cacheaside_core::{Entry, StoreError};
use redis::aio::ConnectionManager;
use redis::Client;
use serde::{Deserialize, Serialize};

use crate::traits::{CacheStore, HashCacheStore, ReadResult};

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u8,
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            database: 0,
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Generate Redis connection URL
    pub fn connection_url(&self) -> String {
        let scheme = if self.tls_enabled { "rediss" } else { "redis" };
        let auth = match &self.password {
            Some(pwd) if !pwd.is_empty() => format!(":{}@", pwd),
            _ => String::new(),
        };
        format!(
            "{}://{}{}:{}/{}",
            scheme, auth, self.host, self.port, self.database
        )
    }
}

/// `PX` takes whole milliseconds and rejects 0.
fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

fn collect_found(names: &[String], values: Vec<Option<Vec<u8>>>) -> ReadResult {
    names
        .iter()
        .zip(values)
        .filter_map(|(name, value)| value.map(|data| (name.clone(), data)))
        .collect()
}

/// Store implementing [`CacheStore`] and [`HashCacheStore`] on a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect using the given configuration.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let connection_error = |e: redis::RedisError| StoreError::Connection {
            backend: "redis".to_string(),
            reason: e.to_string(),
        };
        let client = Client::open(config.connection_url()).map_err(connection_error)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(connection_error)?;
        tracing::debug!(host = %config.host, port = config.port, "connected to redis");
        Ok(Self { connection })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn mset(&self, ttl: Option<Duration>, entries: &[Entry<'_>]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for entry in entries {
            let cmd = pipe.cmd("SET").arg(entry.key).arg(entry.data);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            cmd.ignore();
        }
        let mut conn = self.connection.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::command("SET", e))
    }

    async fn mget(&self, keys: &[String]) -> Result<ReadResult, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.connection.clone();
        let values = redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<Vec<u8>>>>(&mut conn)
            .await
            .map_err(|e| StoreError::command("MGET", e))?;
        Ok(collect_found(keys, values))
    }

    async fn mdel(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::command("DEL", e))
    }
}

#[async_trait]
impl HashCacheStore for RedisStore {
    async fn hmset(
        &self,
        key: &str,
        ttl: Option<Duration>,
        entries: &[Entry<'_>],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        let hset = pipe.cmd("HSET").arg(key);
        for entry in entries {
            hset.arg(entry.key).arg(entry.data);
        }
        hset.ignore();
        if let Some(ttl) = ttl {
            pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
        }
        let mut conn = self.connection.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::command("HSET", e))
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<ReadResult, StoreError> {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.connection.clone();
        let values = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async::<Vec<Option<Vec<u8>>>>(&mut conn)
            .await
            .map_err(|e| StoreError::command("HMGET", e))?;
        Ok(collect_found(fields, values))
    }

    async fn hmdel(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        redis::cmd("HDEL")
            .arg(key)
            .arg(fields)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::command("HDEL", e))
    }

    async fn hdel(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| StoreError::command("DEL", e))
    }
}
