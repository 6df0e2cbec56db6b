//! # Redis Cache
//!
//! [`KeyValueCache`] over a multiplexed, auto-reconnecting Redis connection.
//! One `RedisCache` is created at startup and cloned into every component.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{CacheError, CacheResult};
use crate::KeyValueCache;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Opens a connection manager to `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        info!("Connected to Redis");
        Ok(RedisCache { conn })
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        debug!(key, hit = value.is_some(), "redis get");
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, ttl: Duration, value: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        // SET with EX rejects 0, so round sub-second TTLs up
        let secs = ttl.as_secs().max(1);
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await?;
        debug!(key, ttl_secs = secs, "redis set");
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = ::redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        debug!(requested = keys.len(), removed, "redis del");
        Ok(removed)
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        // SCAN instead of KEYS: never blocks the server on a large keyspace
        loop {
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern, count = keys.len(), "redis scan");
        Ok(keys)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
