//! # tally-cache: Key-Value Cache for the Tally POS Backend
//!
//! The cache holds serialized snapshots with a time-to-live. It is never
//! authoritative: a missing or stale entry costs a store round-trip, nothing
//! more.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KeyValueCache                                    │
//! │                                                                         │
//! │   get(key)                      → Option<String>                       │
//! │   set_with_expiry(key, ttl, v)                                         │
//! │   delete([keys])                → number removed                       │
//! │   keys_matching("bills:u1:*")   → [keys]                               │
//! │                                                                         │
//! │   ┌──────────────────┐        ┌──────────────────┐                     │
//! │   │   RedisCache     │        │   MemoryCache    │                     │
//! │   │  (production)    │        │  (fallback/test) │                     │
//! │   │  SCAN ... MATCH  │        │  glob * ?        │                     │
//! │   └──────────────────┘        └──────────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors are returned, not swallowed: deciding that a cache failure is
//! harmless is the caller's job (see `tally-engine`'s coherence layer).

pub mod error;
pub mod glob;
pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// Generic get / set-with-ttl / delete interface over a cache.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// The stored value, or `None` when absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn set_with_expiry(&self, key: &str, ttl: Duration, value: &str) -> CacheResult<()>;

    /// Removes the given keys. Returns how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Keys matching a glob pattern (`*` any run, `?` one character,
    /// `\` escapes).
    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Cheap liveness probe.
    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
