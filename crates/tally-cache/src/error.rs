//! # Cache Error Types

use thiserror::Error;

/// Cache operation errors.
///
/// Never surfaced to API callers: the engine logs them and degrades to a
/// cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The Redis server rejected a command or the connection dropped.
    ///
    /// ## When This Occurs
    /// - Redis restarted or unreachable
    /// - Command timed out
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connecting to the cache at startup failed.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
