//! # In-Process Cache
//!
//! A TTL-bounded map used when Redis is not configured or unreachable, and
//! in tests. Expiry uses `tokio::time::Instant`, so tests can pause and
//! advance the clock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::CacheResult;
use crate::glob::glob_match;
use crate::KeyValueCache;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        // expired: drop it lazily
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_with_expiry(&self, key: &str, ttl: Duration, value: &str) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|e| e.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set_with_expiry("product:1", Duration::from_secs(60), "v1")
            .await
            .unwrap();

        assert_eq!(cache.get("product:1").await.unwrap().as_deref(), Some("v1"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("product:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("product:1").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_replaces_and_delete_counts() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set_with_expiry("a", ttl, "1").await.unwrap();
        cache.set_with_expiry("a", ttl, "2").await.unwrap();
        cache.set_with_expiry("b", ttl, "3").await.unwrap();

        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("2"));

        let removed = cache
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_matching_skips_expired() {
        let cache = MemoryCache::new();
        cache
            .set_with_expiry("bills:u1:page:1:limit:20", Duration::from_secs(300), "x")
            .await
            .unwrap();
        cache
            .set_with_expiry("bills:u1:page:2:limit:20", Duration::from_secs(5), "x")
            .await
            .unwrap();
        cache
            .set_with_expiry("bills:u2:page:1:limit:20", Duration::from_secs(300), "x")
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;

        let keys = cache.keys_matching("bills:u1:*").await.unwrap();
        assert_eq!(keys, vec!["bills:u1:page:1:limit:20".to_string()]);
    }
}
