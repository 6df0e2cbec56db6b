//! Shared fixtures for engine tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tally_cache::{CacheError, CacheResult, KeyValueCache, MemoryCache};
use serde_json::Value;
use tally_core::{new_id, Product};
use tally_db::{
    Collection, DbError, DbResult, IncrementOutcome, MemoryStore, Query, RecordKind, RecordStore,
};

use crate::billing::BillingEngine;
use crate::coherence::{CacheCoherence, CacheTtls};
use crate::inventory::InventoryLedger;

/// A cache whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingCache;

fn down() -> CacheError {
    CacheError::Unavailable("cache is down".to_string())
}

#[async_trait]
impl KeyValueCache for FailingCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(down())
    }

    async fn set_with_expiry(&self, _key: &str, _ttl: Duration, _value: &str) -> CacheResult<()> {
        Err(down())
    }

    async fn delete(&self, _keys: &[String]) -> CacheResult<u64> {
        Err(down())
    }

    async fn keys_matching(&self, _pattern: &str) -> CacheResult<Vec<String>> {
        Err(down())
    }

    async fn ping(&self) -> CacheResult<()> {
        Err(down())
    }
}

/// A memory store whose `update` can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyUpdates {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyUpdates {
    pub fn fail_updates(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyUpdates {
    async fn find(&self, kind: RecordKind, query: &Query) -> DbResult<Vec<Value>> {
        self.inner.find(kind, query).await
    }

    async fn insert(&self, kind: RecordKind, doc: Value) -> DbResult<Value> {
        self.inner.insert(kind, doc).await
    }

    async fn update(&self, kind: RecordKind, id: &str, patch: Value) -> DbResult<Option<Value>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DbError::QueryFailed("update refused".to_string()));
        }
        self.inner.update(kind, id, patch).await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> DbResult<bool> {
        self.inner.delete(kind, id).await
    }

    async fn count(&self, kind: RecordKind, query: &Query) -> DbResult<u64> {
        self.inner.count(kind, query).await
    }

    async fn increment(
        &self,
        kind: RecordKind,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> DbResult<IncrementOutcome> {
        self.inner.increment(kind, id, field, delta, floor).await
    }
}

pub fn product(id: &str, barcode: Option<&str>, stock: i64) -> Product {
    let now = Utc::now();
    Product {
        id: id.to_string(),
        name: format!("Product {id}"),
        category: None,
        price_cents: 250,
        stock,
        barcode: barcode.map(str::to_string),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Store, cache and engines wired together in memory.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub coherence: CacheCoherence,
    pub ledger: Arc<InventoryLedger>,
    pub billing: BillingEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cache_backend(None)
    }

    /// Same wiring, but every cache call fails.
    pub fn with_failing_cache() -> Self {
        Self::with_cache_backend(Some(Arc::new(FailingCache)))
    }

    /// Engines over `records` instead of the plain memory store. `products()`
    /// and `store` still point at a separate memory store.
    pub fn with_records(records: Arc<dyn RecordStore>) -> Self {
        Self::build(Arc::new(MemoryStore::new()), records, None)
    }

    fn with_cache_backend(backend: Option<Arc<dyn KeyValueCache>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let records: Arc<dyn RecordStore> = store.clone();
        Self::build(store, records, backend)
    }

    fn build(
        store: Arc<MemoryStore>,
        records: Arc<dyn RecordStore>,
        backend: Option<Arc<dyn KeyValueCache>>,
    ) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let backend: Arc<dyn KeyValueCache> = match backend {
            Some(backend) => backend,
            None => cache.clone(),
        };

        let coherence = CacheCoherence::new(backend, "test", CacheTtls::default());
        let ledger = Arc::new(InventoryLedger::new(records.clone(), coherence.clone()));
        let billing = BillingEngine::new(records, ledger.clone(), coherence.clone());

        Harness {
            store,
            cache,
            coherence,
            ledger,
            billing,
        }
    }

    pub fn products(&self) -> Collection<Product> {
        Collection::new(self.store.clone())
    }

    pub async fn add_product(&self, barcode: Option<&str>) -> Product {
        let p = product(&new_id(), barcode, 0);
        self.products().insert(&p).await.unwrap()
    }
}
