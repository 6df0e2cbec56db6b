//! # Cache Coherence
//!
//! The single owner of cache key names, their lifetimes, and which keys a
//! mutation makes stale.
//!
//! ## Invalidation Fan-out
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Change                 Deletes                                         │
//! │  ─────────────────────  ─────────────────────────────────────────────   │
//! │  Product(id, barcode)   product:{id}  product:barcode:{barcode}         │
//! │                                                                         │
//! │  Inventory(...)         inventory:{id}  inventory:barcode:{barcode}     │
//! │                         inventory:all                                   │
//! │                         + Product(...) of the mirrored product          │
//! │                                                                         │
//! │  Bill(id, number, user) bill:{id}  bill:number:{number}                 │
//! │                         bills:{user}:*      (every list page)           │
//! │                         stats:*             (every user, every scope)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Adding a cached view means adding a [`CacheKey`] variant and listing it
//! in [`CacheCoherence::targets`]; nothing else builds key strings.
//!
//! Every cache call is best-effort. A failing cache logs a warning and
//! behaves like an empty one.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tally_cache::glob;
use tally_cache::KeyValueCache;
use tally_core::{Bill, Inventory, Product};
use tracing::{debug, warn};

// =============================================================================
// Cache Keys
// =============================================================================

/// Every cached view the engine maintains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Product(String),
    ProductByBarcode(String),
    Inventory(String),
    InventoryByBarcode(String),
    /// The unfiltered inventory list. Filtered lists are never cached.
    InventoryList,
    Bill(String),
    BillByNumber(String),
    BillList { user_id: String, page: u64, limit: u64 },
    /// `tag` is a stats scope resolved to its window, e.g. `daily:20260315`.
    Stats { user_id: String, tag: String },
    PopularProducts { user_id: String, limit: usize },
}

/// Lifetime classes, one per kind of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub product: Duration,
    pub inventory: Duration,
    pub inventory_list: Duration,
    pub bill: Duration,
    pub bill_list: Duration,
    pub stats: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        CacheTtls {
            product: Duration::from_secs(3600),
            inventory: Duration::from_secs(1800),
            inventory_list: Duration::from_secs(1800),
            bill: Duration::from_secs(600),
            bill_list: Duration::from_secs(300),
            stats: Duration::from_secs(60),
        }
    }
}

impl CacheKey {
    /// Key path without the deployment prefix.
    pub fn path(&self) -> String {
        match self {
            CacheKey::Product(id) => format!("product:{id}"),
            CacheKey::ProductByBarcode(barcode) => format!("product:barcode:{barcode}"),
            CacheKey::Inventory(id) => format!("inventory:{id}"),
            CacheKey::InventoryByBarcode(barcode) => format!("inventory:barcode:{barcode}"),
            CacheKey::InventoryList => "inventory:all".to_string(),
            CacheKey::Bill(id) => format!("bill:{id}"),
            CacheKey::BillByNumber(number) => format!("bill:number:{number}"),
            CacheKey::BillList { user_id, page, limit } => {
                format!("bills:{user_id}:page:{page}:limit:{limit}")
            }
            CacheKey::Stats { user_id, tag } => format!("stats:{user_id}:{tag}"),
            CacheKey::PopularProducts { user_id, limit } => {
                format!("stats:{user_id}:popular:{limit}")
            }
        }
    }

    pub fn ttl(&self, ttls: &CacheTtls) -> Duration {
        match self {
            CacheKey::Product(_) | CacheKey::ProductByBarcode(_) => ttls.product,
            CacheKey::Inventory(_) | CacheKey::InventoryByBarcode(_) => ttls.inventory,
            CacheKey::InventoryList => ttls.inventory_list,
            CacheKey::Bill(_) | CacheKey::BillByNumber(_) => ttls.bill,
            CacheKey::BillList { .. } => ttls.bill_list,
            CacheKey::Stats { .. } | CacheKey::PopularProducts { .. } => ttls.stats,
        }
    }
}

// =============================================================================
// Changes
// =============================================================================

/// A mutation whose cached views must be dropped.
#[derive(Debug, Clone, Copy)]
pub enum Change<'a> {
    Product {
        id: &'a str,
        barcode: Option<&'a str>,
    },
    Inventory {
        id: &'a str,
        barcode: Option<&'a str>,
        /// The product whose stock mirror was touched.
        product_id: Option<&'a str>,
        product_barcode: Option<&'a str>,
    },
    Bill {
        id: &'a str,
        bill_number: &'a str,
        user_id: &'a str,
    },
}

impl<'a> Change<'a> {
    pub fn product(product: &'a Product) -> Self {
        Change::Product {
            id: &product.id,
            barcode: product.barcode.as_deref(),
        }
    }

    /// An inventory write, plus the product mirror it updated if any.
    pub fn inventory(inventory: &'a Inventory, product: Option<&'a Product>) -> Self {
        Change::Inventory {
            id: &inventory.id,
            barcode: inventory.barcode.as_deref(),
            product_id: product
                .map(|p| p.id.as_str())
                .or(inventory.product_id.as_deref()),
            product_barcode: product.and_then(|p| p.barcode.as_deref()),
        }
    }

    pub fn bill(bill: &'a Bill) -> Self {
        Change::Bill {
            id: &bill.id,
            bill_number: &bill.bill_number,
            user_id: &bill.user_id,
        }
    }
}

/// Exact keys and glob patterns a change invalidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub keys: Vec<CacheKey>,
    /// Prefixed glob patterns.
    pub patterns: Vec<String>,
}

impl Targets {
    fn key(&mut self, key: CacheKey) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }
}

// =============================================================================
// Cache Coherence
// =============================================================================

/// Best-effort, typed access to the cache with centralized invalidation.
///
/// Cheap to clone; all clones share one cache handle.
#[derive(Clone)]
pub struct CacheCoherence {
    cache: Arc<dyn KeyValueCache>,
    prefix: String,
    ttls: CacheTtls,
}

impl std::fmt::Debug for CacheCoherence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoherence")
            .field("prefix", &self.prefix)
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl CacheCoherence {
    /// `prefix` namespaces every key (`"tally"` → `tally:product:...`);
    /// an empty prefix leaves keys bare.
    pub fn new(cache: Arc<dyn KeyValueCache>, prefix: impl Into<String>, ttls: CacheTtls) -> Self {
        CacheCoherence {
            cache,
            prefix: prefix.into(),
            ttls,
        }
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Full key string for `key`.
    pub fn key(&self, key: &CacheKey) -> String {
        self.prefixed(&key.path())
    }

    fn prefixed(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}:{}", self.prefix, path)
        }
    }

    /// Everything `change` can make stale.
    pub fn targets(&self, change: &Change<'_>) -> Targets {
        let mut targets = Targets::default();

        match *change {
            Change::Product { id, barcode } => {
                targets.key(CacheKey::Product(id.to_string()));
                if let Some(barcode) = barcode {
                    targets.key(CacheKey::ProductByBarcode(barcode.to_string()));
                }
            }

            Change::Inventory {
                id,
                barcode,
                product_id,
                product_barcode,
            } => {
                targets.key(CacheKey::Inventory(id.to_string()));
                if let Some(barcode) = barcode {
                    targets.key(CacheKey::InventoryByBarcode(barcode.to_string()));
                }
                targets.key(CacheKey::InventoryList);

                // the stock mirror lives on the product
                if let Some(product_id) = product_id {
                    targets.key(CacheKey::Product(product_id.to_string()));
                }
                if let Some(barcode) = product_barcode.or(barcode) {
                    targets.key(CacheKey::ProductByBarcode(barcode.to_string()));
                }
            }

            Change::Bill {
                id,
                bill_number,
                user_id,
            } => {
                targets.key(CacheKey::Bill(id.to_string()));
                targets.key(CacheKey::BillByNumber(bill_number.to_string()));
                targets
                    .patterns
                    .push(self.prefixed(&format!("bills:{}:*", glob::escape(user_id))));
                // coarse: stats of every user and scope
                targets.patterns.push(self.prefixed("stats:*"));
            }
        }

        targets
    }

    /// Cached value for `key`, or `None` on miss, cache failure, or an entry
    /// that no longer decodes (which is then dropped).
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let full = self.key(key);

        let raw = match self.cache.get(&full).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %full, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %full, error = %e, "cache read failed, falling back to store");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key = %full, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %full, error = %e, "dropping undecodable cache entry");
                if let Err(e) = self.cache.delete(&[full.clone()]).await {
                    warn!(key = %full, error = %e, "cache delete failed");
                }
                None
            }
        }
    }

    /// Stores `value` under `key` with the key's TTL class.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        let full = self.key(key);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %full, error = %e, "cache value does not serialize");
                return;
            }
        };

        let ttl = key.ttl(&self.ttls);
        match self.cache.set_with_expiry(&full, ttl, &raw).await {
            Ok(()) => debug!(key = %full, ttl_secs = ttl.as_secs(), "cache populated"),
            Err(e) => warn!(key = %full, error = %e, "cache write failed"),
        }
    }

    /// Drops every cached view `change` can make stale.
    pub async fn invalidate(&self, change: &Change<'_>) {
        let targets = self.targets(change);
        let mut keys: Vec<String> = targets.keys.iter().map(|k| self.key(k)).collect();

        for pattern in &targets.patterns {
            match self.cache.keys_matching(pattern).await {
                Ok(found) => keys.extend(found),
                Err(e) => warn!(pattern = %pattern, error = %e, "cache scan failed"),
            }
        }

        keys.sort_unstable();
        keys.dedup();

        match self.cache.delete(&keys).await {
            Ok(removed) => debug!(requested = keys.len(), removed, "cache invalidated"),
            Err(e) => warn!(error = %e, "cache invalidation failed"),
        }
    }

    /// Whether the cache answers at all.
    pub async fn is_healthy(&self) -> bool {
        self.cache.ping().await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{product, FailingCache};
    use serde::Deserialize;
    use tally_cache::MemoryCache;

    fn coherence(cache: Arc<dyn KeyValueCache>) -> CacheCoherence {
        CacheCoherence::new(cache, "tally", CacheTtls::default())
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Snapshot {
        stock: i64,
    }

    #[test]
    fn test_key_paths_and_ttls() {
        let c = coherence(Arc::new(MemoryCache::new()));
        assert_eq!(c.key(&CacheKey::Product("p1".into())), "tally:product:p1");
        assert_eq!(c.key(&CacheKey::InventoryList), "tally:inventory:all");
        assert_eq!(
            c.key(&CacheKey::BillList {
                user_id: "u1".into(),
                page: 2,
                limit: 20
            }),
            "tally:bills:u1:page:2:limit:20"
        );

        let ttls = CacheTtls::default();
        assert_eq!(CacheKey::InventoryList.ttl(&ttls), Duration::from_secs(1800));
        assert_eq!(CacheKey::Bill("b".into()).ttl(&ttls), Duration::from_secs(600));
        assert_eq!(
            CacheKey::Stats {
                user_id: "u".into(),
                tag: "all_time".into()
            }
            .ttl(&ttls),
            Duration::from_secs(60)
        );

        let bare = CacheCoherence::new(Arc::new(MemoryCache::new()), "", ttls);
        assert_eq!(bare.key(&CacheKey::Bill("b1".into())), "bill:b1");
    }

    #[test]
    fn test_inventory_change_fans_out_to_product() {
        let c = coherence(Arc::new(MemoryCache::new()));
        let targets = c.targets(&Change::Inventory {
            id: "i1",
            barcode: Some("890"),
            product_id: Some("p1"),
            product_barcode: None,
        });

        assert_eq!(
            targets.keys,
            vec![
                CacheKey::Inventory("i1".into()),
                CacheKey::InventoryByBarcode("890".into()),
                CacheKey::InventoryList,
                CacheKey::Product("p1".into()),
                CacheKey::ProductByBarcode("890".into()),
            ]
        );
        assert!(targets.patterns.is_empty());
    }

    #[test]
    fn test_bill_change_is_coarse_on_stats() {
        let c = coherence(Arc::new(MemoryCache::new()));
        let targets = c.targets(&Change::Bill {
            id: "b1",
            bill_number: "B1",
            user_id: "u*1",
        });
        assert_eq!(
            targets.patterns,
            vec![r"tally:bills:u\*1:*".to_string(), "tally:stats:*".to_string()]
        );
    }

    #[tokio::test]
    async fn test_product_cache_invalidation_forces_miss() {
        let cache = Arc::new(MemoryCache::new());
        let c = coherence(cache.clone());
        let p = product("p1", Some("890"), 5);

        c.put(&CacheKey::Product(p.id.clone()), &p).await;
        let cached: Option<Product> = c.get(&CacheKey::Product(p.id.clone())).await;
        assert_eq!(cached.as_ref(), Some(&p));

        c.invalidate(&Change::product(&p)).await;

        let cached: Option<Product> = c.get(&CacheKey::Product(p.id.clone())).await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_bill_invalidation_clears_lists_and_all_stats() {
        let cache = Arc::new(MemoryCache::new());
        let c = coherence(cache.clone());
        let snap = Snapshot { stock: 1 };

        let u1_page = CacheKey::BillList {
            user_id: "u1".into(),
            page: 3,
            limit: 10,
        };
        let u2_page = CacheKey::BillList {
            user_id: "u2".into(),
            page: 1,
            limit: 10,
        };
        let u2_stats = CacheKey::Stats {
            user_id: "u2".into(),
            tag: "all_time".into(),
        };
        for key in [&u1_page, &u2_page, &u2_stats] {
            c.put(key, &snap).await;
        }

        c.invalidate(&Change::Bill {
            id: "b1",
            bill_number: "B1",
            user_id: "u1",
        })
        .await;

        assert!(c.get::<Snapshot>(&u1_page).await.is_none());
        assert!(c.get::<Snapshot>(&u2_stats).await.is_none());
        assert_eq!(c.get::<Snapshot>(&u2_page).await, Some(Snapshot { stock: 1 }));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_dropped() {
        let cache = Arc::new(MemoryCache::new());
        let c = coherence(cache.clone());
        cache
            .set_with_expiry("tally:inventory:i1", Duration::from_secs(60), "{not json")
            .await
            .unwrap();

        assert!(c.get::<Snapshot>(&CacheKey::Inventory("i1".into())).await.is_none());
        assert!(cache.get("tally:inventory:i1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_cache_degrades_to_miss() {
        let c = coherence(Arc::new(FailingCache));
        let key = CacheKey::Inventory("i1".into());

        c.put(&key, &Snapshot { stock: 1 }).await;
        assert!(c.get::<Snapshot>(&key).await.is_none());
        c.invalidate(&Change::Bill {
            id: "b",
            bill_number: "B",
            user_id: "u",
        })
        .await;
        assert!(!c.is_healthy().await);
    }
}
