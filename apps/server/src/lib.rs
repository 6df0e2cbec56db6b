//! # Tally Server
//!
//! Thin axum adapter over [`tally_engine`]. Handlers parse the request, call
//! one engine operation, and wrap the result in the JSON envelope.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HTTP ──► Router ──► handler ──► InventoryLedger / BillingEngine        │
//! │                         │                                               │
//! │                         ▼                                               │
//! │           { "success": true, "data": ..., "count"?, "pagination"? }    │
//! │           { "success": false, "error": "...", "code": "..." }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use tally_cache::KeyValueCache;
use tally_db::{Database, RecordStore};
use tally_engine::{BillingEngine, CacheCoherence, CacheTtls, InventoryLedger};

pub use routes::router;

/// Shared application state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<InventoryLedger>,
    pub billing: BillingEngine,
    pub cache: CacheCoherence,
    pub store: Arc<dyn RecordStore>,
    /// Present when running on PostgreSQL; used for migration status.
    pub database: Option<Database>,
}

impl AppState {
    /// Wires the engines over the given store and cache handles.
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn KeyValueCache>,
        key_prefix: &str,
        ttls: CacheTtls,
    ) -> Self {
        let coherence = CacheCoherence::new(cache, key_prefix, ttls);
        let ledger = Arc::new(InventoryLedger::new(store.clone(), coherence.clone()));
        let billing = BillingEngine::new(store.clone(), ledger.clone(), coherence.clone());

        AppState {
            ledger,
            billing,
            cache: coherence,
            store,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}
