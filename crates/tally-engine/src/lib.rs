//! # tally-engine: Inventory, Billing and Cache Coherence
//!
//! The orchestration layer. Everything here talks to a [`RecordStore`] for
//! authoritative state and to a [`KeyValueCache`] for disposable views, and
//! keeps the two from disagreeing for longer than a cache TTL.
//!
//! ## Components
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   BillingEngine ─────────────► InventoryLedger                         │
//! │     create / void / stats        find_or_create / adjust / deduct      │
//! │          │                              │                               │
//! │          └──────────┬───────────────────┘                               │
//! │                     ▼                                                   │
//! │              CacheCoherence        sole owner of key names, TTLs and   │
//! │                     │              invalidation fan-out                │
//! │          ┌──────────┴──────────┐                                        │
//! │          ▼                     ▼                                        │
//! │     RecordStore          KeyValueCache                                  │
//! │     (authoritative)      (best-effort)                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Policy
//! - Store failures on writes are returned to the caller.
//! - Cache failures are logged and treated as misses. They never fail a call.
//! - Per-item stock problems are part of a successful deduction result.
//!
//! [`RecordStore`]: tally_db::RecordStore
//! [`KeyValueCache`]: tally_cache::KeyValueCache

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod coherence;
pub mod error;
pub mod inventory;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use billing::{
    BillMetadataPatch, BillPage, BillingEngine, CreatedBill, NewBill, NewBillItem, VoidedBill,
};
pub use coherence::{CacheCoherence, CacheKey, CacheTtls, Change, Targets};
pub use error::{EngineError, EngineResult};
pub use inventory::{
    DeductionReport, InventoryFilter, InventoryLedger, ItemFailure, RestockReport,
    StockMovement, StockRegistration,
};
