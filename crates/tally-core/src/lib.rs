//! # tally-core: Pure Business Logic for the Tally POS Backend
//!
//! This crate holds every rule that can be stated without touching the
//! document store or the cache: stock status derivation, bill totals,
//! statistics aggregation and bill number generation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/server (axum JSON adapter)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        tally-engine (InventoryLedger, BillingEngine,            │   │
//! │  │                      CacheCoherence)                            │   │
//! │  └───────────┬─────────────────┬───────────────────┬───────────────┘   │
//! │              │                 │                   │                    │
//! │  ┌───────────▼─────┐  ┌────────▼────────┐  ┌──────▼──────────┐        │
//! │  │ ★ tally-core ★  │  │    tally-db     │  │   tally-cache   │        │
//! │  │ types, stock,   │  │  RecordStore    │  │  KeyValueCache  │        │
//! │  │ stats, money    │  │  (PostgreSQL)   │  │  (Redis)        │        │
//! │  │ NO I/O          │  └─────────────────┘  └─────────────────┘        │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Inventory, Bill, Customer)
//! - [`stock`] - Stock status derivation
//! - [`stats`] - Bill statistics, popular products, export rows
//! - [`bill_number`] - Bill number generation
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::stock::derive_status;
//! use tally_core::StockStatus;
//!
//! assert_eq!(derive_status(0, 10), StockStatus::OutOfStock);
//! assert_eq!(derive_status(9, 10), StockStatus::LowStock);
//! assert_eq!(derive_status(11, 10), StockStatus::InStock);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bill_number;
pub mod error;
pub mod money;
pub mod stats;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Reorder threshold applied when an inventory record is created without one.
pub const DEFAULT_MIN_STOCK: i64 = 10;

/// Maximum line items allowed on a single bill.
pub const MAX_BILL_ITEMS: usize = 200;

/// Maximum page size for paginated bill listings.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Largest single amount (price, tax, discount, payment) accepted, in minor
/// units. Keeps `price × quantity` well inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Largest quantity a single bill line or stock movement may carry.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;
