//! # tally-db: Document Store for the Tally POS Backend
//!
//! Every entity (product, inventory, bill, customer) is a JSON document
//! behind the [`RecordStore`] trait.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  InventoryLedger / BillingEngine                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  Collection<T>│    │  RecordStore  │    │  Migrations  │  │   │
//! │  │   │ (typed view)  │───►│  (trait)      │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                        ┌───────┴────────┐                      │   │
//! │  │                        ▼                ▼                      │   │
//! │  │                 PgRecordStore      MemoryStore                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PostgreSQL: documents(kind, id, seq, body JSONB, ...)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - `RecordStore` trait, `Query`, `IncrementOutcome`
//! - [`collection`] - `Document` trait and typed `Collection<T>`
//! - [`postgres`] - PostgreSQL implementation
//! - [`memory`] - In-memory implementation
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::connect(DbConfig::new(url)).await?;
//! let store: Arc<dyn RecordStore> = Arc::new(db.records());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collection;
pub mod error;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use collection::{Collection, Document};
pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use pool::{Database, DbConfig};
pub use postgres::PgRecordStore;
pub use store::{Filter, IncrementOutcome, Order, Query, RecordKind, RecordStore};
