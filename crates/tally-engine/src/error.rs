//! # Engine Error Types
//!
//! The error taxonomy callers of the engine see.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Variant      Caller's fault?   Typical source                          │
//! │  ──────────   ───────────────   ─────────────────────────────────────   │
//! │  Validation   yes               missing items, bad quantity, totals     │
//! │  NotFound     yes               unknown inventory id / bill number      │
//! │  Conflict     yes               duplicate barcode, bill already voided  │
//! │  Store        no                PostgreSQL unavailable                  │
//! │                                                                         │
//! │  There is no cache variant: cache failures never leave the engine.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, ValidationError};
use tally_db::DbError;
use thiserror::Error;

/// Errors returned by the ledger and the billing engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed input, with a field-level message.
    #[error("{0}")]
    Validation(ValidationError),

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The request clashes with existing state.
    ///
    /// ## When This Occurs
    /// - Unique barcode / product / bill number already taken
    /// - Voiding a bill twice
    /// - No free bill number after retries
    #[error("{0}")]
    Conflict(String),

    /// Infrastructure failure in the document store.
    #[error("Store error: {0}")]
    Store(DbError),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err)
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UniqueViolation { .. } => EngineError::Conflict(err.to_string()),
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Store(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => EngineError::Validation(v),
            CoreError::InconsistentTotals { .. } => {
                EngineError::Validation(ValidationError::InvalidFormat {
                    field: "totalCents".to_string(),
                    reason: err.to_string(),
                })
            }
            CoreError::InsufficientStock { .. } => EngineError::Conflict(err.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_mapping() {
        assert!(matches!(
            EngineError::from(DbError::duplicate("barcode", "890")),
            EngineError::Conflict(ref m) if m.contains("890")
        ));
        assert!(matches!(
            EngineError::from(DbError::not_found("Bill", "b1")),
            EngineError::NotFound { ref id, .. } if id == "b1"
        ));
        assert!(matches!(
            EngineError::from(DbError::PoolExhausted),
            EngineError::Store(_)
        ));
    }

    #[test]
    fn test_core_error_mapping() {
        let err = CoreError::InconsistentTotals {
            subtotal: 100,
            tax: 0,
            discount: 0,
            total: 90,
        };
        assert!(matches!(EngineError::from(err), EngineError::Validation(_)));

        let err: EngineError = CoreError::from(ValidationError::required("items")).into();
        assert_eq!(err.to_string(), "items is required");
    }
}
