//! # Database Error Types
//!
//! Error types for document store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL Error (sqlx::Error) / serde_json::Error                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (tally-engine) ← Conflict / NotFound / Store              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (server) ← HTTP status + envelope                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::store::RecordKind;

/// Document store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found.
    ///
    /// ## When This Occurs
    /// - A typed lookup that requires the document finds nothing
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a second inventory record for the same product
    /// - Duplicate barcode or bill number
    /// - Reusing a document id
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A document is not a JSON object with a string `id`, or a stored
    /// body no longer decodes into its domain type.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Server unreachable or credentials rejected
    /// - Pool closed during shutdown
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Document (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether this error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Resolves a unique index name (`uq_<kind>_<field>`, or the primary key)
/// back to the document field it guards.
///
/// PostgreSQL folds unquoted identifiers to lower case, so the comparison
/// ignores case.
pub(crate) fn field_for_constraint(constraint: &str) -> Option<&'static str> {
    if constraint == "documents_pkey" {
        return Some("id");
    }

    RecordKind::ALL.iter().find_map(|kind| {
        kind.unique_fields().iter().copied().find(|field| {
            constraint.eq_ignore_ascii_case(&format!("uq_{}_{}", kind.as_str(), field))
        })
    })
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound        → DbError::NotFound
/// sqlx::Error::Database (23505)   → DbError::UniqueViolation (field from index name)
/// sqlx::Error::Database (other)   → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut       → DbError::PoolExhausted
/// Other                           → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let field = db_err
                        .constraint()
                        .and_then(field_for_constraint)
                        .unwrap_or("unknown");
                    DbError::duplicate(field, "unknown")
                } else {
                    DbError::QueryFailed(db_err.message().to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_names_map_to_fields() {
        assert_eq!(field_for_constraint("uq_inventory_productid"), Some("productId"));
        assert_eq!(field_for_constraint("uq_inventory_barcode"), Some("barcode"));
        assert_eq!(field_for_constraint("uq_bill_billnumber"), Some("billNumber"));
        assert_eq!(field_for_constraint("documents_pkey"), Some("id"));
        assert_eq!(field_for_constraint("something_else"), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DbError::duplicate("barcode", "890").to_string(),
            "Duplicate barcode: '890' already exists"
        );
        assert_eq!(
            DbError::not_found("Inventory", "abc").to_string(),
            "Inventory not found: abc"
        );
        assert!(DbError::duplicate("phone", "1").is_unique_violation());
    }
}
