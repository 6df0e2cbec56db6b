//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally                                  │
//! │                                                                         │
//! │  Handler → Result<T, ApiError>                                          │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  EngineError::Validation ─── 400 VALIDATION_ERROR ───┐                 │
//! │  EngineError::NotFound   ─── 404 NOT_FOUND ──────────┤                 │
//! │  EngineError::Conflict   ─── 409 CONFLICT ───────────┼──► JSON body    │
//! │  EngineError::Store      ─── 500 STORE_ERROR ────────┤   (logged,      │
//! │  Bad JSON / query / hdr  ─── 400 / 401 ──────────────┘    generic)     │
//! │                                                                         │
//! │  { "success": false, "error": "Bill not found: b-1", "code": "..." }   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_engine::EngineError;

/// Error returned from every handler.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Caller identity missing (401)
    Unauthorized,

    /// Resource not found (404)
    NotFound,

    /// Clashes with existing state (409)
    Conflict,

    /// Document store failure (500)
    StoreError,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    code: ErrorCode,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
    }
}

/// Converts engine errors to API errors.
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(e) => ApiError::validation(e.to_string()),
            EngineError::NotFound { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, err.to_string())
            }
            EngineError::Conflict(msg) => {
                ApiError::new(StatusCode::CONFLICT, ErrorCode::Conflict, msg)
            }
            EngineError::Store(e) => {
                // Log the actual error but return a generic message
                tracing::error!(error = %e, "Store operation failed");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::StoreError,
                    "Database operation failed",
                )
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: &self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::ValidationError;
    use tally_db::DbError;

    #[test]
    fn test_engine_error_mapping() {
        let err = ApiError::from(EngineError::from(ValidationError::required("items")));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "items is required");

        let err = ApiError::from(EngineError::not_found("Bill", "b-1"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Bill not found: b-1");

        let err = ApiError::from(EngineError::Conflict("Bill B-1 is already voided".into()));
        assert_eq!(err.code, ErrorCode::Conflict);

        let err = ApiError::from(EngineError::Store(DbError::PoolExhausted));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Database operation failed");
    }
}
