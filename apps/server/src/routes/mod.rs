//! HTTP routes and the shared response envelope.

pub mod bills;
pub mod inventory;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tally_db::migrations::migration_status;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// Header carrying the authenticated caller. Authentication happens upstream.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Builds the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(inventory::routes())
        .merge(bills::routes())
        .with_state(state)
}

// =============================================================================
// Envelope
// =============================================================================

/// `{ "success": true, "data": ..., "count"?: n, "pagination"?: {...} }`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Envelope {
            success: true,
            data,
            count: None,
            pagination: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// =============================================================================
// Caller Identity
// =============================================================================

/// The caller's user id, from the `x-user-id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
            .ok_or_else(|| ApiError::unauthorized(format!("{USER_ID_HEADER} header is required")))
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    store: bool,
    cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrations: Option<Migrations>,
}

#[derive(Debug, Serialize)]
struct Migrations {
    total: usize,
    applied: usize,
}

/// Store down is unhealthy; cache down is only degraded.
async fn health(State(state): State<AppState>) -> Response {
    let store = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Store health check failed");
            false
        }
    };
    let cache = state.cache.is_healthy().await;

    let migrations = match &state.database {
        Some(db) => match migration_status(db.pool()).await {
            Ok((total, applied)) => Some(Migrations { total, applied }),
            Err(e) => {
                warn!(error = %e, "Migration status unavailable");
                None
            }
        },
        None => None,
    };

    let status = match (store, cache) {
        (true, true) => "ok",
        (true, false) => "degraded",
        (false, _) => "unavailable",
    };
    let code = if store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = Envelope {
        success: store,
        data: Health {
            status,
            store,
            cache,
            migrations,
        },
        count: None,
        pagination: None,
    };
    (code, body).into_response()
}

// =============================================================================
// Router Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::Value;
    use std::sync::Arc;
    use tally_cache::MemoryCache;
    use tally_db::MemoryStore;
    use tally_engine::CacheTtls;
    use tower::ServiceExt;

    pub(crate) fn app() -> Router {
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCache::new()),
            "test",
            CacheTtls::default(),
        );
        router(state)
    }

    /// Sends one request and returns status plus parsed JSON body.
    pub(crate) async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user);
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
        assert!(body["data"].get("migrations").is_none());
    }

    #[tokio::test]
    async fn test_missing_user_header() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/api/bills", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }
}
