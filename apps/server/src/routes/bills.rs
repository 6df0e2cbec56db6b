//! Bill endpoints.
//!
//! User-scoped routes (create, list, statistics, export) read the caller
//! from the `x-user-id` header.
//!
//! | Method | Path                           | Engine call               |
//! |--------|--------------------------------|---------------------------|
//! | POST   | /api/bills                     | create_bill               |
//! | GET    | /api/bills                     | list_bills                |
//! | GET    | /api/bills/stats               | stats                     |
//! | GET    | /api/bills/popular-products    | popular_products          |
//! | GET    | /api/bills/payment-methods     | payment_method_breakdown  |
//! | GET    | /api/bills/export              | export_rows               |
//! | GET    | /api/bills/number/{number}     | get_bill_by_number        |
//! | GET    | /api/bills/{id}                | get_bill                  |
//! | PATCH  | /api/bills/{id}                | update_bill_metadata      |
//! | DELETE | /api/bills/{id}                | delete_bill               |
//! | POST   | /api/bills/{id}/void           | void_and_restock          |

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tally_core::stats::{
    default_export_window, BillExportRow, BillStats, MethodTotals, PopularProduct, StatsScope,
    TimeWindow,
};
use tally_core::{Bill, PaymentMethod};
use tally_engine::{BillMetadataPatch, NewBill, VoidedBill};

use super::{Envelope, Pagination, UserId};
use crate::error::ApiResult;
use crate::AppState;

const DEFAULT_PAGE_SIZE: u64 = 20;
const DEFAULT_POPULAR_LIMIT: usize = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bills", post(create_bill).get(list_bills))
        .route("/api/bills/stats", get(stats))
        .route("/api/bills/popular-products", get(popular_products))
        .route("/api/bills/payment-methods", get(payment_methods))
        .route("/api/bills/export", get(export))
        .route("/api/bills/number/{number}", get(get_bill_by_number))
        .route(
            "/api/bills/{id}",
            get(get_bill).patch(update_bill).delete(delete_bill),
        )
        .route("/api/bills/{id}/void", post(void_bill))
}

// =============================================================================
// Query Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
    /// daily | monthly | yearly | all_time (default daily)
    pub period: Option<StatsScope>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PopularParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ExportParams {
    /// A missing bound is filled from the default 30-day window ending now.
    fn window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        match (self.from, self.to) {
            (None, None) => None,
            (Some(from), Some(to)) => Some(TimeWindow { from, to }),
            (Some(from), None) => Some(TimeWindow {
                from,
                to: default_export_window(now).to,
            }),
            (None, Some(to)) => Some(TimeWindow {
                from: to - Duration::days(30),
                to,
            }),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_bill(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    body: Result<Json<NewBill>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_bill) = body?;
    let created = state.billing.create_bill(&user_id, new_bill).await?;
    Ok((StatusCode::CREATED, Envelope::ok(created)))
}

async fn list_bills(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Envelope<Vec<Bill>>> {
    let Query(params) = params?;
    let listing = state
        .billing
        .list_bills(
            &user_id,
            params.page.unwrap_or(1),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    let pagination = Pagination {
        page: listing.page,
        limit: listing.limit,
        total: listing.total,
        pages: listing.pages,
    };
    let count = listing.bills.len();
    Ok(Envelope::ok(listing.bills)
        .with_count(count)
        .with_pagination(pagination))
}

async fn stats(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    params: Result<Query<PeriodParams>, QueryRejection>,
) -> ApiResult<Envelope<BillStats>> {
    let Query(params) = params?;
    let scope = params.period.unwrap_or(StatsScope::Daily);
    Ok(Envelope::ok(state.billing.stats(&user_id, scope).await?))
}

async fn payment_methods(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    params: Result<Query<PeriodParams>, QueryRejection>,
) -> ApiResult<Envelope<BTreeMap<PaymentMethod, MethodTotals>>> {
    let Query(params) = params?;
    let scope = params.period.unwrap_or(StatsScope::Daily);
    Ok(Envelope::ok(
        state
            .billing
            .payment_method_breakdown(&user_id, scope)
            .await?,
    ))
}

async fn popular_products(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    params: Result<Query<PopularParams>, QueryRejection>,
) -> ApiResult<Envelope<Vec<PopularProduct>>> {
    let Query(params) = params?;
    let ranked = state
        .billing
        .popular_products(&user_id, params.limit.unwrap_or(DEFAULT_POPULAR_LIMIT))
        .await?;
    let count = ranked.len();
    Ok(Envelope::ok(ranked).with_count(count))
}

async fn export(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> ApiResult<Envelope<Vec<BillExportRow>>> {
    let Query(params) = params?;
    let rows = state
        .billing
        .export_rows(&user_id, params.window(Utc::now()))
        .await?;
    let count = rows.len();
    Ok(Envelope::ok(rows).with_count(count))
}

async fn get_bill_by_number(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> ApiResult<Envelope<Bill>> {
    Ok(Envelope::ok(state.billing.get_bill_by_number(&number).await?))
}

async fn get_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Bill>> {
    Ok(Envelope::ok(state.billing.get_bill(&id).await?))
}

async fn update_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<BillMetadataPatch>, JsonRejection>,
) -> ApiResult<Envelope<Bill>> {
    let Json(patch) = body?;
    Ok(Envelope::ok(
        state.billing.update_bill_metadata(&id, patch).await?,
    ))
}

async fn delete_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Bill>> {
    Ok(Envelope::ok(state.billing.delete_bill(&id).await?))
}

async fn void_bill(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<VoidedBill>> {
    Ok(Envelope::ok(state.billing.void_and_restock(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{app, send};
    use axum::http::Method;
    use serde_json::{json, Value};

    async fn create(app: &Router, user: &str, barcode: &str, price: i64) -> Value {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/bills",
            Some(user),
            Some(json!({
                "items": [{ "barcode": barcode, "name": "Tea", "unitPriceCents": price, "quantity": 2 }],
                "paymentMethod": "cash",
                "amountReceivedCents": 1000
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn test_create_list_and_stats() {
        let app = app();
        send(
            &app,
            Method::POST,
            "/api/inventory",
            None,
            Some(json!({ "barcode": "TEA", "quantity": 5 })),
        )
        .await;

        let body = create(&app, "u1", "TEA", 150).await;
        assert_eq!(body["data"]["bill"]["totalCents"], 300);
        assert_eq!(body["data"]["bill"]["changeCents"], 700);
        assert_eq!(body["data"]["bill"]["paymentStatus"], "completed");
        assert_eq!(body["data"]["stock"]["deducted"][0]["remaining"], 3);
        create(&app, "u1", "TEA", 100).await;

        let (_, body) = send(&app, Method::GET, "/api/bills?limit=1", Some("u1"), None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["pagination"]["pages"], 2);
        assert_eq!(body["data"][0]["totalCents"], 200);

        let (_, body) = send(&app, Method::GET, "/api/bills/stats", Some("u1"), None).await;
        assert_eq!(body["data"]["totalBills"], 2);
        assert_eq!(body["data"]["averageBillCents"], 250);

        let (_, body) = send(
            &app,
            Method::GET,
            "/api/bills/payment-methods?period=all_time",
            Some("u1"),
            None,
        )
        .await;
        assert_eq!(body["data"]["cash"]["count"], 2);

        let (_, body) = send(&app, Method::GET, "/api/bills/popular-products", Some("u1"), None).await;
        assert_eq!(body["data"][0]["salesCount"], 2);

        let (_, body) = send(&app, Method::GET, "/api/bills/export", Some("u1"), None).await;
        assert_eq!(body["count"], 2);

        let (status, _) = send(&app, Method::GET, "/api/bills/stats?period=weekly", Some("u1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bill_lifecycle() {
        let app = app();
        let body = create(&app, "u1", "X", 100).await;
        let id = body["data"]["bill"]["id"].as_str().unwrap().to_string();
        let number = body["data"]["bill"]["billNumber"].as_str().unwrap().to_string();

        let (_, body) = send(&app, Method::GET, &format!("/api/bills/number/{number}"), None, None).await;
        assert_eq!(body["data"]["id"], id.as_str());

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/api/bills/{id}"),
            None,
            Some(json!({ "notes": "paid in coins" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["notes"], "paid in coins");

        let (status, _) = send(&app, Method::POST, &format!("/api/bills/{id}/void"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::POST, &format!("/api/bills/{id}/void"), None, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, _) = send(&app, Method::DELETE, &format!("/api/bills/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, &format!("/api/bills/{id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_bill_validation() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/bills",
            Some("u1"),
            Some(json!({ "items": [], "paymentMethod": "cash" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "items is required");
    }

    #[test]
    fn test_export_window_defaults() {
        let now = Utc::now();
        assert!(ExportParams::default().window(now).is_none());

        let to = now - Duration::days(1);
        let window = ExportParams {
            from: None,
            to: Some(to),
        }
        .window(now)
        .unwrap();
        assert_eq!(window.to - window.from, Duration::days(30));
    }
}
