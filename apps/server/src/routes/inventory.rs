//! Inventory endpoints.
//!
//! | Method | Path                               | Engine call            |
//! |--------|------------------------------------|------------------------|
//! | GET    | /api/inventory                     | get_inventory_list     |
//! | POST   | /api/inventory                     | find_or_create         |
//! | POST   | /api/inventory/deduct              | deduct_for_bill        |
//! | GET    | /api/inventory/barcode/{barcode}   | get_by_barcode         |
//! | GET    | /api/inventory/{id}                | get                    |
//! | PATCH  | /api/inventory/{id}/adjust         | adjust_quantity        |

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use tally_core::{Inventory, StockLine};
use tally_engine::{DeductionReport, InventoryFilter, StockRegistration};

use super::Envelope;
use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/inventory", get(list_inventory).post(register_stock))
        .route("/api/inventory/deduct", post(deduct_for_bill))
        .route("/api/inventory/barcode/{barcode}", get(get_by_barcode))
        .route("/api/inventory/{id}", get(get_inventory))
        .route("/api/inventory/{id}/adjust", patch(adjust_quantity))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    #[serde(default)]
    pub items: Vec<StockLine>,
}

async fn list_inventory(
    State(state): State<AppState>,
    filter: Result<Query<InventoryFilter>, QueryRejection>,
) -> ApiResult<Envelope<Vec<Inventory>>> {
    let Query(filter) = filter?;
    let list = state.ledger.get_inventory_list(&filter).await?;
    let count = list.len();
    Ok(Envelope::ok(list).with_count(count))
}

async fn register_stock(
    State(state): State<AppState>,
    body: Result<Json<StockRegistration>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(registration) = body?;
    let inventory = state.ledger.find_or_create(registration).await?;
    Ok((StatusCode::CREATED, Envelope::ok(inventory)))
}

async fn deduct_for_bill(
    State(state): State<AppState>,
    body: Result<Json<DeductRequest>, JsonRejection>,
) -> ApiResult<Envelope<DeductionReport>> {
    let Json(request) = body?;
    let report = state.ledger.deduct_for_bill(&request.items).await?;
    Ok(Envelope::ok(report))
}

async fn get_by_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> ApiResult<Envelope<Inventory>> {
    Ok(Envelope::ok(state.ledger.get_by_barcode(&barcode).await?))
}

async fn get_inventory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Inventory>> {
    Ok(Envelope::ok(state.ledger.get(&id).await?))
}

async fn adjust_quantity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AdjustRequest>, JsonRejection>,
) -> ApiResult<Envelope<Inventory>> {
    let Json(request) = body?;
    Ok(Envelope::ok(
        state.ledger.adjust_quantity(&id, request.delta).await?,
    ))
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::{app, send};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_register_adjust_and_list() {
        let app = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/inventory",
            None,
            Some(json!({ "barcode": "890", "quantity": 12, "minStock": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["status"], "in_stock");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/api/inventory/{id}/adjust"),
            None,
            Some(json!({ "delta": -3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["quantity"], 9);
        assert_eq!(body["data"]["status"], "low_stock");

        let (_, body) = send(&app, Method::GET, "/api/inventory/barcode/890", None, None).await;
        assert_eq!(body["data"]["id"], id.as_str());

        let (_, body) = send(&app, Method::GET, "/api/inventory?status=low_stock", None, None).await;
        assert_eq!(body["count"], 1);

        let (_, body) = send(&app, Method::GET, "/api/inventory?status=in_stock", None, None).await;
        assert_eq!(body["count"], 0);

        let (_, body) = send(&app, Method::GET, "/api/inventory?location=", None, None).await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn test_deduct_reports_item_errors() {
        let app = app();
        send(
            &app,
            Method::POST,
            "/api/inventory",
            None,
            Some(json!({ "barcode": "A", "quantity": 2 })),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/inventory/deduct",
            None,
            Some(json!({ "items": [
                { "barcode": "A", "quantity": 1, "name": "Tea" },
                { "barcode": "A", "quantity": 5, "name": "Tea" }
            ] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["deducted"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["errors"][0]["name"], "Tea");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/inventory/deduct",
            None,
            Some(json!({ "items": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_errors_use_envelope() {
        let app = app();

        let (status, body) = send(&app, Method::GET, "/api/inventory/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Inventory not found: nope");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/inventory",
            None,
            Some(json!({ "quantity": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = send(
            &app,
            Method::PATCH,
            "/api/inventory/x/adjust",
            None,
            Some(json!({ "delta": "lots" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
