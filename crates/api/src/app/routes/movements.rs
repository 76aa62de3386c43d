use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use kade_core::ProductId;
use kade_infra::{MovementRequest, StockLedger};
use kade_inventory::{Direction, MovementType};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/", get(list_movements).post(record_movement))
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::parse_json(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let movement_type: MovementType = match body.movement_type.parse() {
        Ok(t) => t,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let request = MovementRequest {
        product_id: ProductId::new(body.product_id),
        movement_type,
        quantity: body.quantity,
        direction: body.direction.unwrap_or(match movement_type {
            MovementType::Sale => Direction::Decrease,
            _ => Direction::Increase,
        }),
    };

    match services.engine.apply_movement(request).await {
        Ok(applied) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "product": dto::product_to_json(&applied.product),
                "movement": applied.movement,
            })),
        )
            .into_response(),
        Err(e) => errors::mutation_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListMovementsQuery>,
) -> axum::response::Response {
    let order = match query.movement_order() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.store.list_movements(order).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
