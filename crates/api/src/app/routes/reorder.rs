use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use kade_core::ProductId;
use kade_infra::{CatalogStore, ReorderNotifier};
use kade_inventory::ReorderLine;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/batch", get(preview_batch))
        .route("/process", post(process_reorder))
        .route("/run", post(run_reorder))
        .route("/notify", post(notify_suppliers))
}

/// Collect a batch from the current low-stock set without restocking.
pub async fn preview_batch(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.orchestrator.build_reorder_batch().await {
        Ok(batch) => (StatusCode::OK, Json(dto::batch_to_json(&batch))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Process the caller's `reorderList`, or a freshly collected batch when the
/// body carries none.
pub async fn process_reorder(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let request: dto::ProcessReorderRequest = match dto::parse_optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = match request.reorder_list {
        Some(list) => {
            let mut lines = Vec::with_capacity(list.len());
            for item in list {
                let product_id = ProductId::new(item.product_id);
                let name = match item.name {
                    Some(name) => name,
                    None => display_name(&services, product_id).await,
                };
                lines.push(ReorderLine {
                    product_id,
                    name,
                    reorder_quantity: item.reorder_quantity,
                });
            }
            services.orchestrator.process_lines(lines).await
        }
        None => services.orchestrator.build_and_process().await,
    };

    match result {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::reorder_error_to_response(e),
    }
}

/// Build, process, then notify. A failed notification is reported in the body.
pub async fn run_reorder(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let request: dto::RunReorderRequest = match dto::parse_optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let destination = request
        .destination
        .unwrap_or_else(|| services.reorder_contact.clone());

    match services.orchestrator.run(&destination).await {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(e) => errors::reorder_error_to_response(e),
    }
}

/// Send reorder notices: the caller's `reorderItems`, or the current batch.
pub async fn notify_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let request: dto::NotifyRequest = match dto::parse_optional_json(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let destination = request
        .destination
        .clone()
        .unwrap_or_else(|| services.reorder_contact.clone());

    let result = match request.notices() {
        Some(notices) => {
            services
                .orchestrator
                .notifier()
                .notify(&destination, &notices)
                .await
                .map(|()| notices.len())
        }
        None => {
            let batch = match services.orchestrator.build_reorder_batch().await {
                Ok(batch) => batch,
                Err(e) => return errors::store_error_to_response(e),
            };
            services
                .orchestrator
                .notify(&batch, &destination)
                .await
                .map(|()| batch.lines().len())
        }
    };

    match result {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "destination": destination,
                "notified": count,
            })),
        )
            .into_response(),
        Err(e) => errors::notify_error_to_response(e),
    }
}

async fn display_name(services: &AppServices, product_id: ProductId) -> String {
    match services.store.find(product_id).await {
        Ok(product) => product.name().to_string(),
        Err(_) => format!("product {product_id}"),
    }
}
