use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use kade_core::DomainError;
use kade_infra::{MutationError, NotifyError, ReorderError, StoreError};

const STORAGE_UNAVAILABLE: &str = "storage is temporarily unavailable";
const NOTIFICATION_FAILED: &str = "notification could not be delivered";

pub fn mutation_error_to_response(err: MutationError) -> axum::response::Response {
    match err {
        MutationError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        MutationError::ProductNotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("product {id} not found"))
        }
        err @ MutationError::InsufficientStock { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_stock", err.to_string())
        }
        MutationError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        MutationError::StorageFailure(msg) => {
            // Raw storage text stays in the logs.
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_failure", STORAGE_UNAVAILABLE)
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    mutation_error_to_response(MutationError::from(err))
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        other => json_error(StatusCode::BAD_REQUEST, "validation_error", other.to_string()),
    }
}

pub fn reorder_error_to_response(err: ReorderError) -> axum::response::Response {
    match err {
        ReorderError::Batch(e) => domain_error_to_response(e),
        ReorderError::Detection(e) => store_error_to_response(e),
    }
}

pub fn notify_error_to_response(err: NotifyError) -> axum::response::Response {
    match err {
        NotifyError::InvalidDestination(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        NotifyError::Empty => json_error(StatusCode::BAD_REQUEST, "validation_error", "nothing to notify"),
        NotifyError::Delivery(msg) => {
            tracing::warn!(error = %msg, "notification delivery failed");
            json_error(StatusCode::BAD_GATEWAY, "notification_failed", NOTIFICATION_FAILED)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
