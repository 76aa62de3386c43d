use axum::Router;

pub mod movements;
pub mod products;
pub mod reorder;
pub mod system;

/// Router for all inventory endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/stock-movements", movements::router())
        .nest("/reorder", reorder::router())
}
