use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use kade_core::ProductId;
use kade_infra::MovementOrder;
use kade_inventory::{Direction, NewProduct, Price, Product, ProductPatch, ReorderBatch, ReorderNotice};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// `price` is in the smallest currency unit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub product_id: i64,
    pub name: String,
    pub price: u64,
    pub stock: i64,
    pub reorder_level: Option<i64>,
    pub category: String,
}

impl CreateProductRequest {
    pub fn into_new_product(self) -> Result<NewProduct, axum::response::Response> {
        Ok(NewProduct {
            product_id: ProductId::new(self.product_id),
            name: self.name,
            price: parse_price(self.price)?,
            stock: self.stock,
            reorder_level: self.reorder_level,
            category: self.category,
        })
    }
}

/// Partial update. Unknown fields (including `stock`) are rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub reorder_level: Option<i64>,
    pub category: Option<String>,
}

impl UpdateProductRequest {
    pub fn into_patch(self) -> Result<ProductPatch, axum::response::Response> {
        Ok(ProductPatch {
            name: self.name,
            price: self.price.map(parse_price).transpose()?,
            reorder_level: self.reorder_level,
            category: self.category,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderLevelRequest {
    pub reorder_level: i64,
}

/// `type` is parsed by hand so an unknown kind gets a validation message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovementRequest {
    pub product_id: i64,
    #[serde(rename = "type")]
    pub movement_type: String,
    pub quantity: i64,
    #[serde(default)]
    pub direction: Option<Direction>,
}

#[derive(Debug, Deserialize)]
pub struct ListMovementsQuery {
    pub order: Option<String>,
}

impl ListMovementsQuery {
    pub fn movement_order(&self) -> Result<MovementOrder, axum::response::Response> {
        match self.order.as_deref().map(str::trim) {
            None | Some("") | Some("desc") => Ok(MovementOrder::NewestFirst),
            Some("asc") => Ok(MovementOrder::OldestFirst),
            Some(other) => Err(errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                format!("order must be asc or desc, got '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderLineRequest {
    pub product_id: i64,
    pub reorder_quantity: i64,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReorderRequest {
    pub reorder_list: Option<Vec<ReorderLineRequest>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyItemRequest {
    #[serde(alias = "name")]
    pub product_name: String,
    pub reorder_quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(alias = "email")]
    pub destination: Option<String>,
    pub reorder_items: Option<Vec<NotifyItemRequest>>,
}

impl NotifyRequest {
    pub fn notices(&self) -> Option<Vec<ReorderNotice>> {
        self.reorder_items.as_ref().map(|items| {
            items
                .iter()
                .map(|i| ReorderNotice {
                    product_name: i.product_name.clone(),
                    reorder_quantity: i.reorder_quantity,
                })
                .collect()
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReorderRequest {
    #[serde(alias = "email")]
    pub destination: Option<String>,
}

// -------------------------
// Body parsing
// -------------------------

/// Map a JSON extractor rejection onto the standard 400 body.
pub fn parse_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(v)| v)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()))
}

/// Parse an optional JSON body; an empty body yields `T::default()`.
pub fn parse_optional_json<T>(body: &Bytes) -> Result<T, axum::response::Response>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "validation_error", format!("invalid JSON body: {e}"))
    })
}

pub fn parse_product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

fn parse_price(cents: u64) -> Result<Price, axum::response::Response> {
    Price::new(cents).map_err(errors::domain_error_to_response)
}

// -------------------------
// Response mapping
// -------------------------

pub fn product_to_json(p: &Product) -> serde_json::Value {
    serde_json::json!({
        "productId": p.id_typed(),
        "name": p.name(),
        "price": p.price().cents(),
        "stock": p.stock(),
        "reorderLevel": p.reorder_level(),
        "category": p.category(),
        "version": kade_core::AggregateRoot::version(p),
    })
}

/// Low-stock listing entry: the product plus what it would take to refill it.
pub fn low_stock_to_json(p: &Product) -> serde_json::Value {
    let mut value = product_to_json(p);
    value["reorderQuantity"] = serde_json::json!(p.reorder_quantity());
    value
}

pub fn batch_to_json(batch: &ReorderBatch) -> serde_json::Value {
    serde_json::json!({
        "batchId": batch.batch_id().to_string(),
        "createdAt": batch.created_at().to_rfc3339(),
        "state": batch.state(),
        "lines": batch.lines(),
    })
}
