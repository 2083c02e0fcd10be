//! Route handlers.

use axum::extract::Path;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::http::error::AppError;

/// Highest item id served by `/items/{item_id}`.
pub const MAX_ITEM_ID: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

impl Item {
    fn with_random_price(id: i64) -> Self {
        let cents = fastrand::u32(100..=10_000);
        Self {
            id,
            name: format!("Item {}", id),
            price: f64::from(cents) / 100.0,
        }
    }
}

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_items() -> Json<Vec<Item>> {
    Json((1..=5).map(Item::with_random_price).collect())
}

pub async fn get_item(Path(item_id): Path<i64>) -> Result<Json<Item>, AppError> {
    if !(1..=MAX_ITEM_ID).contains(&item_id) {
        return Err(AppError::NotFound(format!("Item {} not found", item_id)));
    }
    tracing::debug!(item_id, "Item fetched");
    Ok(Json(Item::with_random_price(item_id)))
}

/// Always fails, for exercising error logging and trace correlation.
pub async fn crash() -> Result<Json<Value>, AppError> {
    tracing::error!("Crash endpoint called, raising intentional error");
    Err(AppError::Internal(
        "Intentional crash triggered by GET /crash".to_string(),
    ))
}
