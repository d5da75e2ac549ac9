//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use sole_core::{ProductId, ShoeSize};

use crate::error::{AppError, Result};
use crate::models::Product;
use crate::state::AppState;

/// Query parameters for the stock lookup.
#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub size: ShoeSize,
}

/// Units left for one product and size.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub product_id: ProductId,
    pub size: ShoeSize,
    pub remaining: u32,
}

/// List the catalog.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = state.catalog().list().await?;
    Ok(Json(products.to_vec()))
}

/// Product detail.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    state
        .catalog()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}

/// Remaining stock for a size.
#[instrument(skip(state))]
pub async fn stock(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(query): Query<StockQuery>,
) -> Result<Json<StockLevel>> {
    let product = state
        .catalog()
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
    if !product.offers_size(query.size) {
        return Err(AppError::NotFound(format!(
            "product {id} in size {}",
            query.size
        )));
    }

    let remaining = state.carts().remaining(id, query.size).await?;
    Ok(Json(StockLevel {
        product_id: id,
        size: query.size,
        remaining,
    }))
}
