//! Cart route handlers.
//!
//! The cart lives in the session as part of the checkout context. Every
//! change is reserved against the shared stock ledger first.

use axum::{Json, extract::State};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use sole_core::{ProductId, ShoeSize};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{load_checkout, save_checkout};
use crate::services::cart::CartView;
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_id: ProductId,
    pub size: ShoeSize,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// Identifies a cart line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub product_id: ProductId,
    pub size: ShoeSize,
}

/// Cart contents with subtotal, tax and total.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let ctx = load_checkout(&session).await?;
    Ok(Json(state.carts().view(&ctx)))
}

/// Reserve stock and add a line. Out of stock is a 409.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<AddToCart>,
) -> Result<Json<CartView>> {
    let mut ctx = load_checkout(&session).await?;
    let view = state
        .carts()
        .add(&mut ctx, input.product_id, input.size, input.quantity)
        .await?;
    save_checkout(&session, &ctx).await?;

    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[
            ("product_id", &input.product_id.to_string()),
            ("size", &input.size.to_string()),
        ]),
    );
    Ok(Json(view))
}

/// Remove a line and release its stock.
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<LineKey>,
) -> Result<Json<CartView>> {
    let mut ctx = load_checkout(&session).await?;
    let view = state
        .carts()
        .remove(&mut ctx, input.product_id, input.size)
        .await?;
    save_checkout(&session, &ctx).await?;
    Ok(Json(view))
}

/// Empty the cart, releasing every line.
#[instrument(skip(state, session))]
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let mut ctx = load_checkout(&session).await?;
    // A partial clear has already released some lines; keep the session in step.
    let view = state.carts().clear(&mut ctx).await;
    save_checkout(&session, &ctx).await?;
    Ok(Json(view?))
}
