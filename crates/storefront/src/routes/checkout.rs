//! Checkout route handlers.
//!
//! Each handler loads the checkout context from the session, hands it to the
//! orchestrator, and writes it back whether or not the step succeeded, since
//! failed steps can still move the state (a payment that succeeded but could
//! not be recorded stays in `settling`).

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use sole_core::profile::ProfileDetails;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{RequireAuth, load_checkout, save_checkout};
use crate::models::Order;
use crate::payments::PaymentDetails;
use crate::services::checkout::CheckoutView;
use crate::state::AppState;

/// Query parameters the gateway appends when redirecting back.
#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    pub payment_intent: String,
}

/// Current checkout state.
#[instrument(skip(state, session, current), fields(user_id = %current.id))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Json<CheckoutView>> {
    let mut ctx = load_checkout(&session).await?;
    let view = state.checkout().view(current.id, &mut ctx).await;
    save_checkout(&session, &ctx).await?;
    Ok(Json(view?))
}

/// Submit profile fields and re-check the profile gate.
#[instrument(skip(state, session, current, input), fields(user_id = %current.id))]
pub async fn profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Json(input): Json<ProfileDetails>,
) -> Result<Json<CheckoutView>> {
    let mut ctx = load_checkout(&session).await?;
    let view = state
        .checkout()
        .submit_profile(current.id, &mut ctx, &input)
        .await;
    save_checkout(&session, &ctx).await?;
    Ok(Json(view?))
}

/// Create or reuse the payment intent for the cart.
#[instrument(skip(state, session, current), fields(user_id = %current.id))]
pub async fn intent(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Json<CheckoutView>> {
    let mut ctx = load_checkout(&session).await?;
    let view = state.checkout().request_intent(current.id, &mut ctx).await;
    save_checkout(&session, &ctx).await?;
    Ok(Json(view?))
}

/// Confirm the payment and record the order.
#[instrument(skip(state, session, current, details), fields(user_id = %current.id))]
pub async fn confirm(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Json(details): Json<PaymentDetails>,
) -> Result<Json<Order>> {
    let mut ctx = load_checkout(&session).await?;
    let order = state
        .checkout()
        .confirm(current.id, &mut ctx, &details)
        .await;
    save_checkout(&session, &ctx).await?;

    let order = order?;
    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_number", order.order_number.as_str())]),
    );
    Ok(Json(order))
}

/// Settle an intent the shopper paid off-site and was redirected back from.
#[instrument(skip(state, session, current), fields(user_id = %current.id))]
pub async fn complete(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Query(query): Query<CompleteQuery>,
) -> Result<Json<Order>> {
    let mut ctx = load_checkout(&session).await?;
    let order = state
        .checkout()
        .complete(current.id, &mut ctx, &query.payment_intent)
        .await;
    save_checkout(&session, &ctx).await?;
    Ok(Json(order?))
}
