//! Order lookup for the success page.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::state::AppState;

/// The order recorded for a payment intent. Only its owner can see it.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn by_intent(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(payment_intent_id): Path<String>,
) -> Result<Json<Order>> {
    state
        .orders()
        .find_by_payment_intent(&payment_intent_id)
        .await?
        .filter(|order| order.user_id == current.id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("order".to_string()))
}
