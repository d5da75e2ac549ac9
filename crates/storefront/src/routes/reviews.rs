//! Review route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;

use sole_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Review;
use crate::state::AppState;

/// New review body.
#[derive(Debug, Deserialize)]
pub struct ReviewInput {
    pub rating: u8,
    pub comment: String,
}

/// Reviews for a product, newest first.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> Result<Json<Vec<Review>>> {
    Ok(Json(state.reviews().list(product_id).await?))
}

/// Post a review as the logged-in user.
#[instrument(skip(state, current, input), fields(user_id = %current.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(product_id): Path<ProductId>,
    Json(input): Json<ReviewInput>,
) -> Result<(StatusCode, Json<Review>)> {
    let author = state.auth().get_user(current.id).await?;
    let review = state
        .reviews()
        .add(product_id, &author, input.rating, &input.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}
