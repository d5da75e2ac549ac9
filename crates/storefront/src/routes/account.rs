//! Account route handlers.
//!
//! These routes require authentication.

use axum::{Json, extract::State};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use sole_core::profile::ProfileDetails;

use crate::error::Result;
use crate::middleware::{RequireAuth, load_checkout, save_checkout};
use crate::models::{Order, User};
use crate::state::AppState;

/// Email ownership proof.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailInput {
    pub email: String,
}

/// The account's profile.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<User>> {
    Ok(Json(state.auth().get_user(current.id).await?))
}

/// Write through whichever profile fields are present.
///
/// Goes through checkout so a waiting checkout sees the new profile.
#[instrument(skip(state, session, current, input), fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Json(input): Json<ProfileDetails>,
) -> Result<Json<User>> {
    let mut ctx = load_checkout(&session).await?;
    state
        .checkout()
        .submit_profile(current.id, &mut ctx, &input)
        .await?;
    save_checkout(&session, &ctx).await?;

    Ok(Json(state.auth().get_user(current.id).await?))
}

/// Mark the email verified, given the account's own address.
#[instrument(skip(state, current, input), fields(user_id = %current.id))]
pub async fn verify_email(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(input): Json<VerifyEmailInput>,
) -> Result<Json<User>> {
    Ok(Json(
        state.auth().verify_email(current.id, &input.email).await?,
    ))
}

/// Order history, newest first.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().list_by_user(current.id).await?))
}
