//! Authentication route handlers.
//!
//! Registration and login both start a session and return the account's
//! credential-free profile.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::state::AppState;

/// Login body.
#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Registration body.
#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Create an account and log it in.
#[instrument(skip(state, session, input))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state
        .auth()
        .register(&input.email, &input.password, input.name.as_deref())
        .await?;

    start_session(&session, &user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Log in with email and password.
#[instrument(skip(state, session, input))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(input): Json<LoginInput>,
) -> Result<Json<User>> {
    let user = state.auth().login(&input.email, &input.password).await?;

    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(user))
}

/// Log out, dropping the whole session including the cart.
#[instrument(skip(session, current))]
pub async fn logout(session: Session, OptionalAuth(current): OptionalAuth) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    if let Some(user) = current {
        tracing::info!(user_id = %user.id, "User logged out");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(
        session,
        &CurrentUser {
            id: user.id,
            email: user.email.clone(),
        },
    )
    .await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}
