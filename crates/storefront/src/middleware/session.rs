//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions, and the
//! load/save helpers for the checkout context stored in them.

use sqlx::PgPool;
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;
use crate::models::{CheckoutContext, session_keys};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "sole_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// The sessions table is created by the storefront migrations.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> SessionManagerLayer<PostgresStore> {
    session_layer(PostgresStore::new(pool.clone()), config)
}

/// Session layer over any store, with the storefront's cookie settings.
#[must_use]
pub fn session_layer<S: SessionStore + Clone>(
    store: S,
    config: &StorefrontConfig,
) -> SessionManagerLayer<S> {
    // Determine if we're in production (HTTPS)
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// The shopper's cart and checkout state, or an empty one.
///
/// # Errors
///
/// Returns an error if the session store cannot be read.
pub async fn load_checkout(
    session: &Session,
) -> Result<CheckoutContext, tower_sessions::session::Error> {
    Ok(session
        .get::<CheckoutContext>(session_keys::CHECKOUT)
        .await?
        .unwrap_or_default())
}

/// Write the checkout context back to the session and persist it now.
///
/// The session layer skips saving on 5xx responses, and a checkout left in
/// `settling` must survive exactly those.
///
/// # Errors
///
/// Returns an error if the session cannot be modified or stored.
pub async fn save_checkout(
    session: &Session,
    ctx: &CheckoutContext,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CHECKOUT, ctx).await?;
    session.save().await
}
