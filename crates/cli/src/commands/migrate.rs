//! Database migration commands.
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded at
//! compile time. They create the `storefront` schema (products, users,
//! stock, orders, reviews) and the `tower_sessions` session table.

use sole_storefront::db;
use tracing::info;

use super::{CommandError, database_url};

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the database is
/// unreachable, or a migration fails.
pub async fn storefront() -> Result<(), CommandError> {
    let database_url = database_url()?;

    info!("Connecting to storefront database...");
    let pool = db::create_pool(&database_url).await?;

    info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    info!("Storefront migrations complete");
    Ok(())
}
