//! Seed the catalog and its mock reviews.
//!
//! Seeding only writes into empty tables, so it is safe to run repeatedly.

use sole_storefront::db::{self, CatalogStore, PgCatalogStore, PgReviewStore, ReviewStore, seed};
use tracing::info;

use super::{CommandError, database_url};

/// Seed products and reviews.
///
/// # Errors
///
/// Returns an error if the database URL is missing or the inserts fail.
pub async fn catalog() -> Result<(), CommandError> {
    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let products = PgCatalogStore::new(pool.clone())
        .seed_if_empty(&seed::catalog())
        .await?;
    if products == 0 {
        info!("Catalog already populated, skipping products");
    } else {
        info!(products, "Seeded products");
    }

    let reviews = PgReviewStore::new(pool)
        .seed_if_empty(&seed::reviews())
        .await?;
    if reviews == 0 {
        info!("Reviews already present, skipping");
    } else {
        info!(reviews, "Seeded reviews");
    }

    Ok(())
}
