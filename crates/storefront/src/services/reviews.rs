//! Product reviews.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use sole_core::ProductId;

use super::catalog::CatalogService;
use crate::db::{RepositoryError, ReviewStore};
use crate::models::{NewReview, Review, User};

const MAX_COMMENT_LENGTH: usize = 2000;

/// Errors that can occur when reading or writing reviews.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// No such product.
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    /// Rating outside 1..=5.
    #[error("rating must be between 1 and 5")]
    InvalidRating,

    /// Empty or oversized comment.
    #[error("comment must be between 1 and {MAX_COMMENT_LENGTH} characters")]
    InvalidComment,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Review operations.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    catalog: CatalogService,
}

impl ReviewService {
    /// Create a review service.
    #[must_use]
    pub fn new(store: Arc<dyn ReviewStore>, catalog: CatalogService) -> Self {
        Self { store, catalog }
    }

    /// Reviews for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::UnknownProduct` if the product does not exist.
    pub async fn list(&self, product_id: ProductId) -> Result<Vec<Review>, ReviewError> {
        self.ensure_product(product_id).await?;
        Ok(self.store.list_by_product(product_id).await?)
    }

    /// Post a review as `author`.
    ///
    /// # Errors
    ///
    /// Returns `ReviewError::InvalidRating` or `ReviewError::InvalidComment`
    /// for bad input, `ReviewError::UnknownProduct` for a missing product.
    #[instrument(skip(self, author, comment), fields(user_id = %author.id))]
    pub async fn add(
        &self,
        product_id: ProductId,
        author: &User,
        rating: u8,
        comment: &str,
    ) -> Result<Review, ReviewError> {
        if !(1..=5).contains(&rating) {
            return Err(ReviewError::InvalidRating);
        }
        let comment = comment.trim();
        if comment.is_empty() || comment.chars().count() > MAX_COMMENT_LENGTH {
            return Err(ReviewError::InvalidComment);
        }
        self.ensure_product(product_id).await?;

        let review = self
            .store
            .add(&NewReview {
                product_id,
                user_name: display_name(author),
                user_email: author.email.clone(),
                rating,
                comment: comment.to_owned(),
            })
            .await?;

        tracing::info!(review_id = %review.id, "Review added");
        Ok(review)
    }

    /// Seed reviews if there are none yet.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn seed_if_empty(&self, reviews: &[NewReview]) -> Result<usize, RepositoryError> {
        self.store.seed_if_empty(reviews).await
    }

    async fn ensure_product(&self, product_id: ProductId) -> Result<(), ReviewError> {
        self.catalog
            .get(product_id)
            .await?
            .map(|_| ())
            .ok_or(ReviewError::UnknownProduct(product_id))
    }
}

/// Name shown on a review: "First L.", the display name, or the email's local part.
fn display_name(user: &User) -> String {
    let first = user.first_name.as_deref().map(str::trim).unwrap_or_default();
    let last_initial = user
        .last_name
        .as_deref()
        .and_then(|l| l.trim().chars().next());

    match (first.is_empty(), last_initial) {
        (false, Some(initial)) => format!("{first} {initial}."),
        (false, None) => first.to_owned(),
        (true, _) => user
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(
                || {
                    user.email
                        .as_str()
                        .split('@')
                        .next()
                        .unwrap_or_default()
                        .to_owned()
                },
                ToOwned::to_owned,
            ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use sole_core::{Email, UserId};

    use super::*;
    use crate::db::{CatalogStore, MemoryCatalog, MemoryReviews, seed};

    fn user(first: Option<&str>, last: Option<&str>, name: Option<&str>) -> User {
        User {
            id: UserId::new(1),
            email: Email::parse("kate@example.com").unwrap(),
            name: name.map(ToOwned::to_owned),
            first_name: first.map(ToOwned::to_owned),
            last_name: last.map(ToOwned::to_owned),
            dob: None,
            age: None,
            email_verified: false,
            created_at: Utc::now(),
        }
    }

    async fn service() -> ReviewService {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.seed_if_empty(&seed::catalog()).await.unwrap();
        ReviewService::new(Arc::new(MemoryReviews::new()), CatalogService::new(catalog))
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&user(Some("Kate"), Some("Hill"), None)), "Kate H.");
        assert_eq!(display_name(&user(None, None, Some("Kate Hill"))), "Kate Hill");
        assert_eq!(display_name(&user(None, None, None)), "kate");
    }

    #[tokio::test]
    async fn test_add_and_list_newest_first() {
        let reviews = service().await;
        let author = user(Some("Kate"), Some("Hill"), None);

        reviews
            .add(ProductId::new(3), &author, 5, "Love them")
            .await
            .unwrap();
        reviews
            .add(ProductId::new(3), &author, 4, "Still good a month in")
            .await
            .unwrap();

        let listed = reviews.list(ProductId::new(3)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].comment, "Still good a month in");
        assert_eq!(listed[0].user_name, "Kate H.");
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let reviews = service().await;
        let author = user(None, None, None);

        assert!(matches!(
            reviews.add(ProductId::new(1), &author, 6, "ok").await,
            Err(ReviewError::InvalidRating)
        ));
        assert!(matches!(
            reviews.add(ProductId::new(1), &author, 3, "   ").await,
            Err(ReviewError::InvalidComment)
        ));
        assert!(matches!(
            reviews.add(ProductId::new(42), &author, 3, "ok").await,
            Err(ReviewError::UnknownProduct(_))
        ));
    }
}
