//! Review repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use sole_core::{Email, ProductId, ReviewId};

use super::{RepositoryError, ReviewStore};
use crate::models::{NewReview, Review};

#[derive(Debug, FromRow)]
struct ReviewRow {
    id: i32,
    product_id: i32,
    user_name: String,
    user_email: String,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let user_email = Email::parse(&row.user_email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let rating = u8::try_from(row.rating)
            .map_err(|_| RepositoryError::DataCorruption(format!("invalid rating {}", row.rating)))?;

        Ok(Self {
            id: ReviewId::new(row.id),
            product_id: ProductId::new(row.product_id),
            user_name: row.user_name,
            user_email,
            rating,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

/// `PostgreSQL`-backed [`ReviewStore`].
#[derive(Debug, Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    /// Create a new review store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn list_by_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        let rows: Vec<ReviewRow> = sqlx::query_as(
            r"
            SELECT id, product_id, user_name, user_email, rating, comment, created_at
            FROM storefront.review
            WHERE product_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Review::try_from).collect()
    }

    async fn add(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let row: ReviewRow = sqlx::query_as(
            r"
            INSERT INTO storefront.review (product_id, user_name, user_email, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, product_id, user_name, user_email, rating, comment, created_at
            ",
        )
        .bind(review.product_id)
        .bind(&review.user_name)
        .bind(review.user_email.as_str())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .fetch_one(&self.pool)
        .await?;

        Review::try_from(row)
    }

    async fn seed_if_empty(&self, reviews: &[NewReview]) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("LOCK TABLE storefront.review IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let populated: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM storefront.review)")
            .fetch_one(&mut *tx)
            .await?;
        if populated {
            return Ok(0);
        }

        for review in reviews {
            sqlx::query(
                r"
                INSERT INTO storefront.review (product_id, user_name, user_email, rating, comment)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(review.product_id)
            .bind(&review.user_name)
            .bind(review.user_email.as_str())
            .bind(i16::from(review.rating))
            .bind(&review.comment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = reviews.len(), "Seeded reviews");
        Ok(reviews.len())
    }
}
