//! Product reviews.

use chrono::{DateTime, Utc};
use serde::Serialize;

use sole_core::{Email, ProductId, ReviewId};

/// A stored review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_name: String,
    #[serde(skip_serializing)]
    pub user_email: Email,
    pub rating: u8,
    pub comment: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// A review to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub product_id: ProductId,
    pub user_name: String,
    pub user_email: Email,
    pub rating: u8,
    pub comment: String,
}

impl NewReview {
    /// Attach a store-assigned id and timestamp.
    #[must_use]
    pub fn into_review(self, id: ReviewId, created_at: DateTime<Utc>) -> Review {
        Review {
            id,
            product_id: self.product_id,
            user_name: self.user_name,
            user_email: self.user_email,
            rating: self.rating,
            comment: self.comment,
            created_at,
        }
    }
}
