//! Storage for the storefront.
//!
//! Every collaborator the checkout flow talks to sits behind an object-safe
//! trait so handlers and services hold `Arc<dyn Trait>`:
//!
//! - [`CatalogStore`] - products
//! - [`IdentityStore`] - user accounts and checkout profile fields
//! - [`StockLedger`] - shared per-(product, size) stock counters
//! - [`OrderLedger`] - recorded orders, keyed by payment intent
//! - [`ReviewStore`] - product reviews
//!
//! Each has a `PostgreSQL` implementation in this module tree and an
//! in-memory one in [`memory`].
//!
//! # Database: `sole_storefront`
//!
//! ## Tables (schema `storefront`)
//!
//! - `product` - Catalog
//! - `user` - Accounts (credential hash lives in `user_password`)
//! - `stock` - Remaining units per product and size
//! - `order` - Orders, unique by `order_number` and by `payment_intent_id`
//! - `review` - Product reviews
//! - `tower_sessions.session` - Session storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p sole-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod seed;
pub mod stock;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use sole_core::{Email, ProductId, ShoeSize, UserId};

use crate::models::user::ProfileUpdate;
use crate::models::{NewOrder, NewProduct, NewReview, Order, Product, Review, User};

pub use memory::{MemoryCatalog, MemoryIdentity, MemoryOrderLedger, MemoryReviews, MemoryStock};
pub use orders::PgOrderLedger;
pub use products::PgCatalogStore;
pub use reviews::PgReviewStore;
pub use stock::PgStockLedger;
pub use users::PgIdentityStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Map a unique-constraint violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Result of a conditional order insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// This call recorded the order.
    Inserted(Order),
    /// An order for the same payment intent was already recorded.
    Existing(Order),
}

impl InsertOutcome {
    /// The recorded order, whichever call created it.
    #[must_use]
    pub fn into_order(self) -> Order {
        match self {
            Self::Inserted(order) | Self::Existing(order) => order,
        }
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All products, by id.
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    /// A single product.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Insert `products` only if the catalog is empty. Returns how many were inserted.
    async fn seed_if_empty(&self, products: &[NewProduct]) -> Result<usize, RepositoryError>;
}

/// User accounts.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an account by email.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Create an account. Fails with `Conflict` if the email is taken.
    async fn create_user(
        &self,
        email: &Email,
        credential_hash: &str,
        name: Option<&str>,
    ) -> Result<UserId, RepositoryError>;

    /// Overwrite the checkout profile fields.
    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError>;

    /// Write only the fields that are `Some`, leaving the rest untouched.
    async fn patch_profile(
        &self,
        user_id: UserId,
        patch: &ProfileUpdate,
    ) -> Result<(), RepositoryError>;

    /// Mark the email verified. `email` must match the account's own address;
    /// a mismatch is `NotFound`.
    async fn verify_email(&self, user_id: UserId, email: &Email) -> Result<(), RepositoryError>;

    /// Credential-free projection of an account.
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Account plus stored credential hash, for login only.
    async fn credential_for_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError>;
}

/// Shared stock counters.
///
/// Unseen keys start at the ledger's default. Counters never go negative.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Units left for `(product_id, size)`.
    async fn remaining(
        &self,
        product_id: ProductId,
        size: ShoeSize,
    ) -> Result<u32, RepositoryError>;

    /// Atomically take `quantity` units. Returns `false` without changing
    /// anything when fewer than `quantity` remain.
    async fn try_reserve(
        &self,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<bool, RepositoryError>;

    /// Give `quantity` units back.
    async fn release(
        &self,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<(), RepositoryError>;
}

/// Durable record of completed sales.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Record an order unconditionally. A clashing order number is `Conflict`.
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Record an order unless one already exists for its payment intent.
    ///
    /// This is a single conditional write, not a read followed by a write.
    /// Orders without a payment intent are always inserted.
    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError>;

    /// The order for a payment intent.
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first.
    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;
}

/// Product reviews.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Reviews for a product, newest first.
    async fn list_by_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError>;

    /// Store a review.
    async fn add(&self, review: &NewReview) -> Result<Review, RepositoryError>;

    /// Insert `reviews` only if there are none yet. Returns how many were inserted.
    async fn seed_if_empty(&self, reviews: &[NewReview]) -> Result<usize, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
