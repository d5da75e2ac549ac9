//! In-memory storage.
//!
//! Same contracts as the `PostgreSQL` stores, held behind `tokio` locks.
//! Used by tests and by local runs without a database. Each write happens
//! under a single lock acquisition, so the conditional operations
//! (`try_reserve`, `insert_if_absent`) are atomic here too.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use sole_core::cart::{DEFAULT_STOCK, StockCounter};
use sole_core::{Email, OrderId, ProductId, ReviewId, ShoeSize, UserId};

use super::{
    CatalogStore, IdentityStore, InsertOutcome, OrderLedger, RepositoryError, ReviewStore,
    StockLedger,
};
use crate::models::user::ProfileUpdate;
use crate::models::{NewOrder, NewProduct, NewReview, Order, Product, Review, User};

/// Next id after `len` existing rows, starting at 1.
fn next_id(len: usize) -> Result<i32, RepositoryError> {
    i32::try_from(len + 1).map_err(|_| RepositoryError::Conflict("id space exhausted".to_owned()))
}

// =============================================================================
// Catalog
// =============================================================================

/// In-memory product catalog.
#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<Vec<Product>>,
}

impl MemoryCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.products.read().await.clone())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self
            .products
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn seed_if_empty(&self, products: &[NewProduct]) -> Result<usize, RepositoryError> {
        let mut stored = self.products.write().await;
        if !stored.is_empty() {
            return Ok(0);
        }
        for product in products {
            let id = ProductId::new(next_id(stored.len())?);
            stored.push(product.clone().with_id(id));
        }
        Ok(products.len())
    }
}

// =============================================================================
// Identity
// =============================================================================

struct StoredUser {
    user: User,
    credential_hash: String,
}

/// In-memory user accounts.
#[derive(Default)]
pub struct MemoryIdentity {
    users: RwLock<Vec<StoredUser>>,
}

impl MemoryIdentity {
    /// No accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentity {
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|s| &s.user.email == email)
            .map(|s| s.user.clone()))
    }

    async fn create_user(
        &self,
        email: &Email,
        credential_hash: &str,
        name: Option<&str>,
    ) -> Result<UserId, RepositoryError> {
        let mut users = self.users.write().await;
        if users.iter().any(|s| &s.user.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let id = UserId::new(next_id(users.len())?);
        users.push(StoredUser {
            user: User {
                id,
                email: email.clone(),
                name: name.map(ToOwned::to_owned),
                first_name: None,
                last_name: None,
                dob: None,
                age: None,
                email_verified: false,
                created_at: Utc::now(),
            },
            credential_hash: credential_hash.to_owned(),
        });
        Ok(id)
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let stored = users
            .iter_mut()
            .find(|s| s.user.id == user_id)
            .ok_or(RepositoryError::NotFound)?;

        stored.user.first_name.clone_from(&update.first_name);
        stored.user.last_name.clone_from(&update.last_name);
        stored.user.dob = update.dob;
        stored.user.age = update.age;
        Ok(())
    }

    async fn patch_profile(
        &self,
        user_id: UserId,
        patch: &ProfileUpdate,
    ) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let stored = users
            .iter_mut()
            .find(|s| s.user.id == user_id)
            .ok_or(RepositoryError::NotFound)?;

        if let Some(first) = &patch.first_name {
            stored.user.first_name = Some(first.clone());
        }
        if let Some(last) = &patch.last_name {
            stored.user.last_name = Some(last.clone());
        }
        if patch.dob.is_some() {
            stored.user.dob = patch.dob;
        }
        if patch.age.is_some() {
            stored.user.age = patch.age;
        }
        Ok(())
    }

    async fn verify_email(&self, user_id: UserId, email: &Email) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        let stored = users
            .iter_mut()
            .find(|s| s.user.id == user_id && &s.user.email == email)
            .ok_or(RepositoryError::NotFound)?;
        stored.user.email_verified = true;
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|s| s.user.id == user_id)
            .map(|s| s.user.clone()))
    }

    async fn credential_for_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|s| &s.user.email == email)
            .map(|s| (s.user.clone(), s.credential_hash.clone())))
    }
}

// =============================================================================
// Stock
// =============================================================================

/// In-memory stock counters.
pub struct MemoryStock {
    counter: Mutex<StockCounter>,
}

impl MemoryStock {
    /// Counters where unseen keys start at `default` units.
    #[must_use]
    pub fn new(default: u32) -> Self {
        Self {
            counter: Mutex::new(StockCounter::new(default)),
        }
    }

    /// Overwrite the count for one key.
    pub async fn set(&self, product_id: ProductId, size: ShoeSize, units: u32) {
        self.counter.lock().await.set((product_id, size), units);
    }
}

impl Default for MemoryStock {
    fn default() -> Self {
        Self::new(DEFAULT_STOCK)
    }
}

#[async_trait]
impl StockLedger for MemoryStock {
    async fn remaining(
        &self,
        product_id: ProductId,
        size: ShoeSize,
    ) -> Result<u32, RepositoryError> {
        Ok(self.counter.lock().await.remaining((product_id, size)))
    }

    async fn try_reserve(
        &self,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .counter
            .lock()
            .await
            .try_take((product_id, size), quantity))
    }

    async fn release(
        &self,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        self.counter
            .lock()
            .await
            .restore((product_id, size), quantity);
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

/// In-memory order ledger.
#[derive(Default)]
pub struct MemoryOrderLedger {
    orders: RwLock<Vec<Order>>,
}

impl MemoryOrderLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// True if nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    fn push(orders: &mut Vec<Order>, new: &NewOrder) -> Result<Order, RepositoryError> {
        if orders.iter().any(|o| o.order_number == new.order_number) {
            return Err(RepositoryError::Conflict("order number already exists".to_owned()));
        }
        let id = OrderId::new(next_id(orders.len())?);
        let order = new.clone().into_order(id, Utc::now());
        orders.push(order.clone());
        Ok(order)
    }
}

#[async_trait]
impl OrderLedger for MemoryOrderLedger {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        Self::push(&mut orders, order)
    }

    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        let mut orders = self.orders.write().await;
        if let Some(intent) = &order.payment_intent_id
            && let Some(existing) = orders
                .iter()
                .find(|o| o.payment_intent_id.as_ref() == Some(intent))
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        Self::push(&mut orders, order).map(InsertOutcome::Inserted)
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut matches = orders
            .iter()
            .filter(|o| o.payment_intent_id.as_deref() == Some(payment_intent_id));
        let first = matches.next().cloned();
        if matches.next().is_some() {
            tracing::error!(
                payment_intent_id,
                "multiple orders recorded for one payment intent"
            );
        }
        Ok(first)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(orders)
    }
}

// =============================================================================
// Reviews
// =============================================================================

/// In-memory reviews.
#[derive(Default)]
pub struct MemoryReviews {
    reviews: RwLock<Vec<Review>>,
}

impl MemoryReviews {
    /// No reviews.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviews {
    async fn list_by_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        let mut reviews: Vec<Review> = self
            .reviews
            .read()
            .await
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(reviews)
    }

    async fn add(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let mut reviews = self.reviews.write().await;
        let id = ReviewId::new(next_id(reviews.len())?);
        let stored = review.clone().into_review(id, Utc::now());
        reviews.push(stored.clone());
        Ok(stored)
    }

    async fn seed_if_empty(&self, seed: &[NewReview]) -> Result<usize, RepositoryError> {
        let mut reviews = self.reviews.write().await;
        if !reviews.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        for review in seed {
            let id = ReviewId::new(next_id(reviews.len())?);
            reviews.push(review.clone().into_review(id, now));
        }
        Ok(seed.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sole_core::pricing::{TaxRate, price_lines};
    use sole_core::{OrderNumber, OrderStatus};

    use super::*;
    use crate::models::OrderItem;

    fn size(s: &str) -> ShoeSize {
        s.parse().unwrap()
    }

    fn new_order(intent: Option<&str>, suffix: u16) -> NewOrder {
        let items = vec![OrderItem {
            product_id: ProductId::new(1),
            name: "Nike Air Max 90".to_string(),
            quantity: 1,
            size: size("9"),
            price: "100".parse().unwrap(),
        }];
        NewOrder {
            user_id: UserId::new(1),
            totals: price_lines(&items, TaxRate::NEPAL_VAT),
            items,
            order_number: OrderNumber::new("NP", 2024, suffix),
            status: OrderStatus::Paid,
            payment_intent_id: intent.map(ToOwned::to_owned),
        }
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent_per_intent() {
        let ledger = MemoryOrderLedger::new();

        let first = ledger
            .insert_if_absent(&new_order(Some("pi_123"), 1001))
            .await
            .unwrap();
        let second = ledger
            .insert_if_absent(&new_order(Some("pi_123"), 1002))
            .await
            .unwrap();

        assert!(matches!(first, InsertOutcome::Inserted(_)));
        assert!(matches!(second, InsertOutcome::Existing(_)));
        assert_eq!(ledger.len().await, 1);
        assert_eq!(
            second.into_order().order_number.as_str(),
            "ORD-NP-2024-1001"
        );
    }

    #[tokio::test]
    async fn test_order_number_collision_is_conflict() {
        let ledger = MemoryOrderLedger::new();
        ledger.insert(&new_order(None, 4821)).await.unwrap();
        let err = ledger.insert(&new_order(None, 4821)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first() {
        let ledger = MemoryOrderLedger::new();
        ledger.insert(&new_order(Some("pi_a"), 1001)).await.unwrap();
        ledger.insert(&new_order(Some("pi_b"), 1002)).await.unwrap();

        let orders = ledger.list_by_user(UserId::new(1)).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].payment_intent_id.as_deref(), Some("pi_b"));
        assert!(ledger.list_by_user(UserId::new(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stock_reserve_and_release() {
        let stock = MemoryStock::default();
        let (p, s) = (ProductId::new(5), size("9"));

        stock.set(p, s, 0).await;
        assert!(!stock.try_reserve(p, s, 1).await.unwrap());

        stock.release(p, s, 2).await.unwrap();
        assert!(stock.try_reserve(p, s, 2).await.unwrap());
        assert_eq!(stock.remaining(p, s).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_identity_rejects_duplicate_email() {
        let identity = MemoryIdentity::new();
        let email = Email::parse("jane@example.com").unwrap();
        identity.create_user(&email, "hash", None).await.unwrap();
        let err = identity.create_user(&email, "hash", None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_verify_email_requires_matching_address() {
        let identity = MemoryIdentity::new();
        let email = Email::parse("jane@example.com").unwrap();
        let id = identity.create_user(&email, "hash", None).await.unwrap();

        let other = Email::parse("mallory@example.com").unwrap();
        assert!(matches!(
            identity.verify_email(id, &other).await,
            Err(RepositoryError::NotFound)
        ));
        identity.verify_email(id, &email).await.unwrap();
        assert!(identity.get_user(id).await.unwrap().unwrap().email_verified);
    }

    #[tokio::test]
    async fn test_catalog_seeds_once() {
        let catalog = MemoryCatalog::new();
        let seed = super::super::seed::catalog();
        assert_eq!(catalog.seed_if_empty(&seed).await.unwrap(), seed.len());
        assert_eq!(catalog.seed_if_empty(&seed).await.unwrap(), 0);
        assert_eq!(catalog.list_products().await.unwrap().len(), seed.len());
    }
}
