//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    CatalogStore, IdentityStore, MemoryCatalog, MemoryIdentity, MemoryOrderLedger, MemoryReviews,
    MemoryStock, OrderLedger, PgCatalogStore, PgIdentityStore, PgOrderLedger, PgReviewStore,
    PgStockLedger, ReviewStore, StockLedger,
};
use crate::payments::{PaymentGateway, StripeGateway};
use crate::services::auth::AuthService;
use crate::services::cart::CartService;
use crate::services::catalog::CatalogService;
use crate::services::checkout::CheckoutService;
use crate::services::reviews::ReviewService;

/// The storage collaborators behind the services.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub stock: Arc<dyn StockLedger>,
    pub orders: Arc<dyn OrderLedger>,
    pub reviews: Arc<dyn ReviewStore>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool, default_stock: u32) -> Self {
        Self {
            catalog: Arc::new(PgCatalogStore::new(pool.clone())),
            identity: Arc::new(PgIdentityStore::new(pool.clone())),
            stock: Arc::new(PgStockLedger::new(pool.clone(), default_stock)),
            orders: Arc::new(PgOrderLedger::new(pool.clone())),
            reviews: Arc::new(PgReviewStore::new(pool.clone())),
        }
    }

    /// In-process stores, for tests and local runs without a database.
    #[must_use]
    pub fn in_memory(default_stock: u32) -> Self {
        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            identity: Arc::new(MemoryIdentity::new()),
            stock: Arc::new(MemoryStock::new(default_stock)),
            orders: Arc::new(MemoryOrderLedger::new()),
            reviews: Arc::new(MemoryReviews::new()),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the services, the order ledger and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    orders: Arc<dyn OrderLedger>,
    auth: AuthService,
    catalog: CatalogService,
    carts: CartService,
    checkout: CheckoutService,
    reviews: ReviewService,
}

impl AppState {
    /// Create the application state backed by `PostgreSQL` and Stripe.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let stores = Stores::postgres(&pool, config.checkout.default_stock);
        let gateway = Arc::new(StripeGateway::new(&config.stripe));
        Self::build(config, Some(pool), stores, gateway, std::convert::identity)
    }

    /// Create the application state from explicit collaborators.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self::build(config, None, stores, gateway, std::convert::identity)
    }

    /// Like [`Self::from_parts`], with a custom checkout service.
    #[must_use]
    pub fn with_checkout(
        config: StorefrontConfig,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        customize: impl FnOnce(CheckoutService) -> CheckoutService,
    ) -> Self {
        Self::build(config, None, stores, gateway, customize)
    }

    fn build(
        config: StorefrontConfig,
        pool: Option<PgPool>,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        customize: impl FnOnce(CheckoutService) -> CheckoutService,
    ) -> Self {
        let catalog = CatalogService::new(stores.catalog);
        let carts = CartService::new(catalog.clone(), stores.stock, config.checkout.tax_rate);
        let checkout = customize(CheckoutService::new(
            Arc::clone(&stores.identity),
            Arc::clone(&stores.orders),
            gateway,
            config.checkout.clone(),
        ));

        Self {
            inner: Arc::new(AppStateInner {
                auth: AuthService::new(stores.identity),
                reviews: ReviewService::new(stores.reviews, catalog.clone()),
                orders: stores.orders,
                catalog,
                carts,
                checkout,
                pool,
                config,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool, if there is one.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// The order ledger, for order history and lookups.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderLedger {
        self.inner.orders.as_ref()
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn reviews(&self) -> &ReviewService {
        &self.inner.reviews
    }
}
