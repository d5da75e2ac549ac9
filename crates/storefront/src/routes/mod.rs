//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness
//! GET  /health/ready                - Readiness (database reachable)
//!
//! # Products
//! GET  /products                    - Catalog
//! GET  /products/{id}               - Product detail
//! GET  /products/{id}/stock?size=   - Remaining stock for a size
//! GET  /products/{id}/reviews       - Reviews, newest first
//! POST /products/{id}/reviews       - Add review (auth)
//!
//! # Cart
//! GET  /cart                        - Cart with subtotal, tax, total
//! POST /cart/add                    - Reserve stock and add (409 when out of stock)
//! POST /cart/remove                 - Remove line, release stock
//! POST /cart/clear                  - Empty cart, release stock
//!
//! # Auth (rate limited)
//! POST /auth/register               - Create account, start session
//! POST /auth/login                  - Log in
//! POST /auth/logout                 - Log out
//!
//! # Account (auth)
//! GET  /account                     - Profile
//! POST /account/profile             - Partial profile write-through
//! POST /account/verify-email        - Email ownership proof
//! GET  /account/orders              - Order history, newest first
//!
//! # Checkout (auth)
//! GET  /checkout                    - Current state
//! POST /checkout/profile            - Submit profile fields
//! POST /checkout/intent             - Create or reuse payment intent
//! POST /checkout/confirm            - Confirm payment, record order
//! GET  /checkout/complete?payment_intent= - Redirect-return settlement
//! GET  /orders/by-intent/{id}       - Order for a payment intent (owner)
//! ```

pub mod account;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod reviews;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
        .route("/{id}/stock", get(products::stock))
        .route(
            "/{id}/reviews",
            get(reviews::index).post(reviews::create),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/profile", post(account::update_profile))
        .route("/verify-email", post(account::verify_email))
        .route("/orders", get(account::orders))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/profile", post(checkout::profile))
        .route("/intent", post(checkout::intent))
        .route("/confirm", post(checkout::confirm))
        .route("/complete", get(checkout::complete))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    let shopping = Router::new()
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .layer(api_rate_limiter());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/products", product_routes())
        .merge(shopping)
        .nest("/account", account_routes())
        .route("/orders/by-intent/{id}", get(orders::by_intent))
        .nest("/auth", auth_routes())
}
