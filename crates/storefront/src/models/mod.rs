//! Domain models for the storefront.
//!
//! These are the shapes the storage traits in [`crate::db`] hand back and the
//! JSON bodies the routes return. Row types used for decoding live next to the
//! `PostgreSQL` implementations.

pub mod order;
pub mod product;
pub mod review;
pub mod session;
pub mod user;

pub use order::{NewOrder, Order, OrderItem};
pub use product::{NewProduct, Product};
pub use review::{NewReview, Review};
pub use session::{CheckoutContext, CheckoutState, CurrentUser, HeldIntent, keys as session_keys};
pub use user::User;
