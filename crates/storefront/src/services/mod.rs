//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Registration and password login
//! - `catalog` - Cached product reads
//! - `cart` - Cart changes against the shared stock ledger
//! - `checkout` - The checkout state machine, from profile gate to recorded order
//! - `reviews` - Product reviews
//!
//! Services hold `Arc<dyn Trait>` handles to their stores and never touch the
//! session. Handlers load the [`CheckoutContext`](crate::models::CheckoutContext)
//! from the session, pass it in explicitly, and write it back.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod reviews;
