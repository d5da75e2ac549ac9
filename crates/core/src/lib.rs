//! Sole Core - Shared types and pure checkout logic.
//!
//! This crate provides the domain vocabulary used across all Sole components:
//! - `storefront` - Public-facing e-commerce service (catalog, cart, checkout)
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything here is deterministic for identical input,
//! which is what lets the storefront compute the same total twice (once for
//! display, once before creating a payment intent) without drift.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, money, emails, sizes and statuses
//! - [`pricing`] - Subtotal / tax / total derivation and minor-unit conversion
//! - [`cart`] - Cart lines and the per-(product, size) stock counter
//! - [`profile`] - Checkout profile guard and age derivation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod pricing;
pub mod profile;
pub mod types;

pub use types::*;
