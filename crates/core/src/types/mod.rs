//! Core types for Sole.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod size;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, Money, UnsupportedCurrency};
pub use order_number::{MalformedOrderNumber, OrderNumber};
pub use size::{ShoeSize, SizeError};
pub use status::*;
