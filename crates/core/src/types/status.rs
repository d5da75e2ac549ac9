//! Status enums for orders and payment intents.

use serde::{Deserialize, Serialize};

/// Lifecycle of a recorded order.
///
/// Checkout records orders as `Paid`; `Shipped` is set by fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Shipped,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Shipped => write!(f, "shipped"),
        }
    }
}

/// A status string that names no [`OrderStatus`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid order status: {0}")]
pub struct UnknownOrderStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            _ => Err(UnknownOrderStatus(s.to_string())),
        }
    }
}

/// Status of a payment intent as reported by the gateway.
///
/// Gateways report more states than these three (processing, canceled,
/// requires action, ...). Anything that is not a definitive success or
/// failure is treated as still requiring payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    RequiresPayment,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    /// Map a raw gateway status string onto the three states checkout acts on.
    #[must_use]
    pub fn from_gateway(raw: &str) -> Self {
        match raw {
            "succeeded" => Self::Succeeded,
            "failed" | "canceled" | "payment_failed" => Self::Failed,
            _ => Self::RequiresPayment,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequiresPayment => write!(f, "requires_payment"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
