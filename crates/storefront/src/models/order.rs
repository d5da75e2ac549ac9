//! Order records.
//!
//! The JSON form of [`Order`] is the stored record layout:
//!
//! ```text
//! { userId, items: [{ productId, name, quantity, size, price }],
//!   total, subtotal, vat, orderNumber, status, paymentIntentId, createdAt }
//! ```
//!
//! `productId` is a string and `createdAt` is epoch milliseconds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sole_core::cart::CartLine;
use sole_core::pricing::{Priced, TaxRate, Totals, price_lines};
use sole_core::{OrderId, OrderNumber, OrderStatus, ProductId, ShoeSize, UserId};

/// A line item captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(with = "sole_core::id::product_id_string")]
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub size: ShoeSize,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

impl From<&CartLine> for OrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            name: line.name.clone(),
            quantity: line.quantity,
            size: line.size,
            price: line.unit_price,
        }
    }
}

impl Priced for OrderItem {
    fn unit_price(&self) -> Decimal {
        self.price
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// A recorded order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub vat: Decimal,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Whether the stored totals match a reprice of the stored items at `rate`.
    #[must_use]
    pub fn totals_consistent(&self, rate: TaxRate) -> bool {
        let repriced = price_lines(&self.items, rate);
        repriced.subtotal == self.subtotal && repriced.tax == self.vat && repriced.total == self.total
    }
}

/// An order to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_intent_id: Option<String>,
}

impl NewOrder {
    /// Attach a ledger-assigned id and creation time.
    #[must_use]
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            user_id: self.user_id,
            items: self.items,
            total: self.totals.total,
            subtotal: self.totals.subtotal,
            vat: self.totals.tax,
            order_number: self.order_number,
            status: self.status,
            payment_intent_id: self.payment_intent_id,
            created_at,
        }
    }
}
