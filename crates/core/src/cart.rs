//! Cart lines and stock counters.
//!
//! A [`Cart`] is a set of lines unique by `(product, size)`. Lines carry a
//! snapshot of the product name and unit price taken when the line was first
//! added, so totals do not shift if the catalog changes mid-session.
//!
//! A [`StockCounter`] tracks remaining units per `(product, size)`. Unseen
//! keys start at a configurable default. The counter never goes negative:
//! [`StockCounter::try_take`] either takes the full quantity or nothing.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::{Priced, TaxRate, Totals, price_lines};
use crate::{ProductId, ShoeSize};

/// Units available for a key the counter has never seen.
pub const DEFAULT_STOCK: u32 = 100;

/// Key identifying one sellable unit: a product in a given size.
pub type StockKey = (ProductId, ShoeSize);

/// Errors for malformed cart input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartLineError {
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("unit price cannot be negative")]
    NegativePrice,
}

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub size: ShoeSize,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    /// The `(product, size)` key of this line.
    #[must_use]
    pub const fn key(&self) -> StockKey {
        (self.product_id, self.size)
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

impl Priced for CartLine {
    fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// A shopper's cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// True if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Find the line for `(product_id, size)`.
    #[must_use]
    pub fn line(&self, product_id: ProductId, size: ShoeSize) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|l| l.product_id == product_id && l.size == size)
    }

    /// Add `quantity` units, merging into an existing line for the same key.
    ///
    /// The stored name and unit price of an existing line are kept.
    ///
    /// # Errors
    ///
    /// Rejects a zero quantity or a negative unit price; the cart is unchanged.
    pub fn add(
        &mut self,
        product_id: ProductId,
        size: ShoeSize,
        name: &str,
        unit_price: Decimal,
        quantity: u32,
    ) -> Result<(), CartLineError> {
        if quantity == 0 {
            return Err(CartLineError::ZeroQuantity);
        }
        if unit_price.is_sign_negative() {
            return Err(CartLineError::NegativePrice);
        }

        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.product_id == product_id && l.size == size)
        {
            existing.quantity = existing.quantity.saturating_add(quantity);
        } else {
            self.lines.push(CartLine {
                product_id,
                size,
                name: name.to_owned(),
                unit_price,
                quantity,
            });
        }
        Ok(())
    }

    /// Remove the line for `(product_id, size)`, returning it if present.
    pub fn remove(&mut self, product_id: ProductId, size: ShoeSize) -> Option<CartLine> {
        let pos = self
            .lines
            .iter()
            .position(|l| l.product_id == product_id && l.size == size)?;
        Some(self.lines.remove(pos))
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Subtotal, tax and total at `rate`.
    #[must_use]
    pub fn totals(&self, rate: TaxRate) -> Totals {
        price_lines(&self.lines, rate)
    }
}

/// Remaining units per `(product, size)`.
#[derive(Debug, Clone)]
pub struct StockCounter {
    default: u32,
    remaining: HashMap<StockKey, u32>,
}

impl StockCounter {
    /// A counter where unseen keys start at `default` units.
    #[must_use]
    pub fn new(default: u32) -> Self {
        Self {
            default,
            remaining: HashMap::new(),
        }
    }

    /// Units left for `key`.
    #[must_use]
    pub fn remaining(&self, key: StockKey) -> u32 {
        self.remaining.get(&key).copied().unwrap_or(self.default)
    }

    /// Overwrite the count for `key`.
    pub fn set(&mut self, key: StockKey, units: u32) {
        self.remaining.insert(key, units);
    }

    /// Take `quantity` units if that many remain. Returns `false` and leaves
    /// the count untouched otherwise (including when nothing remains).
    pub fn try_take(&mut self, key: StockKey, quantity: u32) -> bool {
        let left = self.remaining(key);
        if left == 0 || quantity > left {
            return false;
        }
        self.remaining.insert(key, left - quantity);
        true
    }

    /// Return `quantity` units to `key`.
    pub fn restore(&mut self, key: StockKey, quantity: u32) {
        let left = self.remaining(key);
        self.remaining.insert(key, left.saturating_add(quantity));
    }
}

impl Default for StockCounter {
    fn default() -> Self {
        Self::new(DEFAULT_STOCK)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn size(s: &str) -> ShoeSize {
        s.parse().unwrap()
    }

    fn price(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_add_merges_same_key() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), size("9"), "Air Max 90", price("120"), 1)
            .unwrap();
        cart.add(ProductId::new(1), size("9"), "Air Max 90", price("120"), 2)
            .unwrap();
        cart.add(ProductId::new(1), size("9.5"), "Air Max 90", price("120"), 1)
            .unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.line(ProductId::new(1), size("9")).unwrap().quantity, 3);
        assert_eq!(cart.item_count(), 4);
    }

    #[test]
    fn test_add_keeps_first_price_snapshot() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(2), size("8"), "Ultraboost", price("180"), 1)
            .unwrap();
        cart.add(ProductId::new(2), size("8"), "Ultraboost", price("150"), 1)
            .unwrap();
        assert_eq!(
            cart.line(ProductId::new(2), size("8")).unwrap().unit_price,
            price("180")
        );
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.add(ProductId::new(1), size("9"), "x", price("10"), 0),
            Err(CartLineError::ZeroQuantity)
        );
        assert_eq!(
            cart.add(ProductId::new(1), size("9"), "x", price("-1"), 1),
            Err(CartLineError::NegativePrice)
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), size("9"), "a", price("10"), 2)
            .unwrap();
        cart.add(ProductId::new(3), size("10"), "b", price("20"), 1)
            .unwrap();

        let removed = cart.remove(ProductId::new(1), size("9")).unwrap();
        assert_eq!(removed.quantity, 2);
        assert!(cart.remove(ProductId::new(1), size("9")).is_none());
        assert_eq!(cart.lines().len(), 1);

        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals_delegate_to_pricing() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), size("9"), "a", price("100"), 1)
            .unwrap();
        let totals = cart.totals(TaxRate::NEPAL_VAT);
        assert_eq!(totals.total, price("113.00"));
    }

    #[test]
    fn test_stock_defaults_and_decrements() {
        let key = (ProductId::new(1), size("9"));
        let mut stock = StockCounter::default();
        assert_eq!(stock.remaining(key), DEFAULT_STOCK);

        assert!(stock.try_take(key, 3));
        assert_eq!(stock.remaining(key), DEFAULT_STOCK - 3);
    }

    #[test]
    fn test_stock_never_negative() {
        let key = (ProductId::new(5), size("9"));
        let mut stock = StockCounter::default();
        stock.set(key, 0);
        assert!(!stock.try_take(key, 1));
        assert_eq!(stock.remaining(key), 0);

        stock.set(key, 2);
        assert!(!stock.try_take(key, 3));
        assert_eq!(stock.remaining(key), 2);
        assert!(stock.try_take(key, 2));
        assert_eq!(stock.remaining(key), 0);
    }

    #[test]
    fn test_stock_restore() {
        let key = (ProductId::new(1), size("7"));
        let mut stock = StockCounter::new(1);
        assert!(stock.try_take(key, 1));
        stock.restore(key, 1);
        assert_eq!(stock.remaining(key), 1);
    }

    #[test]
    fn test_cart_json_shape() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), size("7.5"), "Air Max 90", price("120"), 1)
            .unwrap();
        let json = serde_json::to_value(&cart).unwrap();
        let line = &json["lines"][0];
        assert_eq!(line["productId"], 1);
        assert_eq!(line["size"], 7.5);
        assert_eq!(line["unitPrice"], 120.0);
        assert_eq!(line["quantity"], 1);
    }
}
