//! Pricing engine: subtotal, tax and total for a set of cart lines.
//!
//! Pure and deterministic. The storefront calls [`price_lines`] for the cart
//! summary and again right before requesting a payment intent; both calls
//! must agree to the cent, so every rounding step lives here.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::money::round_money;
use crate::{CurrencyCode, Money};

/// Fractional digits kept on every presented amount.
const MONEY_DIGITS: u32 = 2;

/// Errors that can occur when building a [`TaxRate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxRateError {
    #[error("tax rate must be in [0, 1), got {0}")]
    OutOfRange(Decimal),
    #[error("invalid tax rate {0:?}")]
    Malformed(String),
}

/// A flat sales-tax / VAT rate applied once to the whole cart subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// Nepal VAT, 13%.
    pub const NEPAL_VAT: Self = Self(Decimal::from_parts(13, 0, 0, false, 2));

    /// Build a rate from a fraction in `[0, 1)`.
    ///
    /// # Errors
    ///
    /// Returns an error for negative rates or rates of 100% or more.
    pub fn new(rate: Decimal) -> Result<Self, TaxRateError> {
        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(TaxRateError::OutOfRange(rate));
        }
        Ok(Self(rate))
    }

    /// The rate as a fraction (0.13 for 13%).
    #[must_use]
    pub const fn fraction(&self) -> Decimal {
        self.0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::NEPAL_VAT
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

impl FromStr for TaxRate {
    type Err = TaxRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rate = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| TaxRateError::Malformed(s.to_string()))?;
        Self::new(rate)
    }
}

/// Anything with a unit price and a quantity.
pub trait Priced {
    /// Price of one unit.
    fn unit_price(&self) -> Decimal;
    /// Number of units.
    fn quantity(&self) -> u32;
}

/// Derived amounts for a cart or order, each rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl Totals {
    /// Totals of an empty cart.
    pub const ZERO: Self = Self {
        subtotal: Decimal::ZERO,
        tax: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    /// Total as an amount in `currency`.
    #[must_use]
    pub const fn total_money(&self, currency: CurrencyCode) -> Money {
        Money::new(self.total, currency)
    }

    /// Total in the smallest unit of `currency`, as sent to the payment gateway.
    #[must_use]
    pub fn total_minor_units(&self, currency: CurrencyCode) -> Option<i64> {
        self.total_money(currency).to_minor_units()
    }
}

/// Compute `subtotal = Σ unit_price × quantity`, `tax = subtotal × rate`,
/// `total = subtotal + tax`, each rounded half-up to cents.
pub fn price_lines<'a, L, I>(lines: I, rate: TaxRate) -> Totals
where
    L: Priced + 'a,
    I: IntoIterator<Item = &'a L>,
{
    let raw_subtotal: Decimal = lines
        .into_iter()
        .map(|line| line.unit_price() * Decimal::from(line.quantity()))
        .sum();

    let subtotal = round_money(raw_subtotal, MONEY_DIGITS);
    let tax = round_money(subtotal * rate.fraction(), MONEY_DIGITS);

    Totals {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Line(Decimal, u32);

    impl Priced for Line {
        fn unit_price(&self) -> Decimal {
            self.0
        }
        fn quantity(&self) -> u32 {
            self.1
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_single_line_at_thirteen_percent() {
        let totals = price_lines(&[Line(dec("100"), 1)], TaxRate::NEPAL_VAT);
        assert_eq!(totals.subtotal, dec("100.00"));
        assert_eq!(totals.tax, dec("13.00"));
        assert_eq!(totals.total, dec("113.00"));
        assert_eq!(totals.total_minor_units(CurrencyCode::Usd), Some(11300));
    }

    #[test]
    fn test_multiple_lines_and_quantities() {
        let lines = [Line(dec("120"), 2), Line(dec("175"), 1)];
        let totals = price_lines(&lines, TaxRate::NEPAL_VAT);
        assert_eq!(totals.subtotal, dec("415"));
        assert_eq!(totals.tax, dec("53.95"));
        assert_eq!(totals.total, dec("468.95"));
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // 0.50 * 0.13 = 0.065 -> 0.07
        let totals = price_lines(&[Line(dec("0.50"), 1)], TaxRate::NEPAL_VAT);
        assert_eq!(totals.tax, dec("0.07"));
        assert_eq!(totals.total, dec("0.57"));
    }

    #[test]
    fn test_empty_cart_is_zero() {
        let lines: [Line; 0] = [];
        assert_eq!(price_lines(&lines, TaxRate::NEPAL_VAT), Totals::ZERO);
    }

    #[test]
    fn test_total_is_subtotal_plus_rate_for_many_carts() {
        let rate = TaxRate::NEPAL_VAT;
        for cents in (0..20_000_i64).step_by(37) {
            for qty in 1..4_u32 {
                let price = Decimal::new(cents, 2);
                let totals = price_lines(&[Line(price, qty)], rate);
                let expected = round_money(
                    totals.subtotal + totals.subtotal * rate.fraction(),
                    MONEY_DIGITS,
                );
                assert_eq!(totals.total, expected);
                assert!(!totals.total.is_sign_negative());
            }
        }
    }

    #[test]
    fn test_repeated_pricing_is_identical() {
        let lines = [Line(dec("99.99"), 3), Line(dec("0.01"), 7)];
        let first = price_lines(&lines, TaxRate::NEPAL_VAT);
        let second = price_lines(&lines, TaxRate::NEPAL_VAT);
        assert_eq!(first, second);
    }

    #[test]
    fn test_tax_rate_parsing() {
        assert_eq!("0.13".parse::<TaxRate>().unwrap(), TaxRate::NEPAL_VAT);
        assert_eq!(
            "1.2".parse::<TaxRate>(),
            Err(TaxRateError::OutOfRange("1.2".parse().unwrap()))
        );
        assert!("-0.1".parse::<TaxRate>().is_err());
        assert!(matches!(
            "13%".parse::<TaxRate>(),
            Err(TaxRateError::Malformed(_))
        ));
        assert_eq!(TaxRate::NEPAL_VAT.to_string(), "13%");
    }
}
