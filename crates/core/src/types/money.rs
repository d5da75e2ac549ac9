//! Monetary amounts using decimal arithmetic.
//!
//! Catalog prices and order totals are carried as [`Decimal`] in the
//! currency's standard unit (dollars, not cents). Payment gateways want an
//! integer count of the smallest unit instead; [`Money::to_minor_units`] is the
//! single place that conversion happens.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A decimal amount tagged with its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: CurrencyCode,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    /// Amount rounded half-up to the currency's fractional digits.
    #[must_use]
    pub fn rounded(&self) -> Decimal {
        round_money(self.amount, self.currency.minor_digits())
    }

    /// Integer count of the smallest currency unit (cents for USD), rounded
    /// half-up. Returns `None` if the value does not fit in an `i64`.
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;

        let digits = self.currency.minor_digits();
        let scale = Decimal::from(10_i64.pow(digits));
        (self.rounded() * scale).trunc().to_i64()
    }

    /// Build an amount from a minor-unit count.
    #[must_use]
    pub fn from_minor_units(units: i64, currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::new(units, currency.minor_digits()),
            currency,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:.2}",
            self.currency.symbol(),
            self.rounded().normalize()
        )
    }
}

/// Round half-up (away from zero at the midpoint) to `digits` fractional digits.
#[must_use]
pub fn round_money(amount: Decimal, digits: u32) -> Decimal {
    amount.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero)
}

/// Currencies the storefront can charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    Usd,
    Eur,
    Gbp,
    Npr,
}

impl CurrencyCode {
    /// Lowercase three-letter code, as payment gateways expect it.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Npr => "npr",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
            Self::Npr => "Rs ",
        }
    }

    /// Digits after the decimal point in the smallest unit.
    #[must_use]
    pub const fn minor_digits(&self) -> u32 {
        2
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A currency code the storefront does not sell in.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

impl FromStr for CurrencyCode {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "npr" => Ok(Self::Npr),
            other => Err(UnsupportedCurrency(other.to_string())),
        }
    }
}
