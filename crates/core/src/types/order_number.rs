//! Human-readable order numbers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Lowest four-digit suffix.
pub const SUFFIX_MIN: u16 = 1000;
/// Highest four-digit suffix.
pub const SUFFIX_MAX: u16 = 9999;

/// A string that is not an `ORD-<REGION>-<YEAR>-<NNNN>` order number.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed order number: {0}")]
pub struct MalformedOrderNumber(pub String);

/// An order number of the form `ORD-<REGION>-<YEAR>-<NNNN>`, e.g. `ORD-NP-2024-4821`.
///
/// The suffix space is only 9000 values per region and year, so uniqueness
/// is the ledger's job (unique constraint plus regeneration), not this type's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Build an order number from its parts.
    ///
    /// `region` is uppercased; `suffix` is clamped into the four-digit range.
    #[must_use]
    pub fn new(region: &str, year: i32, suffix: u16) -> Self {
        let suffix = suffix.clamp(SUFFIX_MIN, SUFFIX_MAX);
        Self(format!(
            "ORD-{}-{year}-{suffix}",
            region.trim().to_ascii_uppercase()
        ))
    }

    /// The formatted order number.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = MalformedOrderNumber;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut parts = value.split('-');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next(), parts.next(), parts.next()),
            (Some("ORD"), Some(region), Some(year), Some(suffix), None)
                if !region.is_empty()
                    && year.len() == 4
                    && year.bytes().all(|b| b.is_ascii_digit())
                    && suffix.len() == 4
                    && suffix.bytes().all(|b| b.is_ascii_digit())
        );
        if well_formed {
            Ok(Self(value))
        } else {
            Err(MalformedOrderNumber(value))
        }
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(OrderNumber::new("np", 2024, 4821).as_str(), "ORD-NP-2024-4821");
    }

    #[test]
    fn test_suffix_clamped_to_four_digits() {
        assert_eq!(OrderNumber::new("NP", 2024, 7).as_str(), "ORD-NP-2024-1000");
        assert_eq!(
            OrderNumber::new("NP", 2024, u16::MAX).as_str(),
            "ORD-NP-2024-9999"
        );
    }

    #[test]
    fn test_parse() {
        assert!(OrderNumber::try_from("ORD-NP-2025-1234".to_string()).is_ok());
        assert!(OrderNumber::try_from("ORD-NP-25-1234".to_string()).is_err());
        assert!(OrderNumber::try_from("INV-NP-2025-1234".to_string()).is_err());
        assert_eq!(
            OrderNumber::try_from("ORD-NP-2025-12a4".to_string()),
            Err(MalformedOrderNumber("ORD-NP-2025-12a4".to_string()))
        );
    }
}
