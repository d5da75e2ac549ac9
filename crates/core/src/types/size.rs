//! Shoe sizes.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`ShoeSize`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("size must be positive")]
    NotPositive,
    #[error("size must be a whole or half size, got {0}")]
    NotHalfStep(Decimal),
    #[error("size must be at most {max}")]
    TooLarge { max: u32 },
}

/// A numeric shoe size such as `9` or `7.5`.
///
/// Stored normalized so that `9`, `9.0` and `9.00` are the same cart key.
/// Serialized as a JSON number to match stored order records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "SizeRepr")]
pub struct ShoeSize(Decimal);

impl ShoeSize {
    /// Largest size the catalog carries.
    pub const MAX: u32 = 20;

    /// Validate and normalize a size.
    ///
    /// # Errors
    ///
    /// Rejects zero/negative sizes, sizes above [`Self::MAX`], and anything
    /// that is not a multiple of one half.
    pub fn new(value: Decimal) -> Result<Self, SizeError> {
        if value <= Decimal::ZERO {
            return Err(SizeError::NotPositive);
        }
        if value > Decimal::from(Self::MAX) {
            return Err(SizeError::TooLarge { max: Self::MAX });
        }
        if !(value * Decimal::TWO).fract().is_zero() {
            return Err(SizeError::NotHalfStep(value));
        }
        Ok(Self(value.normalize()))
    }

    /// The size as a decimal.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for ShoeSize {
    type Error = SizeError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ShoeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl core::str::FromStr for ShoeSize {
    type Err = SizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| SizeError::NotPositive)?;
        Self::new(value)
    }
}

/// Serialization shape: a plain JSON number.
#[derive(Serialize)]
#[serde(transparent)]
struct SizeRepr(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl From<ShoeSize> for SizeRepr {
    fn from(size: ShoeSize) -> Self {
        Self(size.0)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShoeSize {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShoeSize {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let d = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(d)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShoeSize {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
