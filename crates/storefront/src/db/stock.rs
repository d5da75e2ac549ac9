//! Shared stock counters.
//!
//! A counter row is created at the default level the first time a key is
//! touched. Reservations are a single conditional `UPDATE`, so two shoppers
//! racing for the last pair cannot both succeed.

use async_trait::async_trait;
use sqlx::PgPool;

use sole_core::{ProductId, ShoeSize};

use super::{RepositoryError, StockLedger};

/// `PostgreSQL`-backed [`StockLedger`].
#[derive(Debug, Clone)]
pub struct PgStockLedger {
    pool: PgPool,
    default_units: i32,
}

impl PgStockLedger {
    /// Create a ledger whose unseen keys start at `default_units`.
    #[must_use]
    pub fn new(pool: PgPool, default_units: u32) -> Self {
        Self {
            pool,
            default_units: i32::try_from(default_units).unwrap_or(i32::MAX),
        }
    }

    async fn ensure_row(&self, product_id: ProductId, size: ShoeSize) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.stock (product_id, size, remaining)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, size) DO NOTHING
            ",
        )
        .bind(product_id)
        .bind(size)
        .bind(self.default_units)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn quantity_param(quantity: u32) -> i32 {
    i32::try_from(quantity).unwrap_or(i32::MAX)
}

#[async_trait]
impl StockLedger for PgStockLedger {
    async fn remaining(
        &self,
        product_id: ProductId,
        size: ShoeSize,
    ) -> Result<u32, RepositoryError> {
        let remaining: Option<i32> = sqlx::query_scalar(
            "SELECT remaining FROM storefront.stock WHERE product_id = $1 AND size = $2",
        )
        .bind(product_id)
        .bind(size)
        .fetch_optional(&self.pool)
        .await?;

        let remaining = remaining.unwrap_or(self.default_units);
        u32::try_from(remaining)
            .map_err(|_| RepositoryError::DataCorruption("negative stock counter".to_owned()))
    }

    async fn try_reserve(
        &self,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        self.ensure_row(product_id, size).await?;

        let result = sqlx::query(
            r"
            UPDATE storefront.stock
            SET remaining = remaining - $3
            WHERE product_id = $1 AND size = $2 AND remaining >= $3
            ",
        )
        .bind(product_id)
        .bind(size)
        .bind(quantity_param(quantity))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(
        &self,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        self.ensure_row(product_id, size).await?;

        sqlx::query(
            r"
            UPDATE storefront.stock
            SET remaining = LEAST(remaining::BIGINT + $3, 2147483647)::INTEGER
            WHERE product_id = $1 AND size = $2
            ",
        )
        .bind(product_id)
        .bind(size)
        .bind(quantity_param(quantity))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
