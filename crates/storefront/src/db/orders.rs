//! Order ledger.
//!
//! Line items are stored as a JSONB array in the same camelCase shape the
//! order record is served in, so stored rows stay readable without a join.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use sole_core::{OrderId, OrderNumber, OrderStatus, UserId};

use super::{InsertOutcome, OrderLedger, RepositoryError};
use crate::models::{NewOrder, Order, OrderItem};

const ORDER_COLUMNS: &str = "id, user_id, items, subtotal, vat, total, order_number, status, \
     payment_intent_id, created_at";

const PAYMENT_INTENT_CONSTRAINT: &str = "order_payment_intent_id_key";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    items: Json<Vec<OrderItem>>,
    subtotal: Decimal,
    vat: Decimal,
    total: Decimal,
    order_number: String,
    status: OrderStatus,
    payment_intent_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let order_number = OrderNumber::try_from(row.order_number)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;

        Ok(Self {
            id: OrderId::new(row.id),
            user_id: UserId::new(row.user_id),
            items: row.items.0,
            total: row.total,
            subtotal: row.subtotal,
            vat: row.vat,
            order_number,
            status: row.status,
            payment_intent_id: row.payment_intent_id,
            created_at: row.created_at,
        })
    }
}

fn map_insert_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let what = if db_err.constraint() == Some(PAYMENT_INTENT_CONSTRAINT) {
            "order for payment intent"
        } else {
            "order number"
        };
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// `PostgreSQL`-backed [`OrderLedger`].
#[derive(Debug, Clone)]
pub struct PgOrderLedger {
    pool: PgPool,
}

impl PgOrderLedger {
    /// Create a new order ledger.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.order
                (user_id, items, subtotal, vat, total, order_number, status, payment_intent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.user_id)
        .bind(Json(&order.items))
        .bind(order.totals.subtotal)
        .bind(order.totals.tax)
        .bind(order.totals.total)
        .bind(order.order_number.as_str())
        .bind(order.status)
        .bind(order.payment_intent_id.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Order::try_from(row)
    }

    async fn insert_if_absent(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        let Some(intent_id) = order.payment_intent_id.as_deref() else {
            return self.insert(order).await.map(InsertOutcome::Inserted);
        };

        let inserted: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.order
                (user_id, items, subtotal, vat, total, order_number, status, payment_intent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (payment_intent_id) DO NOTHING
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.user_id)
        .bind(Json(&order.items))
        .bind(order.totals.subtotal)
        .bind(order.totals.tax)
        .bind(order.totals.total)
        .bind(order.order_number.as_str())
        .bind(order.status)
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_insert_error)?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(Order::try_from(row)?));
        }

        // Lost the race (or a retry): the winning row is committed by now.
        self.find_by_payment_intent(intent_id)
            .await?
            .map(InsertOutcome::Existing)
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order WHERE payment_intent_id = $1 ORDER BY id LIMIT 2"
        ))
        .bind(payment_intent_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.len() > 1 {
            tracing::error!(
                payment_intent_id,
                "Multiple orders recorded for one payment intent; using the first"
            );
        }

        rows.into_iter().next().map(Order::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
