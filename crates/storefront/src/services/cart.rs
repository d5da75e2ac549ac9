//! Cart changes against the shared stock ledger.
//!
//! Adding a line reserves its units in the [`StockLedger`] first; only a
//! successful reservation touches the cart. Removing a line gives its units
//! back. Clearing the cart after a completed order goes through
//! [`Cart::clear`](sole_core::cart::Cart::clear) directly and leaves stock
//! alone, since those units were sold.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use sole_core::cart::CartLine;
use sole_core::pricing::{TaxRate, Totals};
use sole_core::{ProductId, ShoeSize};

use super::catalog::CatalogService;
use crate::db::{RepositoryError, StockLedger};
use crate::models::{CheckoutContext, CheckoutState};

/// Errors that can occur when changing the cart.
#[derive(Debug, Error)]
pub enum CartError {
    /// No such product.
    #[error("unknown product {0}")]
    UnknownProduct(ProductId),

    /// The product is not made in this size.
    #[error("product {product_id} is not available in size {size}")]
    UnavailableSize { product_id: ProductId, size: ShoeSize },

    /// Quantity must be at least one.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Not enough units left.
    #[error("product {product_id} is out of stock in size {size}")]
    OutOfStock { product_id: ProductId, size: ShoeSize },

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Cart contents with derived amounts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Cart operations.
#[derive(Clone)]
pub struct CartService {
    catalog: CatalogService,
    stock: Arc<dyn StockLedger>,
    tax_rate: TaxRate,
}

impl CartService {
    /// Create a cart service.
    #[must_use]
    pub fn new(catalog: CatalogService, stock: Arc<dyn StockLedger>, tax_rate: TaxRate) -> Self {
        Self {
            catalog,
            stock,
            tax_rate,
        }
    }

    /// Cart lines and totals.
    #[must_use]
    pub fn view(&self, ctx: &CheckoutContext) -> CartView {
        CartView {
            lines: ctx.cart.lines().to_vec(),
            item_count: ctx.cart.item_count(),
            totals: ctx.cart.totals(self.tax_rate),
        }
    }

    /// Units left for a product and size.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures.
    pub async fn remaining(&self, product_id: ProductId, size: ShoeSize) -> Result<u32, CartError> {
        Ok(self.stock.remaining(product_id, size).await?)
    }

    /// Reserve `quantity` units and add them to the cart.
    ///
    /// The unit price is taken from the catalog at the time of the first add.
    ///
    /// # Errors
    ///
    /// Returns `CartError::OutOfStock` without changing the cart when fewer
    /// than `quantity` units remain.
    #[instrument(skip(self, ctx), fields(product_id = %product_id, size = %size))]
    pub async fn add(
        &self,
        ctx: &mut CheckoutContext,
        product_id: ProductId,
        size: ShoeSize,
        quantity: u32,
    ) -> Result<CartView, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        let product = self
            .catalog
            .get(product_id)
            .await?
            .ok_or(CartError::UnknownProduct(product_id))?;
        if !product.offers_size(size) {
            return Err(CartError::UnavailableSize { product_id, size });
        }

        if !self.stock.try_reserve(product_id, size, quantity).await? {
            tracing::info!(quantity, "Add to cart rejected, out of stock");
            return Err(CartError::OutOfStock { product_id, size });
        }

        if ctx
            .cart
            .add(product_id, size, &product.name, product.price, quantity)
            .is_err()
        {
            self.stock.release(product_id, size, quantity).await?;
            return Err(CartError::InvalidQuantity);
        }

        cart_changed(ctx);
        Ok(self.view(ctx))
    }

    /// Remove a line and release its units.
    ///
    /// Removing a line that is not in the cart is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures.
    #[instrument(skip(self, ctx), fields(product_id = %product_id, size = %size))]
    pub async fn remove(
        &self,
        ctx: &mut CheckoutContext,
        product_id: ProductId,
        size: ShoeSize,
    ) -> Result<CartView, CartError> {
        if let Some(line) = ctx.cart.remove(product_id, size) {
            self.stock.release(product_id, size, line.quantity).await?;
            cart_changed(ctx);
        }
        Ok(self.view(ctx))
    }

    /// Empty the cart at the shopper's request, releasing every line.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures. Lines released before the failure are
    /// already gone from `ctx`, so the caller should still save it.
    #[instrument(skip(self, ctx))]
    pub async fn clear(&self, ctx: &mut CheckoutContext) -> Result<CartView, CartError> {
        let lines = ctx.cart.lines().to_vec();
        for line in &lines {
            self.stock
                .release(line.product_id, line.size, line.quantity)
                .await?;
            ctx.cart.remove(line.product_id, line.size);
            cart_changed(ctx);
        }
        Ok(self.view(ctx))
    }
}

/// A pending intent no longer matches the cart; a finished checkout starts over.
fn cart_changed(ctx: &mut CheckoutContext) {
    ctx.abandon_pending_intent();
    if matches!(ctx.state, CheckoutState::Completed { .. }) {
        ctx.state = CheckoutState::AwaitingProfile;
    }
}
