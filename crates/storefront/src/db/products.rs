//! Catalog repository.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use sole_core::{ProductId, ShoeSize};

use super::{CatalogStore, RepositoryError};
use crate::models::{NewProduct, Product};

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    brand: String,
    category: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    image_url: String,
    images: Vec<String>,
    sizes: Vec<Decimal>,
    rating: Decimal,
    review_count: i32,
    is_new: bool,
    is_sale: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let sizes = row
            .sizes
            .into_iter()
            .map(ShoeSize::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("invalid size for product {}: {e}", row.id))
            })?;

        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            brand: row.brand,
            category: row.category,
            description: row.description,
            price: row.price,
            original_price: row.original_price,
            image_url: row.image_url,
            images: row.images,
            sizes,
            rating: row.rating,
            review_count: row.review_count,
            is_new: row.is_new,
            is_sale: row.is_sale,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, brand, category, description, price, original_price, \
     image_url, images, sizes, rating, review_count, is_new, is_sale";

/// `PostgreSQL`-backed [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a new catalog store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn seed_if_empty(&self, products: &[NewProduct]) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent seeders; readers are not blocked.
        sqlx::query("LOCK TABLE storefront.product IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let populated: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM storefront.product)")
                .fetch_one(&mut *tx)
                .await?;
        if populated {
            return Ok(0);
        }

        for product in products {
            let sizes: Vec<Decimal> = product.sizes.iter().map(ShoeSize::value).collect();
            sqlx::query(
                r"
                INSERT INTO storefront.product
                    (name, brand, category, description, price, original_price,
                     image_url, images, sizes, rating, review_count, is_new, is_sale)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ",
            )
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.category)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.original_price)
            .bind(&product.image_url)
            .bind(&product.images)
            .bind(sizes)
            .bind(product.rating)
            .bind(product.review_count)
            .bind(product.is_new)
            .bind(product.is_sale)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = products.len(), "Seeded catalog");
        Ok(products.len())
    }
}
