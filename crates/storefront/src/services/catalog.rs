//! Cached catalog reads.
//!
//! The catalog is immutable after seeding, so reads are cached in-process
//! for 5 minutes.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::instrument;

use sole_core::ProductId;

use crate::db::{CatalogStore, RepositoryError};
use crate::models::{NewProduct, Product};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    All,
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    All(Arc<Vec<Product>>),
    Product(Box<Product>),
}

/// Read access to the catalog.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    /// Wrap a catalog store with a 5 minute read cache.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self { store, cache }
    }

    /// Every product, by id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Arc<Vec<Product>>, RepositoryError> {
        if let Some(CacheValue::All(products)) = self.cache.get(&CacheKey::All).await {
            return Ok(products);
        }

        let products = Arc::new(self.store.list_products().await?);
        self.cache
            .insert(CacheKey::All, CacheValue::All(Arc::clone(&products)))
            .await;
        Ok(products)
    }

    /// A single product. Misses are not cached.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            return Ok(Some(*product));
        }

        let product = self.store.get_product(id).await?;
        if let Some(product) = &product {
            self.cache
                .insert(key, CacheValue::Product(Box::new(product.clone())))
                .await;
        }
        Ok(product)
    }

    /// Seed the catalog if it is empty and drop cached reads.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn seed_if_empty(&self, products: &[NewProduct]) -> Result<usize, RepositoryError> {
        let inserted = self.store.seed_if_empty(products).await?;
        if inserted > 0 {
            self.cache.invalidate_all();
        }
        Ok(inserted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{MemoryCatalog, seed};

    #[tokio::test]
    async fn test_seed_then_read() {
        let catalog = CatalogService::new(Arc::new(MemoryCatalog::new()));
        assert!(catalog.list().await.unwrap().is_empty());

        assert_eq!(catalog.seed_if_empty(&seed::catalog()).await.unwrap(), 6);
        assert_eq!(catalog.seed_if_empty(&seed::catalog()).await.unwrap(), 0);

        let products = catalog.list().await.unwrap();
        assert_eq!(products.len(), 6);

        let first = catalog.get(products[0].id).await.unwrap().unwrap();
        assert_eq!(first.name, "Nike Air Max 90");
        assert!(catalog.get(ProductId::new(999)).await.unwrap().is_none());
    }
}
