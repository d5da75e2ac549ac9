//! Catalog product types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sole_core::{ProductId, ShoeSize};

/// A catalog product.
///
/// Immutable once seeded. Carts and orders snapshot the name and price they
/// need instead of referring back here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(
        with = "rust_decimal::serde::float_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_price: Option<Decimal>,
    pub image_url: String,
    pub images: Vec<String>,
    /// Available sizes, ascending.
    pub sizes: Vec<ShoeSize>,
    #[serde(with = "rust_decimal::serde::float")]
    pub rating: Decimal,
    pub review_count: i32,
    pub is_new: bool,
    pub is_sale: bool,
}

impl Product {
    /// Whether `size` is one of the sizes this product comes in.
    #[must_use]
    pub fn offers_size(&self, size: ShoeSize) -> bool {
        self.sizes.contains(&size)
    }
}

/// A product to insert into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub original_price: Option<Decimal>,
    pub image_url: String,
    pub images: Vec<String>,
    pub sizes: Vec<ShoeSize>,
    #[serde(with = "rust_decimal::serde::float")]
    pub rating: Decimal,
    pub review_count: i32,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_sale: bool,
}

impl NewProduct {
    /// Attach a store-assigned id.
    #[must_use]
    pub fn with_id(self, id: ProductId) -> Product {
        let mut sizes = self.sizes;
        sizes.sort_unstable();
        sizes.dedup();

        Product {
            id,
            name: self.name,
            brand: self.brand,
            category: self.category,
            description: self.description,
            price: self.price,
            original_price: self.original_price,
            image_url: self.image_url,
            images: self.images,
            sizes,
            rating: self.rating,
            review_count: self.review_count,
            is_new: self.is_new,
            is_sale: self.is_sale,
        }
    }
}
