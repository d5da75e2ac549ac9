//! Initial catalog and review data.
//!
//! Applied through `seed_if_empty`, so running it against a populated
//! database is a no-op. Reviews refer to products by their position in
//! [`catalog`] (1-based), which matches the ids a fresh store assigns.

use rust_decimal::Decimal;

use sole_core::{Email, ProductId, ShoeSize};

use crate::models::{NewProduct, NewReview};

struct ProductSeed {
    name: &'static str,
    brand: &'static str,
    category: &'static str,
    description: &'static str,
    price: i64,
    original_price: Option<i64>,
    image: &'static str,
    /// Sizes in half-size steps (so 15 is size 7.5).
    half_sizes: &'static [i64],
    /// Rating in tenths.
    rating_tenths: i64,
    review_count: i32,
    is_new: bool,
    is_sale: bool,
}

const PRODUCTS: &[ProductSeed] = &[
    ProductSeed {
        name: "Nike Air Max 90",
        brand: "Nike",
        category: "Running",
        description: "Waffle sole, stitched overlays and Max Air cushioning on the original runner.",
        price: 120,
        original_price: None,
        image: "/nike_air_max_90.png",
        half_sizes: &[14, 15, 16, 17, 18, 19, 20, 21, 22, 24],
        rating_tenths: 48,
        review_count: 124,
        is_new: true,
        is_sale: false,
    },
    ProductSeed {
        name: "Adidas Ultraboost",
        brand: "Adidas",
        category: "Running",
        description: "Energy-return Boost midsole under a knit upper, built for distance.",
        price: 180,
        original_price: Some(220),
        image: "/adidas_ultraboost.png",
        half_sizes: &[14, 16, 18, 20, 22],
        rating_tenths: 47,
        review_count: 89,
        is_new: false,
        is_sale: true,
    },
    ProductSeed {
        name: "New Balance 550",
        brand: "New Balance",
        category: "Lifestyle",
        description: "A leather court silhouette from the 90s, back as an everyday sneaker.",
        price: 110,
        original_price: None,
        image: "/new_balance_550.png",
        half_sizes: &[12, 14, 16, 18, 20, 22, 24],
        rating_tenths: 49,
        review_count: 210,
        is_new: false,
        is_sale: false,
    },
    ProductSeed {
        name: "Nike Dunk Low",
        brand: "Nike",
        category: "Lifestyle",
        description: "Made for the hardwood, worn on the street, with crisp overlays and team colors.",
        price: 100,
        original_price: None,
        image: "/nike_dunk_low.png",
        half_sizes: &[14, 16, 18, 20, 22],
        rating_tenths: 46,
        review_count: 156,
        is_new: false,
        is_sale: false,
    },
    ProductSeed {
        name: "Adidas Yeezy Boost",
        brand: "Adidas",
        category: "Lifestyle",
        description: "Re-engineered primeknit upper over a full-length Boost sole.",
        price: 250,
        original_price: None,
        image: "/adidas_yeezy_boost.png",
        half_sizes: &[16, 18, 20, 22, 24],
        rating_tenths: 45,
        review_count: 50,
        is_new: true,
        is_sale: false,
    },
    ProductSeed {
        name: "New Balance 990v5",
        brand: "New Balance",
        category: "Running",
        description: "Suede and mesh over ENCAP cushioning, the fifth take on a thirty-year runner.",
        price: 175,
        original_price: None,
        image: "/new_balance_990v5.png",
        half_sizes: &[14, 16, 18, 20, 22],
        rating_tenths: 48,
        review_count: 300,
        is_new: false,
        is_sale: false,
    },
];

/// (product position, reviewer, email, rating, comment)
const REVIEWS: &[(i32, &str, &str, u8, &str)] = &[
    (1, "Alex M.", "alex@example.com", 5, "Fit perfectly out of the box. Good cushioning for an all-day shoe."),
    (1, "James K.", "james@example.com", 4, "Runs slightly narrow. Go half a size up with wide feet."),
    (2, "Sarah W.", "sarah@example.com", 5, "Most comfortable running shoe I've owned. Did a half marathon in these."),
    (2, "Emma T.", "emma@example.com", 4, "The knit upper picks up dirt easily, otherwise excellent."),
    (3, "Jordan F.", "jordan@example.com", 5, "Clean retro look and the leather quality is impressive for the price."),
    (3, "Aditya G.", "aditya@example.com", 4, "Took a week to break in, comfortable after that."),
    (4, "Tyler J.", "tyler@example.com", 5, "Soft leather and the fit is spot on."),
    (4, "Devon L.", "devon@example.com", 4, "Great for casual wear, less so for long walks."),
    (5, "Jason R.", "jason@example.com", 4, "Sizing is tricky, go half a size up."),
    (5, "Zoe M.", "zoe@example.com", 5, "Far more comfortable than they look."),
    (6, "Lakshmi V.", "lakshmi@example.com", 5, "The support is great for flat feet."),
    (6, "Amy T.", "amy@example.com", 4, "A bit heavy but the cushioning makes up for it."),
];

/// The initial catalog.
#[must_use]
pub fn catalog() -> Vec<NewProduct> {
    PRODUCTS
        .iter()
        .map(|p| NewProduct {
            name: p.name.to_owned(),
            brand: p.brand.to_owned(),
            category: p.category.to_owned(),
            description: p.description.to_owned(),
            price: Decimal::from(p.price),
            original_price: p.original_price.map(Decimal::from),
            image_url: p.image.to_owned(),
            images: vec![p.image.to_owned(); 3],
            sizes: p
                .half_sizes
                .iter()
                .filter_map(|&h| ShoeSize::new(Decimal::new(h * 5, 1)).ok())
                .collect(),
            rating: Decimal::new(p.rating_tenths, 1),
            review_count: p.review_count,
            is_new: p.is_new,
            is_sale: p.is_sale,
        })
        .collect()
}

/// The initial reviews.
#[must_use]
pub fn reviews() -> Vec<NewReview> {
    REVIEWS
        .iter()
        .filter_map(|&(product, name, email, rating, comment)| {
            Some(NewReview {
                product_id: ProductId::new(product),
                user_name: name.to_owned(),
                user_email: Email::parse(email).ok()?,
                rating,
                comment: comment.to_owned(),
            })
        })
        .collect()
}
