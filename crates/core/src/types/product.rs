//! Denormalized product record.
//!
//! Captured at add-time for display in carts and wishlists. Prices here are
//! not authoritative; the remote cart service owns pricing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CategoryId, ProductId};

/// A product as shown in a cart line or wishlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: Option<String>,
    /// Selling price per unit at capture time.
    pub sell_price: Decimal,
    /// Primary image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Catalog category.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Units in stock at capture time.
    #[serde(default)]
    pub stock: Option<i64>,
}

impl Product {
    /// Create a product snapshot with only the required fields set.
    #[must_use]
    pub fn new(id: ProductId, name: impl Into<String>, sell_price: Decimal) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            sell_price,
            image: None,
            category_id: None,
            stock: None,
        }
    }
}
