//! Wire types for the REST cart service and their conversion to domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use cartsync_core::{CategoryId, Product, ProductId, RemoteLineId};

use crate::cart::CartLine;

use super::CartSnapshot;

/// Body of every cart response: `{ items, count }`.
#[derive(Debug, Deserialize)]
pub struct CartPayload {
    #[serde(default)]
    pub items: Vec<CartItemPayload>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// One joined cart-item/product row.
#[derive(Debug, Deserialize)]
pub struct CartItemPayload {
    #[serde(rename = "cartItemId", deserialize_with = "string_or_number")]
    pub cart_item_id: String,
    pub product_id: ProductId,
    pub qty: i64,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sell_price: Option<Decimal>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub images: Option<serde_json::Value>,
}

/// Body of `POST /api/cart/add`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `PUT /api/cart/item/{id}`.
#[derive(Debug, Serialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl CartPayload {
    pub fn into_snapshot(self) -> CartSnapshot {
        if let Some(count) = self.count
            && usize::try_from(count).ok() != Some(self.items.len())
        {
            warn!(
                count,
                items = self.items.len(),
                "Cart response count does not match item list"
            );
        }

        CartSnapshot {
            lines: self
                .items
                .into_iter()
                .filter_map(CartItemPayload::into_line)
                .collect(),
        }
    }
}

impl CartItemPayload {
    fn into_line(self) -> Option<CartLine> {
        let Ok(quantity) = u32::try_from(self.qty) else {
            warn!(
                cart_item_id = %self.cart_item_id,
                qty = self.qty,
                "Dropping cart line with invalid quantity"
            );
            return None;
        };

        let sell_price = self.sell_price.or(self.unit_price).unwrap_or_default();
        let unit_price = self.unit_price.unwrap_or(sell_price);

        Some(CartLine {
            product_id: self.product_id,
            remote_line_id: Some(RemoteLineId::new(self.cart_item_id)),
            quantity,
            unit_price,
            product: Product {
                id: self.product_id,
                name: self.name.unwrap_or_default(),
                description: self.description,
                sell_price,
                image: self.images.as_ref().and_then(first_image),
                category_id: self.category_id,
                stock: self.stock,
            },
        })
    }
}

/// The backend stores images as a URL, a JSON array of URLs, or a JSON
/// string containing either.
fn first_image(images: &serde_json::Value) -> Option<String> {
    match images {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                serde_json::from_str::<serde_json::Value>(trimmed)
                    .ok()
                    .as_ref()
                    .and_then(first_image)
            } else if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        serde_json::Value::Array(items) => items.iter().find_map(first_image),
        _ => None,
    }
}

/// Line IDs are numeric keys in the backend but opaque to the client.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}
