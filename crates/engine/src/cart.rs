//! Cart data model and pure mutation functions.
//!
//! Nothing here performs I/O. The engine calls these functions inside its
//! state channel, so each one must leave the cart satisfying:
//! - at most one line per product ID,
//! - every line has a quantity of at least 1.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cartsync_core::{Product, ProductId, RemoteLineId, SyncState};

use crate::remote::CartSnapshot;

/// One product's presence in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Catalog key, the line identity while unsynced.
    pub product_id: ProductId,
    /// Server-assigned line ID, present once the server acknowledged the line.
    #[serde(default)]
    pub remote_line_id: Option<RemoteLineId>,
    /// Units of the product, always at least 1.
    pub quantity: u32,
    /// Unit price captured when the line was added.
    pub unit_price: Decimal,
    /// Display fields captured when the line was added.
    pub product: Product,
}

impl CartLine {
    /// Create an unsynced line for a product at its current selling price.
    #[must_use]
    pub fn new(product: Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            remote_line_id: None,
            quantity,
            unit_price: product.sell_price,
            product,
        }
    }

    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The shopper's cart.
///
/// Line order is insertion order and is for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    #[serde(default)]
    sync_state: SyncState,
    #[serde(default)]
    last_synced_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// Build a cart from lines, merging duplicate products and dropping
    /// zero-quantity lines.
    ///
    /// Used for anything that did not come from this module's own mutations:
    /// server snapshots and persisted state.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::default();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match cart.line_mut(line.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                    if existing.remote_line_id.is_none() {
                        existing.remote_line_id = line.remote_line_id;
                    }
                }
                None => cart.lines.push(line),
            }
        }
        cart
    }

    /// Re-establish invariants on a cart read from outside the engine.
    #[must_use]
    pub fn normalized(self) -> Self {
        let Self {
            lines,
            sync_state,
            last_synced_at,
        } = self;
        Self {
            sync_state,
            last_synced_at,
            ..Self::from_lines(lines)
        }
    }

    /// All lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// The line for a product, if any.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| line.product_id == product_id)
    }

    /// Whether the cart contains a product.
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.line(product_id).is_some()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of unit price times quantity over all lines.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Current sync state.
    #[must_use]
    pub const fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    /// When the server last replaced this cart.
    #[must_use]
    pub const fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub(crate) const fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }

    /// Add a product, merging into an existing line for the same product.
    pub(crate) fn add_product(&mut self, product: Product, quantity: u32) {
        match self.line_mut(product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine::new(product, quantity)),
        }
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// Returns `None` if the product is not in the cart, otherwise the
    /// line's server ID (which may itself be absent).
    pub(crate) fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Option<Option<RemoteLineId>> {
        if quantity == 0 {
            return self.remove(product_id).map(|line| line.remote_line_id);
        }
        let line = self.line_mut(product_id)?;
        line.quantity = quantity;
        Some(line.remote_line_id.clone())
    }

    /// Remove a product's line, returning it if present.
    pub(crate) fn remove(&mut self, product_id: ProductId) -> Option<CartLine> {
        let index = self
            .lines
            .iter()
            .position(|line| line.product_id == product_id)?;
        Some(self.lines.remove(index))
    }

    /// Remove every line.
    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    /// Replace all lines with a server snapshot and mark the cart synced.
    pub(crate) fn reconcile(&mut self, snapshot: CartSnapshot, now: DateTime<Utc>) {
        *self = Self {
            sync_state: SyncState::Synced,
            last_synced_at: Some(now),
            ..Self::from_lines(snapshot.lines)
        };
    }
}
