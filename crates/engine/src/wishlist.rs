//! Local-only wishlist.
//!
//! A set of products keyed by product ID, kept in insertion order and
//! mirrored to the Local Store on every change. There is no remote authority
//! and no sync state.

use tokio::sync::watch;
use tracing::debug;

use cartsync_core::{Product, ProductId};

use crate::store::{KeyValueStore, Persisted};

/// Default storage key for the wishlist.
pub const WISHLIST_STORAGE_KEY: &str = "wishlist";

/// The shopper's wishlist.
pub struct Wishlist<S> {
    entries: watch::Sender<Vec<Product>>,
    store: Persisted<Vec<Product>, S>,
}

impl<S: KeyValueStore> Wishlist<S> {
    /// Load the wishlist stored under `key`, dropping duplicate entries.
    pub fn new(store: S, key: impl Into<String>) -> Self {
        let store: Persisted<Vec<Product>, S> = Persisted::new(store, key);
        let mut entries: Vec<Product> = Vec::new();
        for product in store.load() {
            if product.id.is_assigned() && !entries.iter().any(|p| p.id == product.id) {
                entries.push(product);
            }
        }
        debug!(key = store.key(), entries = entries.len(), "Loaded wishlist");

        let (entries, _) = watch::channel(entries);
        Self { entries, store }
    }

    /// Add a product. Returns `false` if it was already present or has no ID.
    pub fn add(&self, product: Product) -> bool {
        if !product.id.is_assigned() {
            return false;
        }
        self.modify(|entries| {
            if entries.iter().any(|p| p.id == product.id) {
                return false;
            }
            entries.push(product);
            true
        })
    }

    /// Remove a product. Returns `false` if it was not present.
    pub fn remove(&self, product_id: ProductId) -> bool {
        self.modify(|entries| {
            let before = entries.len();
            entries.retain(|p| p.id != product_id);
            entries.len() != before
        })
    }

    /// Add the product if absent, remove it if present.
    ///
    /// Returns whether the product is in the wishlist afterwards.
    pub fn toggle(&self, product: Product) -> bool {
        if !product.id.is_assigned() {
            return false;
        }
        let mut present = false;
        self.modify(|entries| {
            match entries.iter().position(|p| p.id == product.id) {
                Some(index) => {
                    entries.remove(index);
                }
                None => {
                    entries.push(product);
                    present = true;
                }
            }
            true
        });
        present
    }

    /// Remove every product.
    pub fn clear(&self) {
        self.modify(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            changed
        });
    }

    /// Whether a product is in the wishlist.
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.entries.borrow().iter().any(|p| p.id == product_id)
    }

    /// Number of products.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Snapshot of all products in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Product> {
        self.entries.borrow().clone()
    }

    /// Receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Product>> {
        self.entries.subscribe()
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<Product>) -> bool) -> bool {
        let changed = self.entries.send_if_modified(f);
        if changed {
            self.store.save(&self.entries.borrow());
        }
        changed
    }
}
