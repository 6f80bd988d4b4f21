//! Wishlist commands. The wishlist is local only.

use std::sync::Arc;

use cartsync::wishlist::WISHLIST_STORAGE_KEY;
use cartsync::{FileStore, Wishlist};
use cartsync_core::{Product, ProductId};

use super::{CommandError, Output};

type FileWishlist = Wishlist<Arc<FileStore>>;

/// Load the wishlist from the file store.
pub fn open(store: Arc<FileStore>) -> FileWishlist {
    Wishlist::new(store, WISHLIST_STORAGE_KEY)
}

/// Print the wishlist.
pub fn show(wishlist: &FileWishlist, output: Output) -> Result<(), CommandError> {
    output.wishlist(&wishlist.entries())
}

/// Add a product.
pub fn add(wishlist: &FileWishlist, product: Product, output: Output) -> Result<(), CommandError> {
    let product_id = product.id;
    if !wishlist.add(product) {
        tracing::info!(%product_id, "Already in wishlist");
    }
    output.wishlist(&wishlist.entries())
}

/// Remove a product.
pub fn remove(wishlist: &FileWishlist, product_id: i32, output: Output) -> Result<(), CommandError> {
    let product_id = ProductId::new(product_id);
    if !wishlist.remove(product_id) {
        tracing::info!(%product_id, "Not in wishlist");
    }
    output.wishlist(&wishlist.entries())
}

/// Add the product if absent, remove it if present.
pub fn toggle(
    wishlist: &FileWishlist,
    product: Product,
    output: Output,
) -> Result<(), CommandError> {
    let product_id = product.id;
    let present = wishlist.toggle(product);
    tracing::info!(%product_id, present, "Toggled wishlist entry");
    output.wishlist(&wishlist.entries())
}

/// Remove every product.
pub fn clear(wishlist: &FileWishlist, output: Output) -> Result<(), CommandError> {
    wishlist.clear();
    output.wishlist(&wishlist.entries())
}
