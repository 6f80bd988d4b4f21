//! Cart commands.
//!
//! Each invocation hydrates the engine from the file store, fetches the
//! remote cart when an identity is configured, runs one mutation through both
//! phases, and prints the resulting cart.

use std::sync::Arc;

use cartsync::{
    CartEngine, CartSyncConfig, EngineOptions, FileStore, HttpCartClient, IdentityBridge,
    SyncOutcome, SyncWarning,
};
use cartsync_core::{Product, ProductId};
use tokio::sync::broadcast;

use super::{CommandError, Output};

type Engine = CartEngine<HttpCartClient, Arc<FileStore>>;

/// A started engine plus the channels that outlive a single command.
pub struct CartSession {
    engine: Engine,
    warnings: broadcast::Receiver<SyncWarning>,
    start_outcome: SyncOutcome,
    _identity: IdentityBridge,
}

impl CartSession {
    /// Build and start an engine from configuration.
    pub async fn open(config: &CartSyncConfig, store: Arc<FileStore>) -> Self {
        let identity = IdentityBridge::new(config.identity.clone());
        let client = HttpCartClient::new(&config.api_url, identity.subscribe());
        let engine = CartEngine::new(
            client,
            store,
            identity.subscribe(),
            EngineOptions::from(config),
        );

        let warnings = engine.warnings();
        let start_outcome = engine.start().await;
        tracing::debug!(?start_outcome, signed_in = identity.is_present(), "Cart session started");

        Self {
            engine,
            warnings,
            start_outcome,
            _identity: identity,
        }
    }

    /// Log every warning emitted during the session.
    pub fn finish(mut self) {
        loop {
            match self.warnings.try_recv() {
                Ok(warning) => tracing::warn!(
                    operation = %warning.operation,
                    product_id = ?warning.product_id,
                    reason = %warning.reason,
                    "Cart change not saved to server: {}",
                    warning.message
                ),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped sync warnings");
                }
                Err(_) => break,
            }
        }
    }
}

/// Print the cart as hydrated (and fetched, when signed in).
pub fn show(session: &CartSession, output: Output) -> Result<(), CommandError> {
    output.cart(&session.engine.cart(), Some(session.start_outcome))
}

/// Add `quantity` units of a product.
pub async fn add(
    session: &CartSession,
    product: Product,
    quantity: u32,
    output: Output,
) -> Result<(), CommandError> {
    tracing::info!(product_id = %product.id, quantity, "Adding to cart");
    let outcome = session.engine.add_item(product, quantity).await?;
    output.cart(&session.engine.cart(), Some(outcome))
}

/// Set a product's quantity.
pub async fn set(
    session: &CartSession,
    product_id: i32,
    quantity: u32,
    output: Output,
) -> Result<(), CommandError> {
    let product_id = ProductId::new(product_id);
    warn_if_absent(session, product_id);
    let outcome = session
        .engine
        .update_quantity(product_id, quantity)
        .await?;
    output.cart(&session.engine.cart(), Some(outcome))
}

/// Remove a product.
pub async fn remove(
    session: &CartSession,
    product_id: i32,
    output: Output,
) -> Result<(), CommandError> {
    let product_id = ProductId::new(product_id);
    warn_if_absent(session, product_id);
    let outcome = session.engine.remove_item(product_id).await?;
    output.cart(&session.engine.cart(), Some(outcome))
}

/// Remove every product.
pub async fn clear(session: &CartSession, output: Output) -> Result<(), CommandError> {
    let outcome = session.engine.clear_cart().await?;
    output.cart(&session.engine.cart(), Some(outcome))
}

/// Re-fetch the remote cart.
pub async fn refresh(session: &CartSession, output: Output) -> Result<(), CommandError> {
    if !session.engine.is_identified() {
        tracing::info!("Not signed in; set CARTSYNC_USER_ID and CARTSYNC_ACCESS_TOKEN to sync");
    }
    let outcome = session.engine.refresh().await;
    output.cart(&session.engine.cart(), Some(outcome))
}

fn warn_if_absent(session: &CartSession, product_id: ProductId) {
    if !session.engine.cart().contains(product_id) {
        tracing::warn!(%product_id, "Product is not in the cart");
    }
}
