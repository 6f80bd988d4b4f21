//! Command implementations and shared output helpers.

pub mod cart;
pub mod wishlist;

use cartsync::{Cart, CartError, SyncOutcome};
use cartsync_core::Product;
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The engine rejected the mutation.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Output could not be serialized.
    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where and how command results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
}

impl Output {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print a cart, with the outcome of the command that produced it.
    #[allow(clippy::print_stdout)]
    pub fn cart(self, cart: &Cart, outcome: Option<SyncOutcome>) -> Result<(), CommandError> {
        if self.json {
            let value = json!({
                "cart": cart,
                "total": cart.total(),
                "count": cart.count(),
                "outcome": outcome.map(|o| format!("{o:?}")),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        if cart.is_empty() {
            println!("Cart is empty");
        }
        for line in cart.lines() {
            println!(
                "  #{:<6} {:<30} x{:<4} @ {:>10} = {:>10}",
                line.product_id.as_i32(),
                line.product.name,
                line.quantity,
                line.unit_price,
                line.line_total()
            );
        }
        println!(
            "Items: {}  Total: {}  ({})",
            cart.count(),
            cart.total(),
            cart.sync_state()
        );
        if let Some(outcome) = outcome {
            println!("Sync: {}", describe(outcome));
        }
        Ok(())
    }

    /// Print wishlist entries.
    #[allow(clippy::print_stdout)]
    pub fn wishlist(self, entries: &[Product]) -> Result<(), CommandError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(entries)?);
            return Ok(());
        }

        if entries.is_empty() {
            println!("Wishlist is empty");
        }
        for product in entries {
            println!(
                "  #{:<6} {:<30} {:>10}",
                product.id.as_i32(),
                product.name,
                product.sell_price
            );
        }
        Ok(())
    }
}

const fn describe(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::LocalOnly => "local only",
        SyncOutcome::Reconciled => "saved to server",
        SyncOutcome::Stale => "superseded by a newer change",
        SyncOutcome::Diverged => "server unreachable, kept local changes",
        SyncOutcome::Refetched => "server cart reloaded after repeated failures",
    }
}
