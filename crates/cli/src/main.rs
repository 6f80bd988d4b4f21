//! Cartsync CLI - drive the cart engine against a live cart service.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart (fetches the remote cart when signed in)
//! cartsync cart show
//!
//! # Add two units of product 7
//! cartsync cart add 7 --name "Mango" --price 10.50 --quantity 2
//!
//! # Change quantity, remove, clear
//! cartsync cart set 7 5
//! cartsync cart remove 7
//! cartsync cart clear
//!
//! # Wishlist (local only)
//! cartsync wishlist toggle 7 --name "Mango" --price 10.50
//! cartsync wishlist show --json
//! ```
//!
//! # Commands
//!
//! - `cart` - Show and change the cart
//! - `wishlist` - Show and change the wishlist
//!
//! Configuration is read from the environment; see `cartsync::config`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use cartsync::{CartSyncConfig, FileStore, LogFormat};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cartsync")]
#[command(author, version, about = "Cart and wishlist sync tools")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show and change the wishlist
    Wishlist {
        #[command(subcommand)]
        action: WishlistAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart
    Show,
    /// Add a product
    Add {
        #[command(flatten)]
        product: ProductArgs,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a product's quantity (0 removes it)
    Set {
        /// Product ID
        product_id: i32,

        /// New quantity
        quantity: u32,
    },
    /// Remove a product
    Remove {
        /// Product ID
        product_id: i32,
    },
    /// Remove every product
    Clear,
    /// Re-fetch the remote cart
    Refresh,
}

#[derive(Subcommand)]
enum WishlistAction {
    /// Print the wishlist
    Show,
    /// Add a product
    Add {
        #[command(flatten)]
        product: ProductArgs,
    },
    /// Remove a product
    Remove {
        /// Product ID
        product_id: i32,
    },
    /// Add the product if absent, remove it if present
    Toggle {
        #[command(flatten)]
        product: ProductArgs,
    },
    /// Remove every product
    Clear,
}

/// Product fields captured when adding to the cart or wishlist.
#[derive(Args)]
struct ProductArgs {
    /// Product ID
    product_id: i32,

    /// Display name
    #[arg(short, long)]
    name: String,

    /// Unit price
    #[arg(short, long)]
    price: Decimal,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartSyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Errors and warnings become Sentry events; info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cartsync=info,cartsync_cli=info".into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CartSyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_writer(std::io::stderr).init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let result: Result<(), Box<dyn std::error::Error>> = run(cli, config).await;

    if let Err(e) = &result {
        tracing::error!("Command failed: {e}");
    }
    drop(sentry_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: CartSyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(FileStore::new(config.store_dir.clone()));
    let output = commands::Output::new(cli.json);

    match cli.command {
        Commands::Cart { action } => {
            let session = commands::cart::CartSession::open(&config, store).await;
            match action {
                CartAction::Show => commands::cart::show(&session, output)?,
                CartAction::Add { product, quantity } => {
                    commands::cart::add(&session, product.into_product(), quantity, output)
                        .await?;
                }
                CartAction::Set {
                    product_id,
                    quantity,
                } => commands::cart::set(&session, product_id, quantity, output).await?,
                CartAction::Remove { product_id } => {
                    commands::cart::remove(&session, product_id, output).await?;
                }
                CartAction::Clear => commands::cart::clear(&session, output).await?,
                CartAction::Refresh => commands::cart::refresh(&session, output).await?,
            }
            session.finish();
        }
        Commands::Wishlist { action } => {
            let wishlist = commands::wishlist::open(store);
            match action {
                WishlistAction::Show => commands::wishlist::show(&wishlist, output)?,
                WishlistAction::Add { product } => {
                    commands::wishlist::add(&wishlist, product.into_product(), output)?;
                }
                WishlistAction::Remove { product_id } => {
                    commands::wishlist::remove(&wishlist, product_id, output)?;
                }
                WishlistAction::Toggle { product } => {
                    commands::wishlist::toggle(&wishlist, product.into_product(), output)?;
                }
                WishlistAction::Clear => commands::wishlist::clear(&wishlist, output)?,
            }
        }
    }
    Ok(())
}

impl ProductArgs {
    fn into_product(self) -> cartsync_core::Product {
        cartsync_core::Product::new(
            cartsync_core::ProductId::new(self.product_id),
            self.name,
            self.price,
        )
    }
}
