//! Remote cart service contract and its HTTP implementation.
//!
//! # Architecture
//!
//! - The remote service is the pricing and inventory authority, but the
//!   engine treats it as eventually consistent: it is called after the local
//!   cart has already changed.
//! - Every mutation returns the full resulting cart, never a delta, which is
//!   what makes wholesale-replace reconciliation valid.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartsync::remote::{HttpCartClient, RemoteCart};
//!
//! let client = HttpCartClient::new(&config.api_url, bridge.subscribe());
//! let snapshot = client.add_line(ProductId::new(7), 2).await?;
//! ```

mod http;
mod wire;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cartsync_core::{ProductId, RemoteLineId};

use crate::cart::CartLine;

pub use http::HttpCartClient;

/// Full cart returned by the remote service.
///
/// Every line carries a server-assigned `remote_line_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// All lines in the server cart.
    pub lines: Vec<CartLine>,
}

/// The five request contracts of the remote cart service.
///
/// Implementations must be cheap to share; the engine calls them from
/// concurrently pending mutations.
pub trait RemoteCart: Send + Sync {
    /// Get the current cart.
    fn fetch_cart(&self) -> impl Future<Output = Result<CartSnapshot, RemoteError>> + Send;

    /// Add `quantity` units of a product, merging server-side.
    fn add_line(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, RemoteError>> + Send;

    /// Set the quantity of an acknowledged line.
    fn set_line_quantity(
        &self,
        line_id: &RemoteLineId,
        quantity: u32,
    ) -> impl Future<Output = Result<CartSnapshot, RemoteError>> + Send;

    /// Remove an acknowledged line.
    fn remove_line(
        &self,
        line_id: &RemoteLineId,
    ) -> impl Future<Output = Result<CartSnapshot, RemoteError>> + Send;

    /// Remove every line.
    fn clear_cart(&self) -> impl Future<Output = Result<CartSnapshot, RemoteError>> + Send;
}

/// Errors that can occur when talking to the remote cart service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No identity is present to authenticate the request.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The service rejected the credentials.
    #[error("Unauthorized")]
    Unauthorized,

    /// The service returned a non-success status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, if any.
        message: String,
    },

    /// Response body was not a cart.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RemoteError {
    /// Classify the error for warning consumers.
    #[must_use]
    pub const fn reason(&self) -> SyncFailureReason {
        match self {
            Self::Http(_) => SyncFailureReason::Network,
            Self::NotAuthenticated | Self::Unauthorized => SyncFailureReason::Unauthorized,
            Self::Status { status, .. } if *status >= 500 => {
                SyncFailureReason::Server { status: *status }
            }
            Self::Status { status, .. } => SyncFailureReason::Rejected { status: *status },
            Self::Parse(_) => SyncFailureReason::Malformed,
        }
    }
}

/// Why a remote phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SyncFailureReason {
    /// Connection, DNS, TLS or timeout failure.
    Network,
    /// Missing or rejected credentials.
    Unauthorized,
    /// The service refused the request (4xx).
    Rejected { status: u16 },
    /// The service failed (5xx).
    Server { status: u16 },
    /// The response could not be understood.
    Malformed,
}

impl SyncFailureReason {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Unauthorized => "unauthorized",
            Self::Rejected { .. } => "rejected",
            Self::Server { .. } => "server_error",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for SyncFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { status } | Self::Server { status } => {
                write!(f, "{} ({status})", self.code())
            }
            _ => f.write_str(self.code()),
        }
    }
}
