//! Caller-facing errors for cart mutations.
//!
//! Only validation and lifecycle errors reach the caller. Persistence faults
//! are swallowed by [`crate::store::Persisted`] and remote faults are reported
//! on the warning stream, never as errors.

use thiserror::Error;

use crate::engine::EngineStatus;

/// Errors returned synchronously by cart mutations, before any state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity on add must be at least 1.
    #[error("Invalid quantity: {0} (must be at least 1)")]
    InvalidQuantity(u32),

    /// Product has no catalog ID.
    #[error("Missing product ID")]
    MissingProductId,

    /// Engine has not finished hydrating.
    #[error("Cart engine not ready (status: {0})")]
    NotReady(EngineStatus),
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_display() {
        assert_eq!(
            CartError::InvalidQuantity(0).to_string(),
            "Invalid quantity: 0 (must be at least 1)"
        );
        assert_eq!(CartError::MissingProductId.to_string(), "Missing product ID");
        assert_eq!(
            CartError::NotReady(EngineStatus::Fetching).to_string(),
            "Cart engine not ready (status: fetching)"
        );
    }
}
