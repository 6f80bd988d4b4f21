//! Two-phase mutation records and the signals emitted when they resolve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartsync_core::{ProductId, RemoteLineId};

use crate::cart::Cart;
use crate::remote::SyncFailureReason;

/// What a mutation (or fetch) was trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOperation {
    Add,
    SetQuantity,
    Remove,
    Clear,
    Fetch,
}

impl std::fmt::Display for CartOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::SetQuantity => write!(f, "set_quantity"),
            Self::Remove => write!(f, "remove"),
            Self::Clear => write!(f, "clear"),
            Self::Fetch => write!(f, "fetch"),
        }
    }
}

/// The remote call a mutation still owes the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    AddLine {
        product_id: ProductId,
        quantity: u32,
    },
    SetLineQuantity {
        line_id: RemoteLineId,
        quantity: u32,
    },
    RemoveLine {
        line_id: RemoteLineId,
    },
    Clear,
}

/// A mutation whose optimistic phase has been applied.
///
/// The remote phase runs when the record is passed to
/// [`super::CartEngine::complete`], or is settled with a caller-supplied
/// outcome through [`super::CartEngine::resolve`].
#[derive(Debug, Clone)]
#[must_use = "the remote phase only runs when the mutation is completed"]
pub struct PendingMutation {
    pub(crate) seq: u64,
    pub(crate) operation: CartOperation,
    pub(crate) product_id: Option<ProductId>,
    pub(crate) optimistic: Cart,
    pub(crate) remote: Option<RemoteRequest>,
}

impl PendingMutation {
    /// Sequence number of the optimistic state this mutation produced.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Operation performed.
    #[must_use]
    pub const fn operation(&self) -> CartOperation {
        self.operation
    }

    /// Product the mutation addressed, if any.
    #[must_use]
    pub const fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    /// Cart immediately after the optimistic phase.
    #[must_use]
    pub const fn optimistic(&self) -> &Cart {
        &self.optimistic
    }

    /// Remote call still owed, or `None` if the mutation is local-only.
    #[must_use]
    pub const fn remote(&self) -> Option<&RemoteRequest> {
        self.remote.as_ref()
    }
}

/// How a remote phase (or fetch) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No remote call was made.
    LocalOnly,
    /// The server snapshot replaced the local cart.
    Reconciled,
    /// The server answered, but a newer optimistic state exists; discarded.
    Stale,
    /// The remote call failed; local state was kept.
    Diverged,
    /// The remote call failed and the divergence limit forced a re-fetch
    /// that replaced the local cart.
    Refetched,
}

/// Non-fatal notice that a remote phase failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWarning {
    /// Operation whose remote phase failed.
    pub operation: CartOperation,
    /// Product addressed by the operation, if any.
    pub product_id: Option<ProductId>,
    /// Classified failure.
    pub reason: SyncFailureReason,
    /// Error detail for logs.
    pub message: String,
    /// Sequence number of the mutation.
    pub seq: u64,
    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}
