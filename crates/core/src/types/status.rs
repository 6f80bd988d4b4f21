//! Status enums for synchronized state.

use serde::{Deserialize, Serialize};

/// Relationship between the local cart and the remote cart service.
///
/// - `Unsynced`: the cart has never been acknowledged by the server (or the
///   user is anonymous).
/// - `Synced`: the last successful remote acknowledgment fully replaced the
///   local state.
/// - `Diverged`: at least one mutation since the last `Synced` point did not
///   reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Unsynced,
    Synced,
    Diverged,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsynced => write!(f, "unsynced"),
            Self::Synced => write!(f, "synced"),
            Self::Diverged => write!(f, "diverged"),
        }
    }
}

impl std::str::FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsynced" => Ok(Self::Unsynced),
            "synced" => Ok(Self::Synced),
            "diverged" => Ok(Self::Diverged),
            _ => Err(format!("invalid sync state: {s}")),
        }
    }
}
