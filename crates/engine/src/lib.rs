//! Cartsync - client-side cart and wishlist synchronization.
//!
//! Keeps a shopper's in-progress cart consistent across an in-memory view, a
//! durable local store, and an authoritative remote cart service, while the
//! shopper may be anonymous, offline, or seeing partial network failures.
//!
//! # Architecture
//!
//! - [`engine::CartEngine`] owns the in-memory cart, applies optimistic
//!   mutations, and reconciles with the remote service by wholesale replace.
//! - [`store`] mirrors every change to a best-effort key-value store.
//! - [`wishlist::Wishlist`] is the local-only sibling store.
//! - [`identity::IdentityBridge`] carries login/logout transitions.
//! - [`remote`] defines the remote contract and its HTTP implementation.
//!
//! Local state always wins availability: no failure in this crate is fatal,
//! every fault degrades to "keep showing the shopper their local cart".

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod remote;
pub mod store;
pub mod wishlist;

pub use cart::{Cart, CartLine};
pub use config::{CartSyncConfig, ConfigError, LogFormat};
pub use engine::{
    CartEngine, CartOperation, EngineOptions, EngineStatus, PendingMutation, RemoteRequest,
    SyncOutcome, SyncWarning,
};
pub use error::{CartError, Result};
pub use identity::{Identity, IdentityBridge};
pub use remote::{CartSnapshot, HttpCartClient, RemoteCart, RemoteError, SyncFailureReason};
pub use store::{FileStore, KeyValueStore, MemoryStore, Persisted, StoreError};
pub use wishlist::Wishlist;
