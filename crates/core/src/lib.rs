//! Cartsync Core - Shared types library.
//!
//! This crate provides the types shared by the cartsync components:
//! - `cartsync` - The cart synchronization engine and wishlist store
//! - `cartsync-cli` - Command-line front end for the engine
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no persistence, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, the denormalized product record, and sync states

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
