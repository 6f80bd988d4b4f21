//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod product;
pub mod status;

pub use id::*;
pub use product::Product;
pub use status::*;
