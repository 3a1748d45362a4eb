//! Cart Sync Core - Shared types library.
//!
//! This crate provides the domain types used across the cart sync components:
//! - `cart-sync` - The guest/remote cart synchronization engine
//! - `cart-sync-cli` - The `cartctl` command-line driver
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no storage
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere, including browser builds.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, quantities, line items, favorites and
//!   derived cart totals

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
