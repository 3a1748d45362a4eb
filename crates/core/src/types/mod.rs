//! Core types for the cart sync engine.
//!
//! This module provides type-safe wrappers for cart domain concepts.

pub mod favorite;
pub mod id;
pub mod identity;
pub mod line_item;
pub mod price;
pub mod quantity;
pub mod totals;

pub use favorite::FavoriteEntry;
pub use id::*;
pub use identity::{Identity, Role, UnknownRole};
pub use line_item::{ItemRef, LineItem, Product};
pub use price::{CurrencyCode, Price, UnknownCurrency, format_amount};
pub use quantity::{Quantity, QuantityError};
pub use totals::CartTotals;
