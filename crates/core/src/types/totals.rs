//! Derived cart aggregates.

use rust_decimal::Decimal;
use serde::Serialize;

use super::line_item::LineItem;
use super::price::{CurrencyCode, format_amount};

/// Item count and subtotal of a cart.
///
/// Always computed from the line items; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct CartTotals {
    /// Σ quantity.
    pub item_count: u64,
    /// Σ (unit price × quantity).
    pub subtotal: Decimal,
}

impl CartTotals {
    /// Fold a collection of line items.
    ///
    /// A subtotal too large for a `Decimal` saturates at `Decimal::MAX`.
    #[must_use]
    pub fn from_items(items: &[LineItem]) -> Self {
        items.iter().fold(Self::default(), |acc, item| Self {
            item_count: acc.item_count.saturating_add(u64::from(item.quantity.get())),
            subtotal: item
                .unit_price
                .times(item.quantity)
                .and_then(|line| acc.subtotal.checked_add(line))
                .unwrap_or(Decimal::MAX),
        })
    }

    /// Subtotal formatted for display.
    #[must_use]
    pub fn subtotal_display(&self, currency_code: CurrencyCode) -> String {
        format_amount(self.subtotal, currency_code)
    }
}
