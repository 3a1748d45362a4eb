//! Cart line items and the product snapshots they are built from.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::{LineItemId, ProductId};
use super::price::Price;
use super::quantity::Quantity;

/// Product snapshot handed to the engine by the catalog UI.
///
/// The engine never looks products up on its own; whatever the caller passes
/// is copied into the line item (and into the guest cart on disk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One product-and-quantity entry within a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Set only once the item exists in the remote cart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_item_id: Option<LineItemId>,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub quantity: Quantity,
}

impl LineItem {
    /// Build an unpersisted (guest) line item from a product snapshot.
    #[must_use]
    pub fn guest(product: &Product, quantity: Quantity) -> Self {
        Self {
            line_item_id: None,
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.unit_price,
            photo_ref: product.photo_ref.clone(),
            category: product.category.clone(),
            quantity,
        }
    }

    /// Whether this item has been persisted remotely.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.line_item_id.is_some()
    }

    /// Does `item` address this line?
    #[must_use]
    pub fn matches(&self, item: &ItemRef) -> bool {
        match item {
            ItemRef::LineItem(id) => self.line_item_id == Some(*id),
            ItemRef::Product(id) => self.product_id == *id,
        }
    }

    /// Product snapshot recovered from this line.
    #[must_use]
    pub fn product(&self) -> Product {
        Product {
            id: self.product_id,
            name: self.product_name.clone(),
            unit_price: self.unit_price,
            photo_ref: self.photo_ref.clone(),
            category: self.category.clone(),
        }
    }
}

/// Reference to a line in the current cart.
///
/// Remote carts address lines by [`LineItemId`]; guest carts have no line ids
/// and address lines by [`ProductId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRef {
    LineItem(LineItemId),
    Product(ProductId),
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineItem(id) => write!(f, "line:{id}"),
            Self::Product(id) => write!(f, "product:{id}"),
        }
    }
}

impl From<LineItemId> for ItemRef {
    fn from(id: LineItemId) -> Self {
        Self::LineItem(id)
    }
}

impl From<ProductId> for ItemRef {
    fn from(id: ProductId) -> Self {
        Self::Product(id)
    }
}
