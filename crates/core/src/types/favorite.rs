//! Favorites (wishlist) entries.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::line_item::Product;

/// A favorited product.
///
/// Favorites have set semantics: at most one entry per [`ProductId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub product_id: ProductId,
    pub product: Product,
}

impl FavoriteEntry {
    /// Create an entry for a product snapshot.
    #[must_use]
    pub fn new(product: Product) -> Self {
        Self {
            product_id: product.id,
            product,
        }
    }
}

impl From<Product> for FavoriteEntry {
    fn from(product: Product) -> Self {
        Self::new(product)
    }
}
