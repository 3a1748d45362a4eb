//! Remote cart and favorites collaborators.
//!
//! # Architecture
//!
//! - The server is the source of truth for a signed-in user's cart; the engine
//!   never patches remote state locally, it refetches after each change
//! - [`RemoteCartService`] and [`FavoritesService`] are the seams; the engines
//!   only ever hold `Arc<dyn ...>`
//! - [`HttpCartClient`] talks to the REST API with `reqwest`
//! - [`InMemoryCartService`] keeps everything in process, records every call
//!   and can be told to fail; tests and `cartctl --offline` use it
//!
//! # Semantics
//!
//! - `create_line_item` is idempotent by product: if the user already has a
//!   line for the product, its quantity is set instead of adding a second line
//! - `update_line_item` is never sent a quantity below 1; removals go through
//!   `delete_line_item`
//! - deleting a line that does not exist succeeds

mod http;
mod memory;
mod types;

pub use http::HttpCartClient;
pub use memory::{CallKind, InMemoryCartService, RemoteCall};
pub use types::{FavoriteDto, LineItemDto};

use async_trait::async_trait;
use thiserror::Error;

use cart_sync_core::{FavoriteEntry, LineItem, LineItemId, Product, ProductId, Quantity, UserId};

/// Errors that can occur when talking to a remote collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// First part of the response body.
        body: String,
    },

    /// Rate limited by the service.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// An endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The collaborator refused to serve the request.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Input for creating a remote line item.
///
/// The wire request carries only the ids and quantity; the snapshot lets
/// in-process services fill in display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub user_id: UserId,
    pub product: Product,
    pub quantity: Quantity,
}

/// Server-side cart of a signed-in user.
#[async_trait]
pub trait RemoteCartService: Send + Sync {
    /// Fetch the user's cart in server order.
    async fn fetch_cart(&self, user_id: UserId) -> Result<Vec<LineItem>, RemoteError>;

    /// Create a line item (or set the quantity of the existing line for the
    /// same product).
    async fn create_line_item(&self, input: NewLineItem) -> Result<LineItem, RemoteError>;

    /// Set the quantity of an existing line item.
    async fn update_line_item(
        &self,
        id: LineItemId,
        quantity: Quantity,
    ) -> Result<LineItem, RemoteError>;

    /// Delete a line item. Deleting a missing id succeeds.
    async fn delete_line_item(&self, id: LineItemId) -> Result<(), RemoteError>;
}

/// Favorites list, implicitly scoped to the caller's session.
#[async_trait]
pub trait FavoritesService: Send + Sync {
    /// Fetch the session's favorites.
    async fn fetch_favorites(&self) -> Result<Vec<FavoriteEntry>, RemoteError>;

    /// Add a product to the favorites.
    async fn add_favorite(&self, product: &Product) -> Result<(), RemoteError>;

    /// Remove a product from the favorites.
    async fn remove_favorite(&self, product_id: ProductId) -> Result<(), RemoteError>;
}
