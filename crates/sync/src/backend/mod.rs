//! Cart backends.
//!
//! The cart store talks to exactly one [`CartBackend`] at a time:
//!
//! - [`LocalBackend`] while the user is a guest, persisting to the guest store
//! - [`RemoteBackend`] once the user is signed in and merged
//!
//! Swapping the backend is how the sync engine moves a session between modes;
//! the store itself has no notion of guest or signed-in.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

use async_trait::async_trait;

use cart_sync_core::{ItemRef, LineItem, Product, Quantity};

use crate::error::Result;

/// Which kind of backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

/// Outcome of clearing a cart item by item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Lines a removal was attempted for.
    pub attempted: usize,
    /// Removals that failed; those lines are still in the cart.
    pub failed: usize,
}

/// Where cart mutations go.
///
/// `current` is the cart as displayed when the mutation started; backends use
/// it to resolve references and decide between update and create. The store
/// reloads through [`load`](Self::load) afterwards, so backends never return
/// the new cart themselves.
#[async_trait]
pub trait CartBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Current authoritative cart.
    async fn load(&self) -> Result<Vec<LineItem>>;

    /// Add `quantity` of `product`, merging into an existing line.
    async fn add(&self, current: &[LineItem], product: &Product, quantity: Quantity)
    -> Result<()>;

    /// Set the quantity of an existing line.
    async fn set_quantity(
        &self,
        current: &[LineItem],
        item: ItemRef,
        quantity: Quantity,
    ) -> Result<()>;

    /// Remove a line. Removing a line that is not there succeeds.
    async fn remove(&self, current: &[LineItem], item: ItemRef) -> Result<()>;

    /// Remove every line.
    async fn clear(&self, current: &[LineItem]) -> Result<ClearReport>;
}
