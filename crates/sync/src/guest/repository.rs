//! Typed access to the guest cart slot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cart_sync_core::LineItem;

use super::{GuestStore, StorageError};

/// Default key of the guest cart slot.
pub const GUEST_CART_KEY: &str = "guest_cart";

const ENVELOPE_VERSION: u32 = 1;

/// On-disk shape of the guest cart.
#[derive(Debug, Serialize, Deserialize)]
struct GuestCartEnvelope {
    version: u32,
    saved_at: DateTime<Utc>,
    items: Vec<LineItem>,
}

/// Repository for the guest cart.
///
/// The cart is created lazily: nothing is written until the first save, and
/// saving an empty cart removes the slot.
#[derive(Clone)]
pub struct GuestCartRepository {
    store: Arc<dyn GuestStore>,
    key: String,
}

impl GuestCartRepository {
    /// Create a repository over `store` using the default key.
    #[must_use]
    pub fn new(store: Arc<dyn GuestStore>) -> Self {
        Self::with_key(store, GUEST_CART_KEY)
    }

    /// Create a repository over `store` using `key`.
    #[must_use]
    pub fn with_key(store: Arc<dyn GuestStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The same store under a different key.
    #[must_use]
    pub fn rekeyed(self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..self
        }
    }

    /// Load the guest cart, empty if absent.
    ///
    /// A value that cannot be decoded, or was written by an unknown version,
    /// is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store itself cannot be read.
    pub fn load(&self) -> Result<Vec<LineItem>, StorageError> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<GuestCartEnvelope>(&raw) {
            Ok(envelope) if envelope.version == ENVELOPE_VERSION => {
                debug!(items = envelope.items.len(), "Loaded guest cart");
                Ok(envelope.items)
            }
            Ok(envelope) => {
                warn!(version = envelope.version, "Ignoring guest cart with unknown version");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable guest cart");
                Ok(Vec::new())
            }
        }
    }

    /// Persist `items`, removing the slot when empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    pub fn save(&self, items: &[LineItem]) -> Result<(), StorageError> {
        if items.is_empty() {
            return self.clear();
        }

        let envelope = GuestCartEnvelope {
            version: ENVELOPE_VERSION,
            saved_at: Utc::now(),
            items: items.to_vec(),
        };
        self.store.set(&self.key, &serde_json::to_string(&envelope)?)
    }

    /// Destroy the guest cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(&self.key)
    }
}

impl std::fmt::Debug for GuestCartRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestCartRepository")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
