//! Guest (anonymous) cart persistence.
//!
//! The guest cart lives in a string-keyed store scoped to one browser profile
//! (or, outside the browser, one file). It survives reloads but never leaves
//! the device. Only one engine writes to a slot at a time and the last write
//! wins; there is no locking.
//!
//! - [`GuestStore`] - the raw key-value seam
//! - [`MemoryGuestStore`] - in-process store with quota and outage injection
//! - [`FileGuestStore`] - JSON file store used by `cartctl`
//! - [`GuestCartRepository`] - typed load/save/clear of the cart envelope

mod file;
mod memory;
mod repository;

pub use file::FileGuestStore;
pub use memory::MemoryGuestStore;
pub use repository::{GUEST_CART_KEY, GuestCartRepository};

use thiserror::Error;

/// Errors raised by a [`GuestStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store cannot be used right now (private mode, disabled storage).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Writing would exceed the store's quota.
    #[error("Storage quota exceeded")]
    QuotaExceeded,
}

/// String-keyed persisted store scoped to one profile.
pub trait GuestStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
