//! Unified error handling for the sync engine.
//!
//! Every public operation returns `Result<T, SyncError>`. The four variants
//! map to the failure classes the engines treat differently: storage failures
//! are recovered locally, network failures revert displayed state,
//! authorization failures never reach a collaborator, and validation failures
//! reject bad input before any I/O.

use thiserror::Error;

use crate::guest::StorageError;
use crate::remote::RemoteError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A collaborator was unreachable or returned a non-success response.
    #[error("Network error: {0}")]
    Network(#[from] RemoteError),

    /// Input was rejected before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Guest storage was unavailable or full.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The mutation requires a signed-in session with a particular role.
    #[error("Unauthorized: {0}")]
    Authorization(String),
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Validation,
    Storage,
    Authorization,
}

impl SyncError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Authorization(_) => ErrorKind::Authorization,
        }
    }

    /// Message suitable for a transient notification.
    ///
    /// Network and storage details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(RemoteError::RateLimited(secs)) => {
                format!("Too many requests, try again in {secs}s")
            }
            Self::Network(_) => "Could not reach the cart service".to_string(),
            Self::Storage(_) => "Could not save your cart on this device".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::Authorization(_) => "Please sign in to continue".to_string(),
        }
    }
}

/// Result type alias for `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;
