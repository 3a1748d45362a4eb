//! Cart Sync - guest/remote cart and favorites synchronization engine.
//!
//! This crate reconciles an anonymous cart kept in profile-scoped storage with
//! a signed-in user's server-side cart, routes live mutations to whichever
//! backend applies, and keeps a reactive copy of the canonical cart for the UI.
//!
//! # Architecture
//!
//! - [`engine::SyncEngine`] owns the session state machine and performs the
//!   one-time guest→remote merge on sign-in
//! - [`state::CartStateStore`] holds the displayed line items and routes every
//!   mutation to a [`backend::CartBackend`] chosen by the engine
//! - [`favorites::FavoritesSyncEngine`] flips favorite membership
//!   optimistically and rolls back by refetching
//! - [`optimistic`] is the shared patch → remote call → reconcile routine
//! - [`guest`] and [`remote`] are the two persistence adapters
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cart_sync::config::SyncConfig;
//! use cart_sync::engine::{Session, SyncEngine};
//! use cart_sync::guest::FileGuestStore;
//! use cart_sync::notify::Notifier;
//! use cart_sync::remote::HttpCartClient;
//!
//! let config = SyncConfig::from_env()?;
//! let client = HttpCartClient::new(config.require_remote()?, config.currency_code)?;
//! let engine = SyncEngine::from_config(
//!     &config,
//!     Arc::new(FileGuestStore::open(config.guest_store_path.clone())?),
//!     Arc::new(client),
//!     Notifier::default(),
//! );
//! engine.start(Session::Anonymous).await?;
//! engine.cart().add_item(&product, Quantity::ONE).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod favorites;
pub mod guest;
pub mod notify;
pub mod optimistic;
pub mod remote;
pub mod state;

pub use error::{ErrorKind, Result, SyncError};
