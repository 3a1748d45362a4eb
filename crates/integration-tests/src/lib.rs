//! Integration tests for cart sync.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cart-sync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `merge` - guest→remote handoff on sign-in
//! - `cart_mutations` - cart operations in both session modes
//! - `favorites` - optimistic favorites and the authorization gate
//! - `guest_persistence` - guest cart surviving a restart
//! - `properties` - property tests for totals and merging
//!
//! Everything runs in process against [`InMemoryCartService`]; no server is
//! needed.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};

use cart_sync::engine::{MergePolicy, Session, SyncEngine};
use cart_sync::favorites::FavoritesSyncEngine;
use cart_sync::guest::{GuestStore, MemoryGuestStore};
use cart_sync::notify::{Notification, NotificationLevel, Notifier};
use cart_sync::remote::InMemoryCartService;
use cart_sync_core::{CurrencyCode, Identity, Price, Product, ProductId, Quantity, UserId};

/// A user whose remote cart the tests play with.
pub const ALICE: UserId = UserId::new(1001);

/// Product snapshot priced at `cents` USD.
#[must_use]
pub fn product(id: i64, cents: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        unit_price: Price::from_minor(cents, CurrencyCode::USD),
        photo_ref: Some(format!("photos/{id}.jpg")),
        category: Some("pantry".to_string()),
    }
}

/// A positive quantity.
///
/// # Panics
///
/// Panics if `n` is zero.
#[must_use]
pub fn qty(n: u32) -> Quantity {
    Quantity::new(n).expect("test quantities are positive")
}

/// Engines wired to in-process collaborators.
pub struct TestContext {
    pub service: Arc<InMemoryCartService>,
    pub guest_store: Arc<MemoryGuestStore>,
    pub engine: SyncEngine,
    pub favorites: FavoritesSyncEngine,
    notifications: broadcast::Receiver<Notification>,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(MergePolicy::Sum)
    }

    #[must_use]
    pub fn with_policy(policy: MergePolicy) -> Self {
        Self::with_guest_store(Arc::new(MemoryGuestStore::new()), policy)
    }

    #[must_use]
    pub fn with_guest_store(guest_store: Arc<MemoryGuestStore>, policy: MergePolicy) -> Self {
        let service = Arc::new(InMemoryCartService::new());
        let notifier = Notifier::new();
        let notifications = notifier.subscribe();
        let store: Arc<dyn GuestStore> = guest_store.clone();
        let engine =
            SyncEngine::new(store, service.clone(), notifier.clone()).with_merge_policy(policy);
        let favorites = FavoritesSyncEngine::new(service.clone(), notifier);
        Self {
            service,
            guest_store,
            engine,
            favorites,
            notifications,
        }
    }

    /// Start as a guest and put `lines` in the guest cart.
    ///
    /// # Panics
    ///
    /// Panics if the engine cannot start or a guest add fails.
    pub async fn guest_with(&self, lines: &[(Product, Quantity)]) {
        self.engine
            .start(Session::Anonymous)
            .await
            .expect("guest start");
        for (product, quantity) in lines {
            self.engine
                .cart()
                .add_item(product, *quantity)
                .await
                .expect("guest add");
        }
    }

    /// Sign `user_id` in, on the engine and on favorites.
    ///
    /// # Panics
    ///
    /// Panics if `auth_resolved` returns an error.
    pub async fn sign_in(&self, user_id: UserId) -> Option<cart_sync::engine::MergeReport> {
        let identity = Identity::customer(user_id);
        let report = self
            .engine
            .auth_resolved(identity)
            .await
            .expect("auth_resolved never fails");
        self.favorites.set_identity(Some(identity));
        report
    }

    /// Notifications raised since the last call.
    pub fn notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match self.notifications.try_recv() {
                Ok(n) => out.push(n),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return out,
            }
        }
    }

    /// Levels of the notifications raised since the last call.
    pub fn notification_levels(&mut self) -> Vec<NotificationLevel> {
        self.notifications().into_iter().map(|n| n.level).collect()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
