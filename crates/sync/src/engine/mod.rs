//! Session state machine and the guest→remote handoff.
//!
//! # States
//!
//! ```text
//! Uninitialized ──anonymous──▶ Guest ──sign-in──▶ Authenticating
//!       │                        ▲                 │          │
//!       └──────signed in─────────┼────────────────▶│          │ guest cart empty
//!                                │           guest cart       ▼
//!                            sign-out        non-empty   Authenticated
//!                                │                 │          ▲
//!                                │                 ▼          │
//!                                └────────────── Merging ─────┘
//! ```
//!
//! The merge runs at most once per sign-in. While a sign-in is in progress
//! the cart store has no backend and rejects mutations.

mod merge;

pub use merge::{MergeFailure, MergePolicy, MergeReport, UnknownMergePolicy, merge_guest_cart};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use cart_sync_core::{Identity, LineItem, UserId};

use crate::backend::{BackendKind, CartBackend, LocalBackend, RemoteBackend};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::guest::{GuestCartRepository, GuestStore};
use crate::notify::Notifier;
use crate::remote::RemoteCartService;
use crate::state::{CartStateStore, Observable};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Uninitialized,
    Guest,
    Authenticating,
    Merging,
    Authenticated,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Guest => "guest",
            Self::Authenticating => "authenticating",
            Self::Merging => "merging",
            Self::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}

/// How the session was resolved at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Anonymous,
    Authenticated(Identity),
}

#[derive(Debug, Default)]
struct SessionSlot {
    identity: Option<Identity>,
    /// Guest lines still waiting to be merged because the initial fetch
    /// failed.
    pending_guest: Vec<LineItem>,
}

/// Owns the session state machine and the cart store.
pub struct SyncEngine {
    guest: GuestCartRepository,
    remote: Arc<dyn RemoteCartService>,
    cart: Arc<CartStateStore>,
    notifier: Notifier,
    state: Observable<SyncState>,
    slot: Mutex<SessionSlot>,
    merge_policy: MergePolicy,
}

impl SyncEngine {
    /// Create an engine in the `Uninitialized` state.
    #[must_use]
    pub fn new(
        guest_store: Arc<dyn GuestStore>,
        remote: Arc<dyn RemoteCartService>,
        notifier: Notifier,
    ) -> Self {
        Self {
            guest: GuestCartRepository::new(guest_store),
            remote,
            cart: Arc::new(CartStateStore::new(notifier.clone())),
            notifier,
            state: Observable::new(SyncState::Uninitialized),
            slot: Mutex::new(SessionSlot::default()),
            merge_policy: MergePolicy::default(),
        }
    }

    /// Create an engine using the guest cart key and merge policy from
    /// `config`.
    #[must_use]
    pub fn from_config(
        config: &SyncConfig,
        guest_store: Arc<dyn GuestStore>,
        remote: Arc<dyn RemoteCartService>,
        notifier: Notifier,
    ) -> Self {
        Self::new(guest_store, remote, notifier)
            .with_guest_key(config.guest_cart_key.clone())
            .with_merge_policy(config.merge_policy)
    }

    #[must_use]
    pub const fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    #[must_use]
    pub fn with_guest_key(mut self, key: impl Into<String>) -> Self {
        self.guest = self.guest.rekeyed(key);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state.get()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// The cart store. Mutations go to whichever backend the current state
    /// calls for.
    #[must_use]
    pub const fn cart(&self) -> &Arc<CartStateStore> {
        &self.cart
    }

    #[must_use]
    pub const fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Identity of the signed-in user, if any.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity
    }

    /// Whether a guest cart is still waiting to be merged.
    #[must_use]
    pub fn merge_pending(&self) -> bool {
        !self.lock().pending_guest.is_empty()
    }

    /// Leave `Uninitialized` according to how the session resolved.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Validation` if the engine was already started.
    #[instrument(skip(self))]
    pub async fn start(&self, session: Session) -> Result<Option<MergeReport>> {
        if self.state() != SyncState::Uninitialized {
            return Err(SyncError::Validation(format!(
                "Engine already started ({})",
                self.state()
            )));
        }
        match session {
            Session::Anonymous => {
                let backend = LocalBackend::open(self.guest.clone());
                let items = backend.load().await?;
                info!(items = items.len(), "Starting guest session");
                self.cart.attach(Arc::new(backend), items);
                self.state.replace(SyncState::Guest);
                Ok(None)
            }
            Session::Authenticated(identity) => self.auth_resolved(identity).await,
        }
    }

    /// The user is now known to be `identity`.
    ///
    /// Fetches the user's remote cart and merges the guest cart into it. A
    /// repeated call for the signed-in user does nothing, unless an earlier
    /// initial fetch failed, in which case the merge is retried. A call for a
    /// different user signs the current one out first.
    ///
    /// Returns the merge report when a merge ran.
    ///
    /// # Errors
    ///
    /// This never fails authentication: failed remote calls are reported
    /// through notifications and the engine still ends `Authenticated`.
    #[instrument(skip(self), fields(user_id = %identity.user_id, role = %identity.role))]
    pub async fn auth_resolved(&self, identity: Identity) -> Result<Option<MergeReport>> {
        {
            let mut slot = self.lock();
            let same_user = slot.identity.map(|i| i.user_id) == Some(identity.user_id);
            match self.state() {
                SyncState::Authenticating | SyncState::Merging => {
                    debug!("Sign-in already in progress");
                    return Ok(None);
                }
                SyncState::Authenticated if same_user && slot.pending_guest.is_empty() => {
                    debug!("Already signed in");
                    slot.identity = Some(identity);
                    return Ok(None);
                }
                SyncState::Authenticated if !same_user => {
                    info!("Different user signed in, signing out previous user");
                    self.reset_to_guest(&mut slot);
                }
                _ => {}
            }
            slot.identity = Some(identity);
            self.state.replace(SyncState::Authenticating);
        }

        let leaving = self.cart.suspend();
        let guest_items = self.guest_items(leaving).await;
        Ok(self.sign_in(identity.user_id, guest_items).await)
    }

    /// The guest lines a sign-in should merge.
    ///
    /// A guest session being left holds the complete cart in memory: writes
    /// to storage may have failed (quota) while the session went on. Without
    /// one, lines postponed by a failed sign-in come next, then storage.
    async fn guest_items(&self, leaving: Option<Arc<dyn CartBackend>>) -> Vec<LineItem> {
        if let Some(backend) = leaving.filter(|b| b.kind() == BackendKind::Local) {
            return match backend.load().await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "Guest backend unreadable, merging displayed cart");
                    self.cart.items()
                }
            };
        }
        let pending = self.lock().pending_guest.clone();
        if !pending.is_empty() {
            return pending;
        }
        self.guest.load().unwrap_or_else(|e| {
            warn!(error = %e, "Guest store unavailable, nothing to merge");
            Vec::new()
        })
    }

    async fn sign_in(&self, user_id: UserId, guest_items: Vec<LineItem>) -> Option<MergeReport> {
        let initial = match self.remote.fetch_cart(user_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Initial cart fetch failed, merge postponed");
                if self.still_signing_in(user_id) {
                    self.lock().pending_guest = guest_items;
                    let backend = RemoteBackend::new(Arc::clone(&self.remote), user_id);
                    self.cart.attach_unloaded(Arc::new(backend));
                    self.state.replace(SyncState::Authenticated);
                    self.notifier.error(SyncError::from(e).user_message());
                }
                return None;
            }
        };

        if guest_items.is_empty() {
            if self.still_signing_in(user_id) {
                debug!("Guest cart empty, skipping merge");
                self.lock().pending_guest.clear();
                self.finish(user_id, initial);
            }
            return None;
        }

        if !self.still_signing_in(user_id) {
            return None;
        }
        self.state.replace(SyncState::Merging);
        let report = merge_guest_cart(
            self.remote.as_ref(),
            user_id,
            &guest_items,
            &initial,
            self.merge_policy,
        )
        .await;

        if !self.still_signing_in(user_id) {
            return Some(report);
        }
        if let Err(e) = self.guest.clear() {
            warn!(error = %e, "Failed to clear guest cart after merge");
        }
        self.lock().pending_guest.clear();

        let canonical = match self.remote.fetch_cart(user_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Cart refetch after merge failed");
                self.notifier.error(SyncError::from(e).user_message());
                initial
            }
        };
        if !self.still_signing_in(user_id) {
            return Some(report);
        }
        self.finish(user_id, canonical);

        if report.is_clean() {
            info!(merged = report.merged(), "Guest cart merged");
            if report.merged() > 0 {
                self.notifier.success("Your guest cart was added to your account");
            }
        } else {
            let names: Vec<&str> = report
                .failed
                .iter()
                .map(|f| f.product_name.as_str())
                .collect();
            warn!(failed = report.failed.len(), ?names, "Guest cart partially merged");
            self.notifier.warning(format!(
                "{} item(s) from your guest cart could not be added: {}",
                report.failed.len(),
                names.join(", ")
            ));
        }
        Some(report)
    }

    /// A sign-in for `user_id` is still the one in progress.
    fn still_signing_in(&self, user_id: UserId) -> bool {
        let slot = self.lock();
        let current = slot.identity.map(|i| i.user_id) == Some(user_id);
        let in_progress = matches!(
            self.state(),
            SyncState::Authenticating | SyncState::Merging
        );
        if !(current && in_progress) {
            debug!("Sign-in superseded, discarding result");
        }
        current && in_progress
    }

    fn finish(&self, user_id: UserId, items: Vec<LineItem>) {
        let backend = RemoteBackend::new(Arc::clone(&self.remote), user_id);
        self.cart.attach(Arc::new(backend), items);
        self.state.replace(SyncState::Authenticated);
    }

    /// Drop the remote cart and start over with an empty guest cart.
    #[instrument(skip(self))]
    pub fn sign_out(&self) {
        let mut slot = self.lock();
        self.reset_to_guest(&mut slot);
        info!("Signed out");
    }

    fn reset_to_guest(&self, slot: &mut SessionSlot) {
        slot.identity = None;
        slot.pending_guest.clear();
        self.cart
            .attach(Arc::new(LocalBackend::fresh(self.guest.clone())), Vec::new());
        self.state.replace(SyncState::Guest);
    }

    /// Reload the cart from the active backend.
    ///
    /// After a failed initial fetch this retries the whole sign-in, merge
    /// included.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is mid sign-in or the reload fails.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Option<MergeReport>> {
        let retry = {
            let slot = self.lock();
            match (self.state(), slot.identity) {
                (SyncState::Authenticated, Some(identity)) if !slot.pending_guest.is_empty() => {
                    Some(identity)
                }
                _ => None,
            }
        };
        if let Some(identity) = retry {
            info!("Retrying postponed guest cart merge");
            return self.auth_resolved(identity).await;
        }
        self.cart.reload().await?;
        Ok(None)
    }

    /// Stop applying in-flight results to displayed state.
    pub fn detach(&self) {
        self.cart.detach();
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("guest", &self.guest)
            .field("cart", &self.cart)
            .field("merge_policy", &self.merge_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cart_sync_core::{CurrencyCode, Price, Product, ProductId, Quantity};

    use super::*;
    use crate::guest::MemoryGuestStore;
    use crate::remote::{CallKind, InMemoryCartService, RemoteCall};

    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);

    fn product(id: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            unit_price: Price::from_minor(500, CurrencyCode::USD),
            photo_ref: None,
            category: None,
        }
    }

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn engine() -> (SyncEngine, Arc<InMemoryCartService>, Arc<MemoryGuestStore>) {
        let service = Arc::new(InMemoryCartService::new());
        let store = Arc::new(MemoryGuestStore::new());
        let engine = SyncEngine::new(store.clone(), service.clone(), Notifier::new());
        (engine, service, store)
    }

    #[tokio::test]
    async fn test_anonymous_start_enters_guest() {
        let (engine, service, _) = engine();
        engine.start(Session::Anonymous).await.unwrap();

        assert_eq!(engine.state(), SyncState::Guest);
        engine.cart().add_item(&product(1), qty(2)).await.unwrap();
        assert_eq!(engine.cart().item_count(), 2);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (engine, _, _) = engine();
        engine.start(Session::Anonymous).await.unwrap();
        assert!(engine.start(Session::Anonymous).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_guest_cart_skips_merge() {
        let (engine, service, _) = engine();
        service.seed_cart(ALICE, &[(product(1), qty(1))]);

        let report = engine
            .start(Session::Authenticated(Identity::customer(ALICE)))
            .await
            .unwrap();

        assert!(report.is_none());
        assert_eq!(engine.state(), SyncState::Authenticated);
        assert_eq!(service.calls(), vec![RemoteCall::FetchCart(ALICE)]);
        assert_eq!(engine.cart().items().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_merges_guest_cart_once() {
        let (engine, service, _) = engine();
        engine.start(Session::Anonymous).await.unwrap();
        engine.cart().add_item(&product(1), qty(2)).await.unwrap();

        let report = engine
            .auth_resolved(Identity::customer(ALICE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(engine.state(), SyncState::Authenticated);
        assert_eq!(engine.cart().items()[0].quantity, qty(2));
        assert!(engine.cart().items()[0].is_persisted());

        service.reset_calls();
        assert!(
            engine
                .auth_resolved(Identity::customer(ALICE))
                .await
                .unwrap()
                .is_none()
        );
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_initial_fetch_postpones_merge() {
        let (engine, service, _) = engine();
        engine.start(Session::Anonymous).await.unwrap();
        engine.cart().add_item(&product(1), qty(1)).await.unwrap();
        service.fail_next(CallKind::FetchCart, 1);

        let report = engine.auth_resolved(Identity::customer(ALICE)).await.unwrap();
        assert!(report.is_none());
        assert_eq!(engine.state(), SyncState::Authenticated);
        assert!(engine.merge_pending());
        assert!(engine.cart().items().is_empty());

        let report = engine.refresh().await.unwrap().unwrap();
        assert_eq!(report.created, 1);
        assert!(!engine.merge_pending());
        assert_eq!(service.cart(ALICE).len(), 1);
    }

    #[tokio::test]
    async fn test_sign_in_merges_lines_storage_could_not_hold() {
        let service = Arc::new(InMemoryCartService::new());
        let store = Arc::new(MemoryGuestStore::with_quota(400));
        let engine = SyncEngine::new(store.clone(), service.clone(), Notifier::new());
        engine.start(Session::Anonymous).await.unwrap();
        for id in 1..=5 {
            engine.cart().add_item(&product(id), qty(1)).await.unwrap();
        }
        let stored = GuestCartRepository::new(store.clone()).load().unwrap();
        assert!(stored.len() < 5);
        assert_eq!(engine.cart().items().len(), 5);

        let report = engine
            .auth_resolved(Identity::customer(ALICE))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.created, 5);
        assert_eq!(service.cart(ALICE).len(), 5);
        assert_eq!(engine.cart().items().len(), 5);
        assert_eq!(store.get(crate::guest::GUEST_CART_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_postponed_merge_keeps_lines_storage_could_not_hold() {
        let service = Arc::new(InMemoryCartService::new());
        let store = Arc::new(MemoryGuestStore::with_quota(400));
        let engine = SyncEngine::new(store, service.clone(), Notifier::new());
        engine.start(Session::Anonymous).await.unwrap();
        for id in 1..=5 {
            engine.cart().add_item(&product(id), qty(1)).await.unwrap();
        }
        service.fail_next(CallKind::FetchCart, 1);

        engine.auth_resolved(Identity::customer(ALICE)).await.unwrap();
        assert!(engine.merge_pending());

        let report = engine.refresh().await.unwrap().unwrap();
        assert_eq!(report.created, 5);
        assert_eq!(service.cart(ALICE).len(), 5);
    }

    #[tokio::test]
    async fn test_add_after_failed_initial_fetch_updates_existing_line() {
        let (engine, service, _) = engine();
        service.seed_cart(ALICE, &[(product(1), qty(3))]);
        engine.start(Session::Anonymous).await.unwrap();
        service.fail_next(CallKind::FetchCart, 1);

        engine.auth_resolved(Identity::customer(ALICE)).await.unwrap();
        assert_eq!(engine.state(), SyncState::Authenticated);
        assert!(!engine.cart().is_loaded());
        service.reset_calls();

        engine.cart().add_item(&product(1), qty(1)).await.unwrap();

        assert!(service.calls_of(CallKind::Create).is_empty());
        assert_eq!(service.calls_of(CallKind::Update).len(), 1);
        assert_eq!(service.cart(ALICE)[0].quantity, qty(4));
        assert_eq!(engine.cart().item_count(), 4);
    }

    #[tokio::test]
    async fn test_sign_out_starts_fresh_guest_cart() {
        let (engine, _, store) = engine();
        engine
            .start(Session::Authenticated(Identity::customer(ALICE)))
            .await
            .unwrap();
        engine.cart().add_item(&product(1), qty(1)).await.unwrap();

        engine.sign_out();
        assert_eq!(engine.state(), SyncState::Guest);
        assert_eq!(engine.identity(), None);
        assert!(engine.cart().items().is_empty());
        assert_eq!(store.get(crate::guest::GUEST_CART_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_different_user_signs_out_previous() {
        let (engine, service, _) = engine();
        service.seed_cart(BOB, &[(product(5), qty(3))]);
        engine
            .start(Session::Authenticated(Identity::customer(ALICE)))
            .await
            .unwrap();
        engine.cart().add_item(&product(1), qty(1)).await.unwrap();

        engine.auth_resolved(Identity::customer(BOB)).await.unwrap();

        assert_eq!(engine.identity().map(|i| i.user_id), Some(BOB));
        let items = engine.cart().items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, ProductId::new(5));
        assert_eq!(service.cart(ALICE).len(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SyncState::Merging.to_string(), "merging");
    }
}
