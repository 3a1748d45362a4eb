//! Optimistic favorites.
//!
//! Toggling flips displayed membership before the network call. On failure
//! the list is refetched to undo the flip; if that refetch fails too, the
//! list from before the toggle is put back.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use cart_sync_core::{FavoriteEntry, Identity, Product, ProductId, Role};

use crate::error::{Result, SyncError};
use crate::notify::Notifier;
use crate::optimistic::{LiveGuard, OptimisticUpdate, Reconcile};
use crate::remote::FavoritesService;
use crate::state::Observable;

/// What a successful toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Added,
    Removed,
}

/// Keeps the favorites list of the signed-in user.
pub struct FavoritesSyncEngine {
    service: Arc<dyn FavoritesService>,
    favorites: Observable<Vec<FavoriteEntry>>,
    identity: Mutex<Option<Identity>>,
    required_role: Role,
    notifier: Notifier,
    guard: LiveGuard,
}

impl FavoritesSyncEngine {
    #[must_use]
    pub fn new(service: Arc<dyn FavoritesService>, notifier: Notifier) -> Self {
        Self {
            service,
            favorites: Observable::default(),
            identity: Mutex::new(None),
            required_role: Role::Customer,
            notifier,
            guard: LiveGuard::new(),
        }
    }

    /// Require `role` for toggling instead of [`Role::Customer`].
    #[must_use]
    pub const fn with_required_role(mut self, role: Role) -> Self {
        self.required_role = role;
        self
    }

    /// Set or clear the signed-in identity. Clearing empties the list.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let cleared = identity.is_none();
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) = identity;
        if cleared {
            self.favorites.replace(Vec::new());
        }
    }

    fn identity(&self) -> Option<Identity> {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorize(&self) -> Result<Identity> {
        match self.identity() {
            Some(identity) if identity.has_role(self.required_role) => Ok(identity),
            Some(identity) => Err(SyncError::Authorization(format!(
                "favorites require the {} role, session has {}",
                self.required_role, identity.role
            ))),
            None => Err(SyncError::Authorization(
                "favorites require a signed-in session".to_string(),
            )),
        }
    }

    /// Fetch the list from the service, replacing displayed state.
    ///
    /// Without an authorized identity the list is emptied and nothing is
    /// fetched.
    ///
    /// # Errors
    ///
    /// Returns the network error if the fetch fails; displayed state is kept.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<()> {
        if self.authorize().is_err() {
            debug!("No authorized session, favorites stay empty");
            self.favorites.replace(Vec::new());
            return Ok(());
        }
        let favorites = self.service.fetch_favorites().await?;
        if self.guard.is_live() {
            self.favorites.replace(favorites);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_favorite(&self, product_id: ProductId) -> bool {
        self.favorites
            .with(|list| list.iter().any(|f| f.product_id == product_id))
    }

    #[must_use]
    pub fn favorites(&self) -> Vec<FavoriteEntry> {
        self.favorites.get()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<FavoriteEntry>> {
        self.favorites.subscribe()
    }

    /// Stop applying in-flight results to displayed state.
    pub fn detach(&self) {
        self.guard.detach();
    }

    /// Flip membership of `product`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authorization` without any network call when the
    /// session lacks the required role, or the network error after the flip
    /// has been rolled back.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn toggle_favorite(&self, product: &Product) -> Result<Toggled> {
        if let Err(e) = self.authorize() {
            debug!(error = %e, "Favorite toggle rejected");
            self.notifier.auth_required("Sign in to save favorites");
            return Err(e);
        }

        let product_id = product.id;
        let was_favorite = self.is_favorite(product_id);
        let toggled = if was_favorite {
            Toggled::Removed
        } else {
            Toggled::Added
        };

        let patch = |list: &mut Vec<FavoriteEntry>| {
            if was_favorite {
                list.retain(|f| f.product_id != product_id);
            } else {
                list.push(FavoriteEntry::new(product.clone()));
            }
        };
        let call = async {
            if was_favorite {
                self.service.remove_favorite(product_id).await?;
            } else {
                self.service.add_favorite(product).await?;
            }
            Ok::<_, SyncError>(toggled)
        };
        let refetch = || async {
            self.service
                .fetch_favorites()
                .await
                .map_err(SyncError::from)
        };

        let result =
            OptimisticUpdate::new(&self.favorites, &self.guard, Reconcile::RefetchOnFailure)
                .run(patch, call, refetch)
                .await;

        if !self.guard.is_live() {
            return result;
        }
        match &result {
            Ok(Toggled::Added) => self
                .notifier
                .success(format!("Added {} to favorites", product.name)),
            Ok(Toggled::Removed) => self
                .notifier
                .success(format!("Removed {} from favorites", product.name)),
            Err(e) => {
                warn!(error = %e, "Favorite toggle failed, rolled back");
                self.notifier.error(e.user_message());
            }
        }
        result
    }
}

impl std::fmt::Debug for FavoritesSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesSyncEngine")
            .field("favorites", &self.favorites.with(Vec::len))
            .field("identity", &self.identity())
            .field("required_role", &self.required_role)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cart_sync_core::{CurrencyCode, Price, UserId};

    use super::*;
    use crate::notify::NotificationLevel;
    use crate::remote::{CallKind, InMemoryCartService};

    fn product(id: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            unit_price: Price::from_minor(1200, CurrencyCode::USD),
            photo_ref: None,
            category: None,
        }
    }

    fn signed_in() -> (FavoritesSyncEngine, Arc<InMemoryCartService>, Notifier) {
        let service = Arc::new(InMemoryCartService::new());
        let notifier = Notifier::new();
        let engine = FavoritesSyncEngine::new(service.clone(), notifier.clone());
        engine.set_identity(Some(Identity::customer(UserId::new(1))));
        (engine, service, notifier)
    }

    #[tokio::test]
    async fn test_toggle_adds_then_removes() {
        let (engine, service, _) = signed_in();

        assert_eq!(engine.toggle_favorite(&product(1)).await.unwrap(), Toggled::Added);
        assert!(engine.is_favorite(ProductId::new(1)));
        assert_eq!(service.favorites().len(), 1);

        assert_eq!(engine.toggle_favorite(&product(1)).await.unwrap(), Toggled::Removed);
        assert!(!engine.is_favorite(ProductId::new(1)));
        assert!(service.calls_of(CallKind::FetchFavorites).is_empty());
    }

    #[tokio::test]
    async fn test_flip_is_visible_before_call_completes() {
        let (engine, service, _) = signed_in();
        let engine = Arc::new(engine);
        service.hold();

        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.toggle_favorite(&product(2)).await }
        });
        engine
            .subscribe()
            .wait_for(|list| !list.is_empty())
            .await
            .unwrap();
        assert!(service.favorites().is_empty());

        service.release();
        task.await.unwrap().unwrap();
        assert_eq!(service.favorites().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_via_refetch() {
        let (engine, service, _) = signed_in();
        service.seed_favorites(&[product(3)]);
        engine.load().await.unwrap();
        service.fail_calls(CallKind::RemoveFavorite);

        assert!(engine.toggle_favorite(&product(3)).await.is_err());
        assert!(engine.is_favorite(ProductId::new(3)));
        assert_eq!(service.calls_of(CallKind::FetchFavorites).len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refetch_restores_snapshot() {
        let (engine, service, _) = signed_in();
        service.fail_calls(CallKind::AddFavorite);
        service.fail_calls(CallKind::FetchFavorites);

        assert!(engine.toggle_favorite(&product(4)).await.is_err());
        assert!(engine.favorites().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_toggle_makes_no_call() {
        let service = Arc::new(InMemoryCartService::new());
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let engine = FavoritesSyncEngine::new(service.clone(), notifier);

        let err = engine.toggle_favorite(&product(1)).await.unwrap_err();
        assert!(matches!(err, SyncError::Authorization(_)));
        assert!(service.calls().is_empty());
        assert_eq!(rx.recv().await.unwrap().level, NotificationLevel::AuthRequired);
    }

    #[tokio::test]
    async fn test_required_role_is_enforced() {
        let service = Arc::new(InMemoryCartService::new());
        let engine = FavoritesSyncEngine::new(service.clone(), Notifier::new())
            .with_required_role(Role::Admin);
        engine.set_identity(Some(Identity::customer(UserId::new(1))));

        assert!(engine.toggle_favorite(&product(1)).await.is_err());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clearing_identity_empties_list() {
        let (engine, service, _) = signed_in();
        service.seed_favorites(&[product(1), product(2)]);
        engine.load().await.unwrap();
        assert_eq!(engine.favorites().len(), 2);

        engine.set_identity(None);
        assert!(engine.favorites().is_empty());
    }
}
