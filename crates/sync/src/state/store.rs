//! Canonical cart state and its mutations.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use cart_sync_core::{CartTotals, ItemRef, LineItem, Product, Quantity};

use super::Observable;
use crate::backend::{BackendKind, CartBackend};
use crate::error::{Result, SyncError};
use crate::notify::Notifier;
use crate::optimistic::{LiveGuard, OptimisticUpdate, Reconcile};

/// The backend currently receiving mutations, with the guard that stops its
/// in-flight results from landing once it is replaced.
#[derive(Clone)]
struct Attached {
    backend: Arc<dyn CartBackend>,
    guard: LiveGuard,
    /// Cleared while the displayed items are not the backend's cart.
    loaded: Arc<AtomicBool>,
}

/// Holds the line items shown to the user.
///
/// Every mutation goes to the attached [`CartBackend`], then the displayed
/// cart is replaced by what the backend reports. A failed mutation leaves the
/// displayed cart as it was. Each mutation sends exactly one notification.
///
/// Totals are never stored; they are computed from the items on every read.
pub struct CartStateStore {
    items: Observable<Vec<LineItem>>,
    busy: Observable<bool>,
    in_flight: AtomicUsize,
    attached: RwLock<Option<Attached>>,
    detached: AtomicBool,
    notifier: Notifier,
}

impl CartStateStore {
    /// Create an empty store with no backend attached.
    #[must_use]
    pub fn new(notifier: Notifier) -> Self {
        Self {
            items: Observable::default(),
            busy: Observable::new(false),
            in_flight: AtomicUsize::new(0),
            attached: RwLock::new(None),
            detached: AtomicBool::new(false),
            notifier,
        }
    }

    /// Create a store already attached to `backend`, loading its cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot load its cart.
    pub async fn with_backend(backend: Arc<dyn CartBackend>, notifier: Notifier) -> Result<Self> {
        let items = backend.load().await?;
        let store = Self::new(notifier);
        store.attach(backend, items);
        Ok(store)
    }

    /// Route mutations to `backend` and display `items`.
    ///
    /// Results of mutations still running against the previous backend are
    /// discarded. After [`detach`](Self::detach) the items are not displayed.
    pub fn attach(&self, backend: Arc<dyn CartBackend>, items: Vec<LineItem>) {
        self.install(backend, items, true);
    }

    /// Route mutations to `backend` before its cart could be fetched.
    ///
    /// The displayed cart is emptied. The first mutation loads the backend's
    /// cart before deciding what to send, so it never works from a cart the
    /// backend was not asked about.
    pub fn attach_unloaded(&self, backend: Arc<dyn CartBackend>) {
        self.install(backend, Vec::new(), false);
    }

    fn install(&self, backend: Arc<dyn CartBackend>, items: Vec<LineItem>, loaded: bool) {
        let guard = LiveGuard::new();
        let detached = self.detached.load(Ordering::SeqCst);
        if detached {
            guard.detach();
        }
        let kind = backend.kind();
        let previous = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Attached {
                backend,
                guard,
                loaded: Arc::new(AtomicBool::new(loaded)),
            });
        if let Some(previous) = previous {
            previous.guard.detach();
        }
        debug!(?kind, items = items.len(), loaded, "Attached cart backend");
        if !detached {
            self.items.replace(items);
        }
    }

    /// Detach the backend while the session changes hands, returning it.
    ///
    /// Displayed items stay; mutations are rejected until the next
    /// [`attach`](Self::attach).
    pub fn suspend(&self) -> Option<Arc<dyn CartBackend>> {
        let previous = self
            .attached
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        previous.guard.detach();
        debug!(kind = ?previous.backend.kind(), "Suspended cart backend");
        Some(previous.backend)
    }

    /// Replace displayed items with what the backend reports.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is attached or it cannot load.
    pub async fn reload(&self) -> Result<()> {
        let attached = self.current()?;
        self.load_into(&attached).await.map(drop)
    }

    /// Whether the displayed items came from the attached backend.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| a.loaded.load(Ordering::SeqCst))
    }

    async fn load_into(&self, attached: &Attached) -> Result<Vec<LineItem>> {
        let items = attached.backend.load().await?;
        if attached.guard.is_live() {
            self.items.replace(items.clone());
            attached.loaded.store(true, Ordering::SeqCst);
        }
        Ok(items)
    }

    /// Stop applying results to displayed state. Irreversible.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        if let Some(attached) = &*self.attached.read().unwrap_or_else(PoisonError::into_inner) {
            attached.guard.detach();
        }
    }

    /// Kind of the attached backend.
    #[must_use]
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.backend.kind())
    }

    fn current(&self) -> Result<Attached> {
        self.attached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
            .ok_or_else(|| SyncError::Validation("Cart is syncing, try again shortly".to_string()))
    }

    /// Snapshot of the displayed items.
    #[must_use]
    pub fn items(&self) -> Vec<LineItem> {
        self.items.get()
    }

    /// Subscribe to changes of the displayed items.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<LineItem>> {
        self.items.subscribe()
    }

    /// Whether a mutation is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Subscribe to the busy flag.
    #[must_use]
    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Sum of `unit_price * quantity` over all items.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.totals().subtotal
    }

    /// Sum of quantities over all items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.totals().item_count
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.items.with(|items| CartTotals::from_items(items))
    }

    /// Add `quantity` of `product`, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is attached or the backend call fails.
    #[instrument(skip(self, product), fields(product_id = %product.id, quantity = %quantity))]
    pub async fn add_item(&self, product: &Product, quantity: Quantity) -> Result<()> {
        let message = format!("Added {} to cart", product.name);
        let result = self
            .mutate(Reconcile::RefetchOnSuccess, |backend, current| async move {
                backend.add(&current, product, quantity).await
            })
            .await;
        self.report(result, message)
    }

    /// Remove the line `item` refers to. Removing an absent line succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is attached, the reference cannot be
    /// used with the attached backend, or the backend call fails.
    #[instrument(skip(self), fields(item = %item))]
    pub async fn remove_item(&self, item: ItemRef) -> Result<()> {
        let result = self
            .mutate(Reconcile::RefetchOnSuccess, |backend, current| async move {
                backend.remove(&current, item).await
            })
            .await;
        self.report(result, "Removed from cart")
    }

    /// Set the quantity of `item`. A quantity of zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity is out of range, the line is not in
    /// the cart or the backend call fails.
    #[instrument(skip(self), fields(item = %item))]
    pub async fn update_quantity(&self, item: ItemRef, requested: i64) -> Result<()> {
        let quantity = match Quantity::from_requested(requested) {
            Ok(Some(quantity)) => quantity,
            Ok(None) => {
                debug!(requested, "Non-positive quantity, removing line");
                return self.remove_item(item).await;
            }
            Err(e) => return self.report(Err(SyncError::Validation(e.to_string())), ""),
        };
        let result = self
            .mutate(Reconcile::RefetchOnSuccess, |backend, current| async move {
                backend.set_quantity(&current, item, quantity).await
            })
            .await;
        self.report(result, "Cart updated")
    }

    /// Remove every line.
    ///
    /// Lines are removed one by one; the displayed cart is reloaded whatever
    /// happens, so lines that could not be removed stay visible.
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is attached or the cart cannot be
    /// reloaded. Individual failed removals are reported as a warning.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<()> {
        let result = self
            .mutate(Reconcile::RefetchAlways, |backend, current| async move {
                backend.clear(&current).await
            })
            .await;

        match result {
            Ok((report, live)) if report.failed > 0 => {
                warn!(
                    failed = report.failed,
                    attempted = report.attempted,
                    "Cart only partially cleared"
                );
                if live {
                    self.notifier.warning(format!(
                        "Could not remove {} of {} items",
                        report.failed, report.attempted
                    ));
                }
                Ok(())
            }
            other => self.report(other.map(|(_, live)| ((), live)), "Cart cleared"),
        }
    }

    /// Run one mutation against the attached backend.
    ///
    /// Returns the call's output together with whether its result was still
    /// wanted when it settled.
    async fn mutate<T, F, Fut>(&self, reconcile: Reconcile, call: F) -> Result<(T, bool)>
    where
        F: FnOnce(Arc<dyn CartBackend>, Vec<LineItem>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attached = self.current()?;
        let _busy = BusyGuard::enter(self);
        let current = if attached.loaded.load(Ordering::SeqCst) {
            self.items.get()
        } else {
            debug!("Cart not loaded yet, loading before mutation");
            self.load_into(&attached).await?
        };
        let Attached { backend, guard, .. } = attached;

        let output = OptimisticUpdate::new(&self.items, &guard, reconcile)
            .run(
                |_| {},
                call(Arc::clone(&backend), current),
                || backend.load(),
            )
            .await?;
        Ok((output, guard.is_live()))
    }

    /// Send the one notification for a settled mutation.
    fn report(&self, result: Result<((), bool)>, success: impl Into<String>) -> Result<()> {
        match result {
            Ok(((), live)) => {
                if live {
                    self.notifier.success(success);
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Cart mutation failed");
                if !self.detached.load(Ordering::SeqCst) {
                    self.notifier.error(e.user_message());
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for CartStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStateStore")
            .field("items", &self.items.with(Vec::len))
            .field("backend", &self.backend_kind())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

/// Keeps the busy flag raised while at least one mutation is in flight.
struct BusyGuard<'a> {
    store: &'a CartStateStore,
}

impl<'a> BusyGuard<'a> {
    fn enter(store: &'a CartStateStore) -> Self {
        if store.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            info!("Mutation started while another is in flight");
        }
        store.busy.replace(true);
        Self { store }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.store.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.store.busy.replace(false);
        }
    }
}
