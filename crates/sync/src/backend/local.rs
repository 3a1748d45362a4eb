//! Guest cart backend.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use cart_sync_core::{ItemRef, LineItem, Product, Quantity};

use super::{BackendKind, CartBackend, ClearReport};
use crate::error::{Result, SyncError};
use crate::guest::GuestCartRepository;

/// Keeps the guest cart in memory and writes it through to the guest store.
///
/// Lines are addressed by product id; a line item reference is a validation
/// error since guest lines have none. Storage failures are logged and
/// swallowed: the in-memory cart stays correct for the rest of the session
/// even if it cannot be persisted.
#[derive(Debug)]
pub struct LocalBackend {
    repository: GuestCartRepository,
    items: Mutex<Vec<LineItem>>,
}

impl LocalBackend {
    /// Open the guest cart stored in `repository`.
    ///
    /// An unreadable store yields an empty cart.
    #[must_use]
    pub fn open(repository: GuestCartRepository) -> Self {
        let items = repository.load().unwrap_or_else(|e| {
            warn!(error = %e, "Guest store unavailable, starting with an empty cart");
            Vec::new()
        });
        debug!(items = items.len(), "Opened guest cart");
        Self {
            repository,
            items: Mutex::new(items),
        }
    }

    /// Start a fresh, empty guest cart, discarding anything stored.
    #[must_use]
    pub fn fresh(repository: GuestCartRepository) -> Self {
        if let Err(e) = repository.clear() {
            warn!(error = %e, "Failed to clear guest cart");
        }
        Self {
            repository,
            items: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LineItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to the cart and persist the result.
    fn update<T>(&self, change: impl FnOnce(&mut Vec<LineItem>) -> Result<T>) -> Result<T> {
        let mut items = self.lock();
        let out = change(&mut items)?;
        if let Err(e) = self.repository.save(&items) {
            warn!(error = %e, "Failed to persist guest cart");
        }
        Ok(out)
    }
}

fn product_ref(item: ItemRef) -> Result<ItemRef> {
    match item {
        ItemRef::Product(_) => Ok(item),
        ItemRef::LineItem(id) => Err(SyncError::Validation(format!(
            "Guest cart lines have no line id (got {id})"
        ))),
    }
}

#[async_trait]
impl CartBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn load(&self) -> Result<Vec<LineItem>> {
        Ok(self.lock().clone())
    }

    #[instrument(skip(self, _current, product), fields(product_id = %product.id, quantity = %quantity))]
    async fn add(
        &self,
        _current: &[LineItem],
        product: &Product,
        quantity: Quantity,
    ) -> Result<()> {
        self.update(|items| {
            match items.iter_mut().find(|line| line.product_id == product.id) {
                Some(line) => line.quantity = line.quantity.saturating_add(quantity),
                None => items.push(LineItem::guest(product, quantity)),
            }
            Ok(())
        })
    }

    #[instrument(skip(self, _current), fields(item = %item, quantity = %quantity))]
    async fn set_quantity(
        &self,
        _current: &[LineItem],
        item: ItemRef,
        quantity: Quantity,
    ) -> Result<()> {
        let item = product_ref(item)?;
        self.update(|items| {
            let line = items
                .iter_mut()
                .find(|line| line.matches(&item))
                .ok_or_else(|| SyncError::Validation(format!("{item} is not in the cart")))?;
            line.quantity = quantity;
            Ok(())
        })
    }

    #[instrument(skip(self, _current), fields(item = %item))]
    async fn remove(&self, _current: &[LineItem], item: ItemRef) -> Result<()> {
        let item = product_ref(item)?;
        self.update(|items| {
            items.retain(|line| !line.matches(&item));
            Ok(())
        })
    }

    #[instrument(skip_all)]
    async fn clear(&self, _current: &[LineItem]) -> Result<ClearReport> {
        self.update(|items| {
            let attempted = items.len();
            items.clear();
            Ok(ClearReport {
                attempted,
                failed: 0,
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use cart_sync_core::{CurrencyCode, LineItemId, Price, ProductId};

    use super::*;
    use crate::guest::MemoryGuestStore;

    fn product(id: i64, cents: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            unit_price: Price::from_minor(cents, CurrencyCode::USD),
            photo_ref: None,
            category: None,
        }
    }

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn backend() -> (LocalBackend, GuestCartRepository) {
        let repository = GuestCartRepository::new(Arc::new(MemoryGuestStore::new()));
        (LocalBackend::open(repository.clone()), repository)
    }

    #[tokio::test]
    async fn test_add_merges_by_product_and_persists() {
        let (backend, repository) = backend();
        backend.add(&[], &product(1, 250), qty(2)).await.unwrap();
        backend.add(&[], &product(1, 250), qty(3)).await.unwrap();
        backend.add(&[], &product(2, 100), qty(1)).await.unwrap();

        let items = backend.load().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity.get(), 5);
        assert_eq!(repository.load().unwrap(), items);
    }

    #[tokio::test]
    async fn test_line_item_refs_are_rejected() {
        let (backend, _) = backend();
        backend.add(&[], &product(1, 250), qty(1)).await.unwrap();

        let err = backend
            .remove(&[], ItemRef::LineItem(LineItemId::new(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(backend.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_quantity_requires_existing_line() {
        let (backend, _) = backend();
        let err = backend
            .set_quantity(&[], ProductId::new(4).into(), qty(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[tokio::test]
    async fn test_clear_removes_stored_cart() {
        let (backend, repository) = backend();
        backend.add(&[], &product(1, 250), qty(1)).await.unwrap();
        backend.add(&[], &product(2, 250), qty(1)).await.unwrap();

        let report = backend.clear(&[]).await.unwrap();
        assert_eq!(report, ClearReport { attempted: 2, failed: 0 });
        assert!(repository.load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_memory_cart() {
        let store = Arc::new(MemoryGuestStore::new());
        let backend = LocalBackend::open(GuestCartRepository::new(store.clone()));
        store.set_unavailable(true);

        backend.add(&[], &product(1, 250), qty(1)).await.unwrap();
        assert_eq!(backend.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_reads_existing_cart() {
        let store = Arc::new(MemoryGuestStore::new());
        let repository = GuestCartRepository::new(store);
        repository
            .save(&[LineItem::guest(&product(3, 100), qty(4))])
            .unwrap();

        let backend = LocalBackend::open(repository.clone());
        assert_eq!(backend.load().await.unwrap()[0].quantity.get(), 4);

        let fresh = LocalBackend::fresh(repository.clone());
        assert!(fresh.load().await.unwrap().is_empty());
        assert!(repository.load().unwrap().is_empty());
    }
}
