//! Signed-in cart backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use cart_sync_core::{ItemRef, LineItem, LineItemId, Product, Quantity, UserId};

use super::{BackendKind, CartBackend, ClearReport};
use crate::error::{Result, SyncError};
use crate::remote::{NewLineItem, RemoteCartService};

/// Forwards every mutation to the remote cart of one user.
///
/// References by product id are resolved against the displayed cart; lines
/// that have not been persisted yet cannot be addressed.
#[derive(Clone)]
pub struct RemoteBackend {
    service: Arc<dyn RemoteCartService>,
    user_id: UserId,
}

impl RemoteBackend {
    #[must_use]
    pub fn new(service: Arc<dyn RemoteCartService>, user_id: UserId) -> Self {
        Self { service, user_id }
    }

    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Find the persisted line `item` refers to.
fn resolve(current: &[LineItem], item: ItemRef) -> Option<LineItemId> {
    match item {
        ItemRef::LineItem(id) => Some(id),
        ItemRef::Product(_) => current
            .iter()
            .find(|line| line.matches(&item))
            .and_then(|line| line.line_item_id),
    }
}

#[async_trait]
impl CartBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn load(&self) -> Result<Vec<LineItem>> {
        Ok(self.service.fetch_cart(self.user_id).await?)
    }

    #[instrument(skip(self, current, product), fields(user_id = %self.user_id, product_id = %product.id))]
    async fn add(&self, current: &[LineItem], product: &Product, quantity: Quantity) -> Result<()> {
        let existing = current
            .iter()
            .find(|line| line.product_id == product.id)
            .and_then(|line| line.line_item_id.map(|id| (id, line.quantity)));

        match existing {
            Some((id, held)) => {
                debug!(line_item_id = %id, "Product already in cart, updating quantity");
                self.service
                    .update_line_item(id, held.saturating_add(quantity))
                    .await?;
            }
            None => {
                self.service
                    .create_line_item(NewLineItem {
                        user_id: self.user_id,
                        product: product.clone(),
                        quantity,
                    })
                    .await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self, current), fields(user_id = %self.user_id, item = %item))]
    async fn set_quantity(
        &self,
        current: &[LineItem],
        item: ItemRef,
        quantity: Quantity,
    ) -> Result<()> {
        let id = resolve(current, item)
            .ok_or_else(|| SyncError::Validation(format!("{item} is not in the cart")))?;
        self.service.update_line_item(id, quantity).await?;
        Ok(())
    }

    #[instrument(skip(self, current), fields(user_id = %self.user_id, item = %item))]
    async fn remove(&self, current: &[LineItem], item: ItemRef) -> Result<()> {
        let Some(id) = resolve(current, item) else {
            debug!("Nothing to remove");
            return Ok(());
        };
        self.service.delete_line_item(id).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %self.user_id, lines = current.len()))]
    async fn clear(&self, current: &[LineItem]) -> Result<ClearReport> {
        let mut report = ClearReport::default();
        for id in current.iter().filter_map(|line| line.line_item_id) {
            report.attempted += 1;
            if let Err(e) = self.service.delete_line_item(id).await {
                warn!(line_item_id = %id, error = %e, "Failed to remove line while clearing cart");
                report.failed += 1;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cart_sync_core::{CurrencyCode, Price, ProductId};

    use super::*;
    use crate::remote::{CallKind, InMemoryCartService, RemoteCall};

    const USER: UserId = UserId::new(42);

    fn product(id: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            unit_price: Price::from_minor(199, CurrencyCode::USD),
            photo_ref: None,
            category: None,
        }
    }

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn backend() -> (RemoteBackend, Arc<InMemoryCartService>) {
        let service = Arc::new(InMemoryCartService::new());
        (RemoteBackend::new(service.clone(), USER), service)
    }

    #[tokio::test]
    async fn test_add_creates_then_updates() {
        let (backend, service) = backend();
        backend.add(&[], &product(1), qty(2)).await.unwrap();

        let current = backend.load().await.unwrap();
        backend.add(&current, &product(1), qty(3)).await.unwrap();

        let id = current[0].line_item_id.unwrap();
        assert_eq!(
            service.calls_of(CallKind::Update),
            vec![RemoteCall::Update {
                line_item_id: id,
                quantity: qty(5)
            }]
        );
        assert_eq!(service.cart(USER)[0].quantity, qty(5));
    }

    #[tokio::test]
    async fn test_product_refs_resolve_against_current_cart() {
        let (backend, service) = backend();
        let current = service.seed_cart(USER, &[(product(7), qty(1))]);

        backend
            .set_quantity(&current, ProductId::new(7).into(), qty(4))
            .await
            .unwrap();
        assert_eq!(service.cart(USER)[0].quantity, qty(4));

        backend
            .remove(&current, ProductId::new(7).into())
            .await
            .unwrap();
        assert!(service.cart(USER).is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_item_makes_no_call() {
        let (backend, service) = backend();
        backend
            .remove(&[], ProductId::new(99).into())
            .await
            .unwrap();
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clear_counts_failures() {
        let (backend, service) = backend();
        let current = service.seed_cart(
            USER,
            &[(product(1), qty(1)), (product(2), qty(1)), (product(3), qty(1))],
        );
        service.fail_line_item(current[1].line_item_id.unwrap());

        let report = backend.clear(&current).await.unwrap();
        assert_eq!(report, ClearReport { attempted: 3, failed: 1 });
        assert_eq!(service.cart(USER).len(), 1);
    }
}
