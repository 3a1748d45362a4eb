//! In-process implementation of the remote collaborators.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use cart_sync_core::{FavoriteEntry, LineItem, LineItemId, Product, ProductId, Quantity, UserId};

use super::{FavoritesService, NewLineItem, RemoteCartService, RemoteError};

/// A call received by [`InMemoryCartService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FetchCart(UserId),
    Create {
        product_id: ProductId,
        quantity: Quantity,
    },
    Update {
        line_item_id: LineItemId,
        quantity: Quantity,
    },
    Delete(LineItemId),
    FetchFavorites,
    AddFavorite(ProductId),
    RemoveFavorite(ProductId),
}

impl RemoteCall {
    /// The kind of this call.
    #[must_use]
    pub const fn kind(&self) -> CallKind {
        match self {
            Self::FetchCart(_) => CallKind::FetchCart,
            Self::Create { .. } => CallKind::Create,
            Self::Update { .. } => CallKind::Update,
            Self::Delete(_) => CallKind::Delete,
            Self::FetchFavorites => CallKind::FetchFavorites,
            Self::AddFavorite(_) => CallKind::AddFavorite,
            Self::RemoveFavorite(_) => CallKind::RemoveFavorite,
        }
    }

    const fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::Create { product_id, .. }
            | Self::AddFavorite(product_id)
            | Self::RemoveFavorite(product_id) => Some(*product_id),
            _ => None,
        }
    }
}

/// Kinds of [`RemoteCall`], used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    FetchCart,
    Create,
    Update,
    Delete,
    FetchFavorites,
    AddFavorite,
    RemoveFavorite,
}

#[derive(Debug, Default)]
struct State {
    carts: BTreeMap<UserId, Vec<LineItem>>,
    favorites: Vec<FavoriteEntry>,
    next_line_item_id: i64,
    calls: Vec<RemoteCall>,
    failing_kinds: HashSet<CallKind>,
    fail_next: HashMap<CallKind, usize>,
    failing_products: HashSet<ProductId>,
    failing_line_items: HashSet<LineItemId>,
}

/// Remote cart and favorites kept in memory.
///
/// Behaves like the REST API (idempotent create, idempotent delete, server
/// assigned line ids) and additionally:
/// - records every call in order ([`calls`](Self::calls))
/// - fails calls on request ([`fail_calls`](Self::fail_calls),
///   [`fail_next`](Self::fail_next), [`fail_product`](Self::fail_product),
///   [`fail_line_item`](Self::fail_line_item))
/// - can hold every call until released ([`hold`](Self::hold)), which lets
///   tests observe in-flight state
#[derive(Debug)]
pub struct InMemoryCartService {
    state: Mutex<State>,
    gate: watch::Sender<bool>,
}

impl Default for InMemoryCartService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCartService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(State {
                next_line_item_id: 1,
                ..State::default()
            }),
            gate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding this lock can only come from a test assertion.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Put `products` into `user_id`'s cart with server-assigned ids.
    pub fn seed_cart(&self, user_id: UserId, lines: &[(Product, Quantity)]) -> Vec<LineItem> {
        let mut state = self.lock();
        let mut seeded = Vec::with_capacity(lines.len());
        for (product, quantity) in lines {
            let mut item = LineItem::guest(product, *quantity);
            item.line_item_id = Some(LineItemId::new(state.next_line_item_id));
            state.next_line_item_id += 1;
            seeded.push(item);
        }
        state
            .carts
            .entry(user_id)
            .or_default()
            .extend(seeded.iter().cloned());
        seeded
    }

    /// Replace the favorites list.
    pub fn seed_favorites(&self, products: &[Product]) {
        self.lock().favorites = products.iter().cloned().map(FavoriteEntry::new).collect();
    }

    /// Current server-side cart of `user_id`.
    #[must_use]
    pub fn cart(&self, user_id: UserId) -> Vec<LineItem> {
        self.lock().carts.get(&user_id).cloned().unwrap_or_default()
    }

    /// Current server-side favorites.
    #[must_use]
    pub fn favorites(&self) -> Vec<FavoriteEntry> {
        self.lock().favorites.clone()
    }

    /// Every call received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Calls received so far of `kind`.
    #[must_use]
    pub fn calls_of(&self, kind: CallKind) -> Vec<RemoteCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail every call of `kind` until [`clear_failures`](Self::clear_failures).
    pub fn fail_calls(&self, kind: CallKind) {
        self.lock().failing_kinds.insert(kind);
    }

    /// Fail the next `times` calls of `kind`.
    pub fn fail_next(&self, kind: CallKind, times: usize) {
        *self.lock().fail_next.entry(kind).or_default() += times;
    }

    /// Fail every create and favorite call for `product_id`.
    pub fn fail_product(&self, product_id: ProductId) {
        self.lock().failing_products.insert(product_id);
    }

    /// Fail every update and delete call for `line_item_id`.
    pub fn fail_line_item(&self, line_item_id: LineItemId) {
        self.lock().failing_line_items.insert(line_item_id);
    }

    /// Remove all failure rules.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_kinds.clear();
        state.fail_next.clear();
        state.failing_products.clear();
        state.failing_line_items.clear();
    }

    /// Hold every subsequent call until [`release`](Self::release).
    ///
    /// Calls are recorded when they arrive, before they wait.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Record `call`, decide whether it fails, then wait for the gate.
    async fn begin(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let failure = {
            let mut state = self.lock();
            let kind = call.kind();
            state.calls.push(call.clone());

            let scheduled = match state.fail_next.get_mut(&kind) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            let by_product = call
                .product_id()
                .is_some_and(|id| state.failing_products.contains(&id));
            let by_line = match &call {
                RemoteCall::Update { line_item_id, .. } | RemoteCall::Delete(line_item_id) => {
                    state.failing_line_items.contains(line_item_id)
                }
                _ => false,
            };

            scheduled || by_product || by_line || state.failing_kinds.contains(&kind)
        };

        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = gate.wait_for(|open| *open).await;

        if failure {
            debug!(?call, "Injected remote failure");
            return Err(RemoteError::Status {
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCartService for InMemoryCartService {
    async fn fetch_cart(&self, user_id: UserId) -> Result<Vec<LineItem>, RemoteError> {
        self.begin(RemoteCall::FetchCart(user_id)).await?;
        Ok(self.cart(user_id))
    }

    async fn create_line_item(&self, input: NewLineItem) -> Result<LineItem, RemoteError> {
        self.begin(RemoteCall::Create {
            product_id: input.product.id,
            quantity: input.quantity,
        })
        .await?;

        let mut state = self.lock();
        let next_id = state.next_line_item_id;
        let cart = state.carts.entry(input.user_id).or_default();

        if let Some(existing) = cart.iter_mut().find(|i| i.product_id == input.product.id) {
            existing.quantity = input.quantity;
            return Ok(existing.clone());
        }

        let mut item = LineItem::guest(&input.product, input.quantity);
        item.line_item_id = Some(LineItemId::new(next_id));
        cart.push(item.clone());
        state.next_line_item_id += 1;
        Ok(item)
    }

    async fn update_line_item(
        &self,
        id: LineItemId,
        quantity: Quantity,
    ) -> Result<LineItem, RemoteError> {
        self.begin(RemoteCall::Update {
            line_item_id: id,
            quantity,
        })
        .await?;

        let mut state = self.lock();
        let item = state
            .carts
            .values_mut()
            .flat_map(|cart| cart.iter_mut())
            .find(|i| i.line_item_id == Some(id))
            .ok_or_else(|| RemoteError::Status {
                status: 404,
                body: format!("line item {id} not found"),
            })?;
        item.quantity = quantity;
        Ok(item.clone())
    }

    async fn delete_line_item(&self, id: LineItemId) -> Result<(), RemoteError> {
        self.begin(RemoteCall::Delete(id)).await?;

        let mut state = self.lock();
        for cart in state.carts.values_mut() {
            cart.retain(|i| i.line_item_id != Some(id));
        }
        Ok(())
    }
}

#[async_trait]
impl FavoritesService for InMemoryCartService {
    async fn fetch_favorites(&self) -> Result<Vec<FavoriteEntry>, RemoteError> {
        self.begin(RemoteCall::FetchFavorites).await?;
        Ok(self.favorites())
    }

    async fn add_favorite(&self, product: &Product) -> Result<(), RemoteError> {
        self.begin(RemoteCall::AddFavorite(product.id)).await?;

        let mut state = self.lock();
        if !state.favorites.iter().any(|f| f.product_id == product.id) {
            state.favorites.push(FavoriteEntry::new(product.clone()));
        }
        Ok(())
    }

    async fn remove_favorite(&self, product_id: ProductId) -> Result<(), RemoteError> {
        self.begin(RemoteCall::RemoveFavorite(product_id)).await?;
        self.lock().favorites.retain(|f| f.product_id != product_id);
        Ok(())
    }
}
