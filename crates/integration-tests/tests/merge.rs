//! Integration tests for the guest→remote merge on sign-in.

use std::sync::Arc;

use cart_sync::engine::{MergePolicy, Session, SyncState};
use cart_sync::guest::{GUEST_CART_KEY, GuestCartRepository, GuestStore, MemoryGuestStore};
use cart_sync::notify::NotificationLevel;
use cart_sync::remote::{CallKind, RemoteCall};
use cart_sync_core::{Identity, ProductId, UserId};
use cart_sync_integration_tests::{ALICE, TestContext, product, qty};

// =============================================================================
// Additive Merge
// =============================================================================

#[tokio::test]
async fn test_overlapping_product_is_summed() {
    let mut ctx = TestContext::new();
    ctx.service.seed_cart(ALICE, &[(product(1, 300), qty(2))]);
    ctx.guest_with(&[(product(1, 300), qty(3))]).await;

    let report = ctx.sign_in(ALICE).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 0);
    let remote = ctx.service.cart(ALICE);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].quantity, qty(5));
    assert_eq!(ctx.engine.cart().items(), remote);
    assert_eq!(
        ctx.notification_levels().last(),
        Some(&NotificationLevel::Success)
    );
}

#[tokio::test]
async fn test_new_products_are_created() {
    let ctx = TestContext::new();
    ctx.service.seed_cart(ALICE, &[(product(1, 300), qty(1))]);
    ctx.guest_with(&[(product(2, 150), qty(2)), (product(3, 99), qty(1))])
        .await;

    let report = ctx.sign_in(ALICE).await.unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(ctx.service.calls_of(CallKind::Create).len(), 2);
    assert_eq!(ctx.engine.cart().items().len(), 3);
    assert_eq!(ctx.engine.cart().item_count(), 4);
}

#[tokio::test]
async fn test_guest_cart_is_cleared_after_merge() {
    let ctx = TestContext::new();
    ctx.guest_with(&[(product(1, 300), qty(1))]).await;
    assert!(ctx.guest_store.get(GUEST_CART_KEY).unwrap().is_some());

    ctx.sign_in(ALICE).await;

    assert_eq!(ctx.guest_store.get(GUEST_CART_KEY).unwrap(), None);
    assert_eq!(ctx.engine.state(), SyncState::Authenticated);
}

#[tokio::test]
async fn test_keep_max_policy() {
    let ctx = TestContext::with_policy(MergePolicy::KeepMax);
    ctx.service
        .seed_cart(ALICE, &[(product(1, 300), qty(4)), (product(2, 300), qty(1))]);
    ctx.guest_with(&[(product(1, 300), qty(3)), (product(2, 300), qty(2))])
        .await;

    let report = ctx.sign_in(ALICE).await.unwrap();

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.updated, 1);
    let quantities: Vec<u32> = ctx
        .service
        .cart(ALICE)
        .iter()
        .map(|line| line.quantity.get())
        .collect();
    assert_eq!(quantities, vec![4, 2]);
}

// =============================================================================
// Call Budget
// =============================================================================

#[tokio::test]
async fn test_empty_guest_cart_costs_one_fetch() {
    let ctx = TestContext::new();
    ctx.service.seed_cart(ALICE, &[(product(1, 300), qty(2))]);
    ctx.guest_with(&[]).await;

    let report = ctx.sign_in(ALICE).await;

    assert!(report.is_none());
    assert_eq!(ctx.service.calls(), vec![RemoteCall::FetchCart(ALICE)]);
    assert_eq!(ctx.engine.cart().items().len(), 1);
}

#[tokio::test]
async fn test_guest_duplicates_make_one_call() {
    let ctx = TestContext::new();
    ctx.engine.start(Session::Anonymous).await.unwrap();
    // Hand-edited storage can hold the same product twice.
    ctx.guest_store
        .set(
            GUEST_CART_KEY,
            &format!(
                r#"{{"version":1,"saved_at":"2026-10-01T12:00:00Z","items":[{a},{b}]}}"#,
                a = r#"{"product_id":1,"product_name":"Product 1","unit_price":{"amount":"3.00","currency_code":"USD"},"quantity":1}"#,
                b = r#"{"product_id":1,"product_name":"Product 1","unit_price":{"amount":"3.00","currency_code":"USD"},"quantity":2}"#,
            ),
        )
        .unwrap();

    let report = ctx.sign_in(ALICE).await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(
        ctx.service.calls_of(CallKind::Create),
        vec![RemoteCall::Create {
            product_id: ProductId::new(1),
            quantity: qty(3),
        }]
    );
}

#[tokio::test]
async fn test_merge_runs_once_per_sign_in() {
    let ctx = TestContext::new();
    ctx.guest_with(&[(product(1, 300), qty(1))]).await;

    ctx.sign_in(ALICE).await;
    ctx.sign_in(ALICE).await;
    ctx.engine.refresh().await.unwrap();

    assert_eq!(ctx.service.calls_of(CallKind::Create).len(), 1);
    assert_eq!(ctx.service.cart(ALICE)[0].quantity, qty(1));
}

#[tokio::test]
async fn test_concurrent_sign_in_merges_once() {
    let ctx = TestContext::new();
    ctx.guest_with(&[(product(1, 300), qty(2))]).await;
    let identity = Identity::customer(ALICE);

    let (first, second) = tokio::join!(
        ctx.engine.auth_resolved(identity),
        ctx.engine.auth_resolved(identity)
    );

    assert!(first.unwrap().is_some() ^ second.unwrap().is_some());
    assert_eq!(ctx.service.cart(ALICE)[0].quantity, qty(2));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_partial_failure_warns_once_and_clears_guest() {
    let mut ctx = TestContext::new();
    ctx.guest_with(&[
        (product(1, 300), qty(1)),
        (product(2, 300), qty(1)),
        (product(3, 300), qty(1)),
    ])
    .await;
    ctx.notifications();
    ctx.service.fail_product(ProductId::new(2));
    ctx.service.fail_product(ProductId::new(3));

    let report = ctx.sign_in(ALICE).await.unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(ctx.engine.state(), SyncState::Authenticated);
    assert_eq!(ctx.guest_store.get(GUEST_CART_KEY).unwrap(), None);
    assert_eq!(ctx.engine.cart().items().len(), 1);

    let warnings: Vec<_> = ctx
        .notifications()
        .into_iter()
        .filter(|n| n.level == NotificationLevel::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("Product 2"));
}

#[tokio::test]
async fn test_failed_initial_fetch_keeps_guest_cart() {
    let mut ctx = TestContext::new();
    ctx.guest_with(&[(product(1, 300), qty(2))]).await;
    ctx.notifications();
    ctx.service.fail_next(CallKind::FetchCart, 1);

    let report = ctx.sign_in(ALICE).await;

    assert!(report.is_none());
    assert_eq!(ctx.engine.state(), SyncState::Authenticated);
    assert!(ctx.engine.merge_pending());
    assert!(ctx.engine.cart().items().is_empty());
    assert!(ctx.guest_store.get(GUEST_CART_KEY).unwrap().is_some());
    assert_eq!(ctx.notification_levels(), vec![NotificationLevel::Error]);

    let report = ctx.sign_in(ALICE).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(ctx.engine.cart().item_count(), 2);
}

#[tokio::test]
async fn test_add_after_failed_initial_fetch_adds_to_server_quantity() {
    let ctx = TestContext::new();
    ctx.service.seed_cart(ALICE, &[(product(1, 300), qty(3))]);
    ctx.engine.start(Session::Anonymous).await.unwrap();
    ctx.service.fail_next(CallKind::FetchCart, 1);
    ctx.sign_in(ALICE).await;

    ctx.engine
        .cart()
        .add_item(&product(1, 300), qty(1))
        .await
        .unwrap();

    let remote = ctx.service.cart(ALICE);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].quantity, qty(4));
    assert!(ctx.service.calls_of(CallKind::Create).is_empty());
}

// =============================================================================
// Guest Storage Over Quota
// =============================================================================

#[tokio::test]
async fn test_lines_over_storage_quota_are_still_merged() {
    let guest_store = Arc::new(MemoryGuestStore::with_quota(400));
    let ctx = TestContext::with_guest_store(guest_store.clone(), MergePolicy::Sum);
    let lines: Vec<_> = (1..=5).map(|id| (product(id, 100), qty(1))).collect();
    ctx.guest_with(&lines).await;

    let stored = GuestCartRepository::new(guest_store.clone()).load().unwrap();
    assert!(stored.len() < lines.len());
    assert_eq!(ctx.engine.cart().items().len(), lines.len());

    let report = ctx.sign_in(ALICE).await.unwrap();

    assert_eq!(report.created, lines.len());
    assert!(report.is_clean());
    assert_eq!(ctx.service.cart(ALICE).len(), lines.len());
    assert_eq!(ctx.engine.cart().item_count(), 5);
    assert_eq!(guest_store.get(GUEST_CART_KEY).unwrap(), None);
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test]
async fn test_sign_out_returns_to_empty_guest_cart() {
    let ctx = TestContext::new();
    ctx.guest_with(&[(product(1, 300), qty(1))]).await;
    ctx.sign_in(ALICE).await;

    ctx.engine.sign_out();
    ctx.favorites.set_identity(None);

    assert_eq!(ctx.engine.state(), SyncState::Guest);
    assert!(ctx.engine.cart().items().is_empty());
    ctx.engine
        .cart()
        .add_item(&product(9, 100), qty(1))
        .await
        .unwrap();
    assert_eq!(ctx.service.cart(ALICE).len(), 1);
}

#[tokio::test]
async fn test_switching_users_does_not_leak_carts() {
    let ctx = TestContext::new();
    let bob = UserId::new(2002);
    ctx.service.seed_cart(bob, &[(product(5, 100), qty(1))]);
    ctx.engine
        .start(Session::Authenticated(Identity::customer(ALICE)))
        .await
        .unwrap();
    ctx.engine
        .cart()
        .add_item(&product(1, 300), qty(1))
        .await
        .unwrap();

    ctx.sign_in(bob).await;

    let items = ctx.engine.cart().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, ProductId::new(5));
    assert_eq!(ctx.service.cart(bob).len(), 1);
}
