//! Integration tests for checkout against a real database.
//!
//! These tests require a `PostgreSQL` database at `TEST_DATABASE_URL`.
//!
//! Run with: cargo test -p suuq-integration-tests -- --ignored

use std::sync::Arc;

use suuq_core::OrderStatus;
use suuq_integration_tests::{TestContext, cart, dec, guest_checkout, unique};
use suuq_server::db::OrderRepository;
use suuq_server::models::cart::StoreCart;
use suuq_server::services::checkout::CheckoutError;

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_stock_decrements_by_quantity_per_order() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Stock {}", unique())).await;
    let product = ctx.create_product(&store, "4.50", 10).await;

    let entries = cart(&[(&product, 3)]);
    for _ in 0..3 {
        let placed = ctx
            .checkout()
            .place_order(&guest_checkout(&store, &entries))
            .await
            .expect("checkout succeeds");
        assert!(placed.created);
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.total, dec("13.50"));
    }

    assert_eq!(ctx.stock(product.id).await, 1);

    let err = ctx
        .checkout()
        .place_order(&guest_checkout(&store, &entries))
        .await
        .expect_err("only one left");
    assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    assert_eq!(ctx.stock(product.id).await, 1);
    assert_eq!(ctx.order_count(&store).await, 3);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_order_lines_snapshot_name_and_price() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Lines {}", unique())).await;
    let tea = ctx.create_product(&store, "2.25", 50).await;
    let honey = ctx.create_product(&store, "11.00", 5).await;

    let entries = cart(&[(&tea, 4), (&honey, 1)]);
    let placed = ctx
        .checkout()
        .place_order(&guest_checkout(&store, &entries))
        .await
        .expect("checkout succeeds");

    let items = OrderRepository::new(&ctx.pool)
        .items(placed.order.id)
        .await
        .expect("load items");
    assert_eq!(items.len(), 2);

    let subtotal: rust_decimal::Decimal = items.iter().map(|item| item.total).sum();
    assert_eq!(subtotal, dec("20.00"));
    assert_eq!(placed.order.subtotal, subtotal);
    assert!(items.iter().any(|i| i.product_name == tea.name && i.price == tea.price));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_concurrent_checkouts_for_last_unit() {
    let ctx = Arc::new(TestContext::new().await);
    let owner = ctx.create_user(false).await;
    let store = Arc::new(ctx.create_store(&owner, &format!("Race {}", unique())).await);
    let product = ctx.create_product(&store, "9.99", 1).await;
    let entries: Arc<StoreCart> = Arc::new(cart(&[(&product, 1)]));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ctx = Arc::clone(&ctx);
        let store = Arc::clone(&store);
        let entries = Arc::clone(&entries);
        handles.push(tokio::spawn(async move {
            ctx.checkout()
                .place_order(&guest_checkout(&store, &entries))
                .await
                .map(|placed| placed.order.id)
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(_) => successes += 1,
            Err(CheckoutError::InsufficientStock { product_id, .. }) => {
                assert_eq!(product_id, product.id);
            }
            Err(other) => panic!("unexpected checkout error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(ctx.stock(product.id).await, 0);
    assert_eq!(ctx.order_count(&store).await, 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_empty_cart_creates_no_order() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Empty {}", unique())).await;

    let entries = StoreCart::new();
    let err = ctx
        .checkout()
        .place_order(&guest_checkout(&store, &entries))
        .await
        .expect_err("empty cart is rejected");

    assert!(matches!(err, CheckoutError::EmptyCart));
    assert_eq!(ctx.order_count(&store).await, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_inactive_product_blocks_checkout() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Hidden {}", unique())).await;
    let product = ctx.create_product(&store, "3.00", 5).await;

    suuq_server::db::ProductRepository::new(&ctx.pool)
        .toggle_active(store.id, product.id)
        .await
        .expect("hide product");

    let entries = cart(&[(&product, 1)]);
    let err = ctx
        .checkout()
        .place_order(&guest_checkout(&store, &entries))
        .await
        .expect_err("hidden product cannot be bought");

    assert!(matches!(err, CheckoutError::UnavailableItems(ref names) if names == &[product.name.clone()]));
    assert_eq!(ctx.stock(product.id).await, 5);
    assert_eq!(ctx.order_count(&store).await, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_resubmitted_token_returns_same_order() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Replay {}", unique())).await;
    let product = ctx.create_product(&store, "6.00", 10).await;

    let entries = cart(&[(&product, 2)]);
    let request = guest_checkout(&store, &entries);

    let first = ctx.checkout().place_order(&request).await.expect("first submit");
    let second = ctx.checkout().place_order(&request).await.expect("second submit");

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.order.id, second.order.id);
    assert_eq!(ctx.stock(product.id).await, 8);
    assert_eq!(ctx.order_count(&store).await, 1);
}
