//! Integration tests for the store front through the HTTP stack: pages,
//! cart and the checkout form.
//!
//! These tests require a `PostgreSQL` database at `TEST_DATABASE_URL`.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;

use suuq_integration_tests::{Browser, TestContext, checkout_form, order_id_in, unique};
use suuq_server::db::OrderRepository;

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_pages_render_html() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Pages {}", unique())).await;
    let product = ctx.create_product(&store, "3.00", 4).await;
    let mut browser = Browser::new(ctx.app(ctx.config()));

    for uri in [
        "/".to_string(),
        "/stores".to_string(),
        format!("/store/{}", store.slug),
        format!("/store/{}/product/{}", store.slug, product.id),
        format!("/store/{}/cart", store.slug),
        "/auth/register".to_string(),
    ] {
        let page = browser.get(&uri).await;
        assert_eq!(page.status, StatusCode::OK, "{uri}");
        assert!(page.body.starts_with("<!DOCTYPE html>"), "{uri}");
    }

    let shown = browser.get(&format!("/store/{}", store.slug)).await;
    assert!(shown.body.contains(&store.name));
    assert!(shown.body.contains(&format!(
        r#"action="/store/{}/add-to-cart/{}""#,
        store.slug, product.id
    )));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_checkout_token_is_consumed_and_replay_redirects() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Forms {}", unique())).await;
    let product = ctx.create_product(&store, "6.00", 10).await;
    let mut browser = Browser::new(ctx.app(ctx.config()));

    browser
        .post_form(
            &format!("/store/{}/add-to-cart/{}", store.slug, product.id),
            "quantity=2",
        )
        .await;
    let cart = browser.get(&format!("/store/{}/cart", store.slug)).await;
    assert!(cart.body.contains("12.00"), "{}", cart.body);

    let page = browser.get(&format!("/store/{}/checkout", store.slug)).await;
    assert_eq!(page.status, StatusCode::OK);
    let token = page.input_value("checkout_token").unwrap();
    assert!(page.body.contains(r#"value="cod""#));

    let checkout_uri = format!("/store/{}/checkout", store.slug);
    let placed = browser.post_form(&checkout_uri, &checkout_form(&token)).await;
    assert_eq!(placed.status, StatusCode::SEE_OTHER);
    let confirmation = placed.location.unwrap();
    assert_eq!(ctx.order_count(&store).await, 1);
    assert_eq!(ctx.stock(product.id).await, 8);

    // The cart is empty now, so the checkout page sends the visitor back.
    let emptied = browser.get(&checkout_uri).await;
    assert_eq!(emptied.status, StatusCode::SEE_OTHER);
    assert_eq!(emptied.location.as_deref(), Some(format!("/store/{}", store.slug).as_str()));

    // Same form posted again: back to the same order, nothing new.
    let replayed = browser.post_form(&checkout_uri, &checkout_form(&token)).await;
    assert_eq!(replayed.status, StatusCode::SEE_OTHER);
    assert_eq!(replayed.location.as_deref(), Some(confirmation.as_str()));
    assert_eq!(ctx.order_count(&store).await, 1);
    assert_eq!(ctx.stock(product.id).await, 8);

    let shown = browser.get(&confirmation).await;
    assert_eq!(shown.status, StatusCode::OK);
    let order = OrderRepository::new(&ctx.pool)
        .get_by_id(order_id_in(&confirmation))
        .await
        .unwrap()
        .unwrap();
    assert!(shown.body.contains(&order.order_number.to_string()));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_stale_or_foreign_token_is_rejected() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Stale {}", unique())).await;
    let product = ctx.create_product(&store, "2.00", 10).await;
    let mut browser = Browser::new(ctx.app(ctx.config()));
    let checkout_uri = format!("/store/{}/checkout", store.slug);

    let confirmation = browser.place_order(&store, &product, 1).await;
    let first_order = order_id_in(&confirmation);
    let used_token = OrderRepository::new(&ctx.pool)
        .get_by_id(first_order)
        .await
        .unwrap()
        .unwrap()
        .checkout_token
        .unwrap();

    // Another visitor replaying someone else's token gets nothing.
    let mut stranger = browser.stranger();
    stranger
        .post_form(
            &format!("/store/{}/add-to-cart/{}", store.slug, product.id),
            "quantity=1",
        )
        .await;
    let foreign = stranger.post_form(&checkout_uri, &checkout_form(&used_token)).await;
    assert_eq!(foreign.status, StatusCode::BAD_REQUEST);
    assert_eq!(stranger.get(&confirmation).await.status, StatusCode::NOT_FOUND);

    // A token never issued to this session is refused, the issued one works.
    browser
        .post_form(
            &format!("/store/{}/add-to-cart/{}", store.slug, product.id),
            "quantity=1",
        )
        .await;
    let page = browser.get(&checkout_uri).await;
    let fresh = page.input_value("checkout_token").unwrap();
    assert_ne!(fresh, used_token);

    let stale = browser
        .post_form(&checkout_uri, &checkout_form("notissuedtoken0000000000000000"))
        .await;
    assert_eq!(stale.status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.order_count(&store).await, 1);

    let placed = browser.post_form(&checkout_uri, &checkout_form(&fresh)).await;
    assert_eq!(placed.status, StatusCode::SEE_OTHER);
    assert_ne!(placed.location.as_deref(), Some(confirmation.as_str()));
    assert_eq!(ctx.order_count(&store).await, 2);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_confirmation_reports_only_known_outcomes() {
    let ctx = TestContext::new().await;
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Outcome {}", unique())).await;
    let product = ctx.create_product(&store, "1.50", 3).await;
    let mut browser = Browser::new(ctx.app(ctx.config()));

    let confirmation = browser.place_order(&store, &product, 1).await;

    let completed = browser.get(&format!("{confirmation}?payment=completed")).await;
    assert!(completed.body.contains("Payment completed."));

    let bogus = browser.get(&format!("{confirmation}?payment=hacked")).await;
    assert_eq!(bogus.status, StatusCode::OK);
    assert!(!bogus.body.contains("hacked"));

    // Cash on delivery only: nothing to pay online.
    assert!(!bogus.body.contains(r#"class="pay""#));
}
