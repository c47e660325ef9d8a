//! Integration tests for the Stripe webhook endpoint.
//!
//! These tests require a `PostgreSQL` database at `TEST_DATABASE_URL`.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::json;
use sha2::Sha256;
use tower::ServiceExt;

use suuq_core::{OrderId, OrderStatus, PaymentMethod, PaymentStatus};
use suuq_integration_tests::{TestContext, cart, guest_checkout, unique};
use suuq_server::config::StripeConfig;
use suuq_server::db::{OrderRepository, PaymentRepository};
use suuq_server::models::Order;
use suuq_server::models::payment::NewPayment;

const WEBHOOK_SECRET: &str = "whsec_integration_0123456789";

fn stripe_app(ctx: &TestContext) -> Router {
    let mut config = ctx.config();
    config.payments.stripe = Some(StripeConfig {
        secret_key: SecretString::from("sk_test_integration"),
        webhook_secret: Some(SecretString::from(WEBHOOK_SECRET)),
        api_base: "http://127.0.0.1:1".to_string(),
    });
    ctx.app(config)
}

fn sign(payload: &str, secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn event(kind: &str, intent_id: &str, order_id: OrderId, amount_minor: i64) -> String {
    json!({
        "id": format!("evt_{}", unique()),
        "type": kind,
        "data": {
            "object": {
                "id": intent_id,
                "amount": amount_minor,
                "currency": "usd",
                "metadata": { "order_id": order_id.to_string() },
                "last_payment_error": { "message": "card declined" }
            }
        }
    })
    .to_string()
}

async fn deliver(app: &Router, payload: String, signature: &str) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payment/stripe/webhook")
                .header("content-type", "application/json")
                .header("stripe-signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

/// A pending order with a pending Stripe payment for `intent_id`.
async fn pending_stripe_order(ctx: &TestContext, intent_id: &str) -> Order {
    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Cards {}", unique())).await;
    let product = ctx.create_product(&store, "12.50", 5).await;
    let entries = cart(&[(&product, 2)]);

    let order = ctx
        .checkout()
        .place_order(&guest_checkout(&store, &entries))
        .await
        .unwrap()
        .order;

    PaymentRepository::new(&ctx.pool)
        .create(&NewPayment {
            order_id: order.id,
            payment_method: PaymentMethod::Stripe,
            amount: order.total,
            currency: order.currency.clone(),
            status: PaymentStatus::Pending,
            transaction_id: Some(intent_id.to_string()),
            gateway_response: None,
        })
        .await
        .unwrap();
    order
}

async fn statuses(ctx: &TestContext, order_id: OrderId) -> (OrderStatus, Vec<PaymentStatus>) {
    let order = OrderRepository::new(&ctx.pool)
        .get_by_id(order_id)
        .await
        .unwrap()
        .unwrap();
    let payments = PaymentRepository::new(&ctx.pool)
        .list_for_order(order_id)
        .await
        .unwrap();
    (order.status, payments.into_iter().map(|p| p.status).collect())
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_bad_signature_changes_nothing() {
    let ctx = TestContext::new().await;
    let app = stripe_app(&ctx);
    let intent_id = format!("pi_{}", unique());
    let order = pending_stripe_order(&ctx, &intent_id).await;

    let payload = event("payment_intent.succeeded", &intent_id, order.id, 2500);
    let forged = sign(&payload, "whsec_someone_else");

    assert_eq!(deliver(&app, payload, &forged).await, StatusCode::BAD_REQUEST);
    assert_eq!(
        statuses(&ctx, order.id).await,
        (OrderStatus::Pending, vec![PaymentStatus::Pending])
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_succeeded_event_marks_order_paid_once() {
    let ctx = TestContext::new().await;
    let app = stripe_app(&ctx);
    let intent_id = format!("pi_{}", unique());
    let order = pending_stripe_order(&ctx, &intent_id).await;

    let payload = event("payment_intent.succeeded", &intent_id, order.id, 2500);
    let signature = sign(&payload, WEBHOOK_SECRET);

    assert_eq!(deliver(&app, payload.clone(), &signature).await, StatusCode::OK);
    assert_eq!(
        statuses(&ctx, order.id).await,
        (OrderStatus::Paid, vec![PaymentStatus::Completed])
    );

    // Stripe retries deliveries; a replay must not add rows.
    assert_eq!(deliver(&app, payload, &signature).await, StatusCode::OK);
    assert_eq!(
        statuses(&ctx, order.id).await,
        (OrderStatus::Paid, vec![PaymentStatus::Completed])
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_underpayment_leaves_order_pending() {
    let ctx = TestContext::new().await;
    let app = stripe_app(&ctx);
    let intent_id = format!("pi_{}", unique());
    let order = pending_stripe_order(&ctx, &intent_id).await;

    let payload = event("payment_intent.succeeded", &intent_id, order.id, 100);
    let signature = sign(&payload, WEBHOOK_SECRET);

    assert_eq!(deliver(&app, payload, &signature).await, StatusCode::OK);
    let (status, _) = statuses(&ctx, order.id).await;
    assert_eq!(status, OrderStatus::Pending);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_failed_event_marks_payment_failed() {
    let ctx = TestContext::new().await;
    let app = stripe_app(&ctx);
    let intent_id = format!("pi_{}", unique());
    let order = pending_stripe_order(&ctx, &intent_id).await;

    let payload = event("payment_intent.payment_failed", &intent_id, order.id, 2500);
    let signature = sign(&payload, WEBHOOK_SECRET);

    assert_eq!(deliver(&app, payload, &signature).await, StatusCode::OK);
    assert_eq!(
        statuses(&ctx, order.id).await,
        (OrderStatus::Pending, vec![PaymentStatus::Failed])
    );
}
