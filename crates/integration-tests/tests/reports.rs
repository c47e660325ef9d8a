//! Integration tests for the admin reports.
//!
//! Reports aggregate the whole database, so the figures are checked as
//! differences around the orders created here. Keep this binary to a single
//! test so nothing else writes orders while it runs.
//!
//! These tests require a `PostgreSQL` database at `TEST_DATABASE_URL`.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;

use axum::http::StatusCode;
use rust_decimal::Decimal;

use suuq_core::{OrderStatus, PaymentMethod, PaymentStatus};
use suuq_integration_tests::{
    Browser, TEST_PASSWORD, TestContext, cart, guest_checkout, unique,
};
use suuq_server::db::{OrderRepository, PaymentRepository, ReportRepository};
use suuq_server::models::Order;
use suuq_server::models::payment::NewPayment;
use suuq_server::models::product::Product;
use suuq_server::models::store::Store;

struct Figures {
    month_revenue: Decimal,
    month_orders: i64,
    method_counts: HashMap<PaymentMethod, i64>,
}

async fn figures(ctx: &TestContext, month: &str) -> Figures {
    let reports = ReportRepository::new(&ctx.pool);
    let current = reports
        .revenue_by_month()
        .await
        .unwrap()
        .into_iter()
        .find(|row| row.month == month);
    Figures {
        month_revenue: current.as_ref().map_or(Decimal::ZERO, |row| row.revenue),
        month_orders: current.map_or(0, |row| row.orders),
        method_counts: reports
            .payment_methods()
            .await
            .unwrap()
            .into_iter()
            .map(|row| (row.payment_method, row.count))
            .collect(),
    }
}

async fn order_of(ctx: &TestContext, store: &Store, product: &Product, quantity: u32) -> Order {
    let entries = cart(&[(product, quantity)]);
    ctx.checkout()
        .place_order(&guest_checkout(store, &entries))
        .await
        .unwrap()
        .order
}

async fn pay(ctx: &TestContext, order: &Order, method: PaymentMethod, status: PaymentStatus) {
    PaymentRepository::new(&ctx.pool)
        .create(&NewPayment {
            order_id: order.id,
            payment_method: method,
            amount: order.total,
            currency: order.currency.clone(),
            status,
            transaction_id: Some(format!("rep-{}", unique())),
            gateway_response: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL (TEST_DATABASE_URL)"]
async fn test_report_figures() {
    let ctx = TestContext::new().await;
    let reports = ReportRepository::new(&ctx.pool);
    let month = chrono::Utc::now().format("%Y-%m").to_string();

    let before = figures(&ctx, &month).await;
    // Outsell every product already in the database.
    let ceiling = reports
        .top_products()
        .await
        .unwrap()
        .first()
        .map_or(0, |row| row.total_sold);
    let best_quantity = u32::try_from(ceiling + 5).unwrap();
    let runner_quantity = u32::try_from(ceiling + 2).unwrap();

    let owner = ctx.create_user(false).await;
    let store = ctx.create_store(&owner, &format!("Reports {}", unique())).await;
    let best = ctx
        .create_product(&store, "0.01", i32::try_from(best_quantity).unwrap())
        .await;
    let runner = ctx
        .create_product(&store, "0.02", i32::try_from(runner_quantity).unwrap() + 1)
        .await;

    let orders = OrderRepository::new(&ctx.pool);
    let paid = order_of(&ctx, &store, &best, best_quantity).await;
    orders.update_status(paid.id, OrderStatus::Paid).await.unwrap();
    let shipped = order_of(&ctx, &store, &runner, runner_quantity).await;
    orders
        .update_status(shipped.id, OrderStatus::Shipped)
        .await
        .unwrap();
    let pending = order_of(&ctx, &store, &runner, 1).await;

    pay(&ctx, &paid, PaymentMethod::EvcPlus, PaymentStatus::Completed).await;
    pay(&ctx, &shipped, PaymentMethod::EvcPlus, PaymentStatus::Pending).await;
    pay(&ctx, &pending, PaymentMethod::Stripe, PaymentStatus::Failed).await;

    let after = figures(&ctx, &month).await;

    // Only paid, shipped and delivered orders count as revenue.
    assert_eq!(after.month_orders - before.month_orders, 2);
    assert_eq!(
        after.month_revenue - before.month_revenue,
        paid.total + shipped.total
    );

    // Every attempt counts, whatever its status.
    let delta = |method| {
        after.method_counts.get(&method).copied().unwrap_or(0)
            - before.method_counts.get(&method).copied().unwrap_or(0)
    };
    assert_eq!(delta(PaymentMethod::EvcPlus), 2);
    assert_eq!(delta(PaymentMethod::Stripe), 1);
    assert_eq!(delta(PaymentMethod::Paypal), 0);

    // Units sold count every order line, pending orders included.
    let top = reports.top_products().await.unwrap();
    assert!(top.len() <= 10);
    assert_eq!(top[0].product_id, best.id);
    assert_eq!(top[0].total_sold, i64::from(best_quantity));
    assert_eq!(top[1].product_id, runner.id);
    assert_eq!(top[1].total_sold, i64::from(runner_quantity) + 1);
    assert!(top.windows(2).all(|pair| pair[0].total_sold >= pair[1].total_sold));

    // The admin page shows the same figures.
    let admin = ctx.create_user(true).await;
    let mut browser = Browser::new(ctx.app(ctx.config()));
    let login = browser
        .post_form(
            "/auth/login",
            &format!(
                "email={}&password={TEST_PASSWORD}",
                admin.email.as_str().replace('@', "%40")
            ),
        )
        .await;
    assert_eq!(login.status, StatusCode::SEE_OTHER);

    let page = browser.get("/admin/reports").await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains(&month));
    assert!(page.body.contains(&best.name));
    assert!(page.body.contains(&format!("<td>{}</td><td>{best_quantity}</td>", best.name)));
    assert!(page.body.contains(PaymentMethod::EvcPlus.label()));
}
