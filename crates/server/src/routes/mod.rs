//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                                    - Landing page
//! GET  /stores                              - Active stores
//! GET  /health, /health/ready               - Health checks
//! GET  /static/*                            - Static assets
//!
//! # Auth (POSTs rate limited)
//! GET  /auth/login, /auth/register          - Login and registration pages
//! POST /auth/login, /auth/register          - Log in / create account
//! POST /auth/logout                         - Log out
//!
//! # Store front
//! GET  /store/{slug}                                - Store page
//! GET  /store/{slug}/product/{id}                   - Product detail
//! GET  /store/{slug}/whatsapp-order/{id}            - Redirect to wa.me
//! GET  /store/{slug}/cart                           - Cart
//! POST /store/{slug}/add-to-cart/{id}               - Add to cart
//! POST /store/{slug}/remove-from-cart/{id}          - Remove from cart
//! GET  /store/{slug}/checkout                       - Checkout page + token
//! POST /store/{slug}/checkout                       - Place order
//! GET  /store/{slug}/order/{id}/confirmation        - Confirmation
//!
//! # Dashboard (login required)
//! GET  /dashboard                                   - Overview
//! GET  /dashboard/stores                            - Owner's stores
//! POST /dashboard/stores/new                        - Create store
//! GET  /dashboard/stores/{id}/products              - Store products
//! POST /dashboard/stores/{id}/products/new          - Create product
//! POST /dashboard/stores/{id}/products/{pid}/toggle - Show/hide product
//! GET  /dashboard/orders                            - Orders across stores
//!
//! # Admin (admin required)
//! GET  /admin                                       - Overview
//! GET  /admin/users                                 - Users (paged)
//! POST /admin/users/{id}/toggle-status              - Activate/deactivate
//! POST /admin/users/{id}/make-admin                 - Promote
//! GET  /admin/stores                                - Stores (paged)
//! POST /admin/stores/{id}/toggle-status             - Activate/deactivate
//! GET  /admin/orders?status=                        - Orders (paged)
//! GET  /admin/orders/{id}                           - Order detail
//! POST /admin/orders/{id}/update-status             - Set status
//! GET  /admin/payments                              - Payments (paged)
//! GET  /admin/reports                               - Reports
//!
//! # Payments (initiation rate limited)
//! POST /payment/stripe/create-payment-intent
//! POST /payment/stripe/webhook
//! POST /payment/paypal/create
//! GET  /payment/paypal/success
//! GET  /payment/paypal/cancel
//! POST /payment/{evc-plus|golis-saad|edahab}/initiate
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod dashboard;
pub mod health;
pub mod home;
pub mod payments;
pub mod store;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{
    auth_rate_limiter, create_session_layer, payment_rate_limiter, request_id_middleware,
    require_admin, require_login, security_headers_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let limiter = auth_rate_limiter();
    Router::new()
        .route(
            "/login",
            post(auth::login)
                .layer(limiter.clone())
                .get(auth::login_page),
        )
        .route(
            "/register",
            post(auth::register)
                .layer(limiter)
                .get(auth::register_page),
        )
        .route("/logout", post(auth::logout))
}

/// Create the public store front router.
pub fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/{slug}", get(store::show))
        .route("/{slug}/product/{product_id}", get(store::product))
        .route(
            "/{slug}/whatsapp-order/{product_id}",
            get(store::whatsapp_order),
        )
        .route("/{slug}/cart", get(cart::show))
        .route("/{slug}/add-to-cart/{product_id}", post(cart::add))
        .route("/{slug}/remove-from-cart/{product_id}", post(cart::remove))
        .route(
            "/{slug}/checkout",
            get(cart::checkout_page).post(cart::checkout),
        )
        .route(
            "/{slug}/order/{order_id}/confirmation",
            get(cart::confirmation),
        )
}

/// Create the owner dashboard router (login required).
pub fn dashboard_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::overview))
        .route("/stores", get(dashboard::stores))
        .route("/stores/new", post(dashboard::create_store))
        .route("/stores/{store_id}/products", get(dashboard::products))
        .route(
            "/stores/{store_id}/products/new",
            post(dashboard::create_product),
        )
        .route(
            "/stores/{store_id}/products/{product_id}/toggle",
            post(dashboard::toggle_product),
        )
        .route("/orders", get(dashboard::orders))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_login,
        ))
}

/// Create the administration router (admin required).
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(admin::overview))
        .route("/users", get(admin::users))
        .route("/users/{user_id}/toggle-status", post(admin::toggle_user))
        .route("/users/{user_id}/make-admin", post(admin::make_admin))
        .route("/stores", get(admin::stores))
        .route("/stores/{store_id}/toggle-status", post(admin::toggle_store))
        .route("/orders", get(admin::orders))
        .route("/orders/{order_id}", get(admin::order_detail))
        .route(
            "/orders/{order_id}/update-status",
            post(admin::update_order_status),
        )
        .route("/payments", get(admin::payments))
        .route("/reports", get(admin::reports))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ))
}

/// Create the payment router.
pub fn payment_routes() -> Router<AppState> {
    let limiter = payment_rate_limiter();
    Router::new()
        .route(
            "/stripe/create-payment-intent",
            post(payments::stripe_create_intent).layer(limiter.clone()),
        )
        .route("/stripe/webhook", post(payments::stripe_webhook))
        .route(
            "/paypal/create",
            post(payments::paypal_create).layer(limiter.clone()),
        )
        .route("/paypal/success", get(payments::paypal_success))
        .route("/paypal/cancel", get(payments::paypal_cancel))
        .route(
            "/{provider}/initiate",
            post(payments::mobile_money_initiate).layer(limiter),
        )
}

/// Create all routes.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/stores", get(home::stores))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes())
        .nest("/store", store_routes())
        .nest("/dashboard", dashboard_routes(state))
        .nest("/admin", admin_routes(state))
        .nest("/payment", payment_routes())
}

/// Static assets (the pay-button script).
const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// The complete application: routes, session, tracing and Sentry layers.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.pool(), state.config());

    Router::new()
        .merge(routes(&state))
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
