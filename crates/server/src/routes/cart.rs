//! Cart, checkout and order confirmation handlers.
//!
//! # Checkout tokens
//!
//! `GET /store/{slug}/checkout` issues a random token kept in the session
//! under `checkout_token:{store_id}`; the form must echo it. A successful
//! submit consumes the token, so the same form posted again (double click,
//! browser retry) resolves to the order it already created.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use rand::{Rng, distr::Alphanumeric};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use suuq_core::{OrderId, OrderStatus, PaymentMethod, ProductId};

use crate::db::OrderRepository;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalUser;
use crate::models::session::{checkout_token_key, placed_orders, remember_placed_order};
use crate::models::{Cart, CurrentUser, Order, OrderItem, OrderWithItems, Store};
use crate::routes::payments::PaymentOption;
use crate::routes::store::{active_product, active_store};
use crate::services::cart::CartView;
use crate::services::checkout::{CheckoutError, CheckoutRequest, CheckoutService};
use crate::services::email::OrderConfirmation;
use crate::state::AppState;

/// Length of a checkout token.
const CHECKOUT_TOKEN_LEN: usize = 32;

/// Payment outcomes the confirmation page reports back.
const PAYMENT_OUTCOMES: [&str; 3] = ["completed", "failed", "cancelled"];

#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub store: Store,
    pub cart: CartView,
}

#[derive(Template, WebTemplate)]
#[template(path = "cart/checkout.html")]
pub struct CheckoutTemplate {
    pub store: Store,
    pub cart: CartView,
    pub checkout_token: String,
    pub payment_methods: Vec<PaymentMethod>,
}

#[derive(Template, WebTemplate)]
#[template(path = "cart/confirmation.html")]
pub struct ConfirmationTemplate {
    pub store: Store,
    pub order: Order,
    pub items: Vec<OrderItem>,
    /// Set when the buyer comes back from a payment provider.
    pub payment_outcome: Option<String>,
    /// Empty once the order is no longer pending.
    pub payment_options: Vec<PaymentOption>,
}

/// `?payment=` on the confirmation page.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmationQuery {
    pub payment: Option<String>,
}

/// Add-to-cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub quantity: Option<u32>,
}

/// Checkout form data.
#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    pub checkout_token: String,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
}

fn cart_path(store: &Store) -> String {
    format!("/store/{}/cart", store.slug)
}

/// Path of an order's confirmation page.
pub(crate) fn confirmation_path(store: &Store, order_id: OrderId) -> String {
    format!("/store/{}/order/{order_id}/confirmation", store.slug)
}

/// Whether this visitor may see (and pay for) `order`: its customer, the
/// session that placed it, or an administrator.
pub(crate) fn can_view_order(user: Option<&CurrentUser>, placed: &[OrderId], order: &Order) -> bool {
    placed.contains(&order.id)
        || user.is_some_and(|u| u.is_admin || order.customer_id == Some(u.id))
}

/// The cart for one store.
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<CartTemplate> {
    let store = active_store(&state, &slug).await?;
    let cart = Cart::load(&session).await?;
    let view = CartView::load(
        state.pool(),
        store.id,
        cart.store(store.id),
        state.config().checkout.price_policy,
    )
    .await?;
    Ok(CartTemplate { store, cart: view })
}

/// Add a product to the cart.
///
/// Stock is not checked here; checkout does that atomically.
#[instrument(skip(state, session, form))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Path((slug, product_id)): Path<(String, ProductId)>,
    Form(form): Form<AddToCartForm>,
) -> Result<Redirect> {
    let quantity = form.quantity.unwrap_or(1);
    if quantity == 0 {
        return Err(AppError::BadRequest("quantity must be at least 1".to_owned()));
    }

    let store = active_store(&state, &slug).await?;
    let product = active_product(&state, &store, product_id).await?;

    let mut cart = Cart::load(&session).await?;
    let line_quantity = cart.add(store.id, product.id, quantity, product.price);
    cart.save(&session).await?;

    tracing::debug!(%product_id, line_quantity, "added to cart");
    Ok(Redirect::to(&cart_path(&store)))
}

/// Remove a product from the cart. Removing an absent product is a no-op.
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path((slug, product_id)): Path<(String, ProductId)>,
) -> Result<Redirect> {
    let store = active_store(&state, &slug).await?;

    let mut cart = Cart::load(&session).await?;
    if cart.remove(store.id, product_id) {
        cart.save(&session).await?;
    }
    Ok(Redirect::to(&cart_path(&store)))
}

/// Checkout page: the priced cart plus a checkout token.
#[instrument(skip(state, session))]
pub async fn checkout_page(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<Response> {
    let store = active_store(&state, &slug).await?;
    let cart = Cart::load(&session).await?;
    let view = CartView::load(
        state.pool(),
        store.id,
        cart.store(store.id),
        state.config().checkout.price_policy,
    )
    .await?;
    if view.is_empty() {
        return Ok(Redirect::to(&format!("/store/{}", store.slug)).into_response());
    }

    let token_key = checkout_token_key(store.id);
    let checkout_token = match session.get::<String>(&token_key).await? {
        Some(token) => token,
        None => {
            let token = new_checkout_token();
            session.insert(&token_key, &token).await?;
            token
        }
    };

    Ok(CheckoutTemplate {
        store,
        cart: view,
        checkout_token,
        payment_methods: state.payment_methods(),
    }
    .into_response())
}

/// Place the order.
#[instrument(skip(state, session, user, form))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Path(slug): Path<String>,
    Form(form): Form<CheckoutForm>,
) -> Result<Redirect> {
    let store = active_store(&state, &slug).await?;

    let token_key = checkout_token_key(store.id);
    let issued = session.get::<String>(&token_key).await?;
    if issued.as_deref() != Some(form.checkout_token.as_str()) {
        return resubmitted(&state, &session, &store, &form.checkout_token).await;
    }

    let shipping_address = form.shipping_address.trim();
    if shipping_address.is_empty() {
        return Err(AppError::BadRequest("shipping address is required".to_owned()));
    }
    if !state.payment_methods().contains(&form.payment_method) {
        return Err(AppError::BadRequest(format!(
            "{} is not available",
            form.payment_method.label()
        )));
    }

    let mut cart = Cart::load(&session).await?;
    let entries = cart.store(store.id).cloned().unwrap_or_default();
    let checkout = &state.config().checkout;
    let placed = CheckoutService::new(state.pool(), checkout.price_policy, &checkout.default_currency)
        .place_order(&CheckoutRequest {
            store_id: store.id,
            customer_id: user.as_ref().map(|u| u.id),
            entries: &entries,
            checkout_token: form.checkout_token.clone(),
            payment_method: Some(form.payment_method),
            shipping_address: Some(shipping_address.to_owned()),
            notes: form
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_owned),
        })
        .await?;

    cart.clear(store.id);
    cart.save(&session).await?;
    session.remove::<String>(&token_key).await?;
    remember_placed_order(&session, placed.order.id).await?;

    let path = confirmation_path(&store, placed.order.id);
    if placed.created {
        let order_id = placed.order.id.to_string();
        add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order_id.as_str())]));
        tracing::info!(order_id = %placed.order.id, order_number = %placed.order.order_number, "order placed");
        if let Some(user) = user {
            send_confirmation(&state, user, &store, placed.order, &path);
        }
    }

    Ok(Redirect::to(&path))
}

/// A submit whose token is no longer in the session: either a replay of an
/// order this session already placed, or a stale form.
async fn resubmitted(
    state: &AppState,
    session: &Session,
    store: &Store,
    token: &str,
) -> Result<Redirect> {
    let placed = placed_orders(session).await?;
    let order = OrderRepository::new(state.pool())
        .get_by_checkout_token(token)
        .await?
        .filter(|order| order.store_id == store.id && placed.contains(&order.id))
        .ok_or(CheckoutError::InvalidToken)?;

    tracing::info!(order_id = %order.id, "checkout resubmitted");
    Ok(Redirect::to(&confirmation_path(store, order.id)))
}

/// Order confirmation page.
#[instrument(skip(state, session, user))]
pub async fn confirmation(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Path((slug, order_id)): Path<(String, OrderId)>,
    Query(query): Query<ConfirmationQuery>,
) -> Result<ConfirmationTemplate> {
    let store = active_store(&state, &slug).await?;
    let orders = OrderRepository::new(state.pool());
    let not_found = || AppError::NotFound(format!("order {order_id}"));

    let order = orders
        .get_in_store(store.id, order_id)
        .await?
        .ok_or_else(not_found)?;
    let placed = placed_orders(&session).await?;
    if !can_view_order(user.as_ref(), &placed, &order) {
        return Err(not_found());
    }

    let OrderWithItems { order, items, .. } =
        orders.get_with_details(order.id).await?.ok_or_else(not_found)?;
    let payment_options = if order.status == OrderStatus::Pending {
        state
            .payment_methods()
            .into_iter()
            .filter_map(PaymentOption::for_method)
            .collect()
    } else {
        Vec::new()
    };

    Ok(ConfirmationTemplate {
        store,
        order,
        items,
        payment_outcome: payment_outcome(query.payment),
        payment_options,
    })
}

/// Only known outcomes are echoed back to the page.
fn payment_outcome(raw: Option<String>) -> Option<String> {
    raw.filter(|outcome| PAYMENT_OUTCOMES.contains(&outcome.as_str()))
}

fn new_checkout_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CHECKOUT_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Email the order confirmation in the background. Failures are logged only.
fn send_confirmation(state: &AppState, user: CurrentUser, store: &Store, order: Order, path: &str) {
    let Some(mailer) = state.email().cloned() else {
        tracing::debug!(order_id = %order.id, "SMTP not configured, skipping confirmation email");
        return;
    };
    let pool = state.pool().clone();
    let store_name = store.name.clone();
    let order_url = format!("{}{path}", state.config().base_url.trim_end_matches('/'));

    tokio::spawn(async move {
        let order_id = order.id;
        let items = match OrderRepository::new(&pool).items(order_id).await {
            Ok(items) => items,
            Err(err) => {
                tracing::error!(%order_id, error = %err, "could not load order items for email");
                return;
            }
        };
        let message = OrderConfirmation {
            to: user.email,
            customer_name: user.username,
            store_name,
            order,
            items,
            order_url,
        };
        if let Err(err) = mailer.send_order_confirmation(&message).await {
            tracing::error!(%order_id, error = %err, "order confirmation email failed");
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use suuq_core::{Email, OrderStatus, StoreId, UserId};

    use super::*;

    fn order(customer: Option<i32>) -> Order {
        Order {
            id: OrderId::new(10),
            order_number: "ORD-20250301-00000000000A".to_owned(),
            customer_id: customer.map(UserId::new),
            store_id: StoreId::new(1),
            status: OrderStatus::Pending,
            subtotal: Decimal::TEN,
            total: Decimal::TEN,
            currency: "USD".to_owned(),
            payment_method: None,
            shipping_address: None,
            notes: None,
            checkout_token: None,
            created_at: Utc::now(),
        }
    }

    fn user(id: i32, is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            username: "amina".to_owned(),
            email: Email::parse("amina@example.com").unwrap(),
            is_admin,
        }
    }

    #[test]
    fn test_order_visibility() {
        let guest_order = order(None);
        assert!(can_view_order(None, &[OrderId::new(10)], &guest_order));
        assert!(!can_view_order(None, &[OrderId::new(11)], &guest_order));
        assert!(!can_view_order(Some(&user(1, false)), &[], &guest_order));
        assert!(can_view_order(Some(&user(1, true)), &[], &guest_order));

        let owned = order(Some(1));
        assert!(can_view_order(Some(&user(1, false)), &[], &owned));
        assert!(!can_view_order(Some(&user(2, false)), &[], &owned));
    }

    #[test]
    fn test_payment_outcome_filter() {
        assert_eq!(payment_outcome(Some("completed".to_owned())).as_deref(), Some("completed"));
        assert_eq!(payment_outcome(Some("cancelled".to_owned())).as_deref(), Some("cancelled"));
        assert_eq!(payment_outcome(Some("<script>".to_owned())), None);
        assert_eq!(payment_outcome(None), None);
    }

    #[test]
    fn test_checkout_token_shape() {
        let a = new_checkout_token();
        let b = new_checkout_token();
        assert_eq!(a.len(), CHECKOUT_TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
