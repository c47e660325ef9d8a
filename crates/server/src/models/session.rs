//! Session-related types.
//!
//! Everything the server keeps in a visitor's session lives under one of the
//! keys in [`keys`].

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use suuq_core::{Email, OrderId, StoreId, UserId};

use super::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the logged-in user. Guards
/// re-read the user row on every protected request, so a stale `is_admin`
/// here never grants access by itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub is_admin: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// `PayPal` payment awaiting the buyer's return from the approval page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingPaypalPayment {
    pub payment_id: String,
    pub order_id: OrderId,
}

/// Most order ids remembered per session.
const MAX_PLACED_ORDERS: usize = 20;

/// Ids of orders placed from this session, newest last.
///
/// Lets a guest view and pay for the orders they placed.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn placed_orders(session: &Session) -> Result<Vec<OrderId>, tower_sessions::session::Error> {
    Ok(session
        .get::<Vec<OrderId>>(keys::PLACED_ORDERS)
        .await?
        .unwrap_or_default())
}

/// Remember an order placed from this session.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn remember_placed_order(
    session: &Session,
    order_id: OrderId,
) -> Result<(), tower_sessions::session::Error> {
    let mut ids = placed_orders(session).await?;
    if ids.contains(&order_id) {
        return Ok(());
    }
    ids.push(order_id);
    if ids.len() > MAX_PLACED_ORDERS {
        ids.drain(..ids.len() - MAX_PLACED_ORDERS);
    }
    session.insert(keys::PLACED_ORDERS, ids).await
}

/// Session key holding the checkout token for one store.
#[must_use]
pub fn checkout_token_key(store_id: StoreId) -> String {
    format!("{}:{store_id}", keys::CHECKOUT_TOKEN)
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the typed cart.
    pub const CART: &str = "cart";

    /// Prefix for per-store checkout tokens (`checkout_token:{store_id}`).
    pub const CHECKOUT_TOKEN: &str = "checkout_token";

    /// Key for the ids of orders placed from this session.
    pub const PLACED_ORDERS: &str = "placed_orders";

    /// Key for the in-flight `PayPal` payment.
    pub const PAYPAL_PAYMENT: &str = "paypal_payment";
}
