//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use suuq_core::{OrderId, OrderItemId, OrderStatus, PaymentMethod, ProductId, StoreId, UserId};

use super::Payment;

/// An order placed against one store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: Option<UserId>,
    pub store_id: StoreId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    #[serde(skip)]
    pub checkout_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One line of an order. `price` is the unit price charged at checkout.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

/// An order together with its lines and payment attempts.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

/// A validated order ready to persist, lines included.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Option<UserId>,
    pub store_id: StoreId,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub checkout_token: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

/// One line of a [`NewOrder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
}
