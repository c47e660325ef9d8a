//! Payment domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use suuq_core::{OrderId, PaymentId, PaymentMethod, PaymentStatus};

/// One attempt to collect money for an order through a provider.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    #[serde(skip)]
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A payment row to insert.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
}
