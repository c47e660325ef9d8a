//! Payment provider adapters.
//!
//! # Providers
//!
//! - [`StripeGateway`] - card payments through a `PaymentIntent`, confirmed by
//!   a signed webhook
//! - [`PaypalGateway`] - redirect to the `PayPal` approval page, confirmed
//!   when the buyer returns
//! - [`MobileMoneyGateway`] - EVC Plus, Golis Saad and eDahab push requests,
//!   one adapter parameterized by [`MobileMoneyProvider`]
//!
//! Every adapter charges the order's stored total. The helpers at the bottom
//! of this module record what the providers report.

mod mobile_money;
mod paypal;
mod stripe;

pub use mobile_money::{MobileMoneyGateway, MobileMoneyProvider, normalize_phone};
pub use paypal::{PaypalGateway, PaypalReturn};
pub use stripe::{StripeGateway, StripeWebhook, verify_signature};

use std::future::Future;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use suuq_core::{OrderId, OrderStatus, PaymentMethod, PaymentStatus};

use crate::db::payments::Completion;
use crate::db::{PaymentRepository, RepositoryError};
use crate::models::order::Order;
use crate::models::payment::{NewPayment, Payment};

/// Timeout for every provider HTTP call.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while talking to a payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Credentials for this provider are not configured.
    #[error("{0} payments are not available")]
    NotConfigured(&'static str),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// The provider's response did not have the expected shape.
    #[error("unexpected response from {provider}: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    /// Webhook signature missing, malformed, stale or wrong.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook body could not be parsed.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Input from the buyer failed validation (e.g. phone number).
    #[error("{0}")]
    InvalidInput(String),

    /// The order cannot be converted to the provider's minor units.
    #[error("order total {0} cannot be charged")]
    InvalidAmount(Decimal),

    /// The order is not awaiting payment.
    #[error("order is {0}, not pending")]
    OrderNotPayable(OrderStatus),

    #[error("order not found")]
    OrderNotFound,

    /// Provider-side state for this payment is missing from the session.
    #[error("payment session expired")]
    SessionExpired,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// What the browser should do after a payment was initiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NextAction {
    /// Finish the card payment client-side with this secret.
    ClientSecret(String),
    /// Send the buyer to this provider page.
    Redirect(String),
    /// The buyer approves the charge on their phone.
    AwaitCustomer,
}

/// A payment the provider accepted for processing.
#[derive(Debug, Clone)]
pub struct Initiation {
    pub transaction_id: String,
    /// Provider response, stripped of secrets, stored with the payment row.
    pub gateway_response: serde_json::Value,
    pub next_action: NextAction,
}

/// Input common to every provider.
#[derive(Debug, Clone, Copy)]
pub struct PaymentRequest<'a> {
    pub order: &'a Order,
    /// Payer phone number, required by mobile money.
    pub phone: Option<&'a str>,
}

impl PaymentRequest<'_> {
    pub(crate) fn description(&self) -> String {
        format!("Payment for order {}", self.order.order_number)
    }
}

/// A provider-confirmed payment.
#[derive(Debug, Clone)]
pub struct ConfirmedPayment {
    /// Order named by the provider, when it carries one (Stripe metadata).
    pub order_id: Option<OrderId>,
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_response: serde_json::Value,
}

/// Result of a confirmation callback.
#[derive(Debug, Clone)]
pub enum Confirmation {
    Succeeded(ConfirmedPayment),
    Failed {
        transaction_id: String,
        reason: String,
    },
    /// A well-formed notification that needs no action.
    Ignored(String),
}

/// One payment provider.
pub trait PaymentGateway {
    /// Input of the provider's confirmation step.
    type Confirm;

    /// Method recorded on payment rows created by this gateway.
    fn method(&self) -> PaymentMethod;

    /// Ask the provider to start collecting the order's total.
    fn initiate(
        &self,
        request: &PaymentRequest<'_>,
    ) -> impl Future<Output = Result<Initiation, PaymentError>> + Send;

    /// Turn a provider callback into a [`Confirmation`].
    fn confirm(
        &self,
        input: Self::Confirm,
    ) -> impl Future<Output = Result<Confirmation, PaymentError>> + Send;
}

/// Build the shared HTTP client for provider calls.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .user_agent(concat!("suuq/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Refuse to initiate payments for orders that are not awaiting one.
///
/// # Errors
///
/// Returns `PaymentError::OrderNotPayable` unless the order is `pending`.
pub fn ensure_payable(order: &Order) -> Result<(), PaymentError> {
    match order.status {
        OrderStatus::Pending => Ok(()),
        other => Err(PaymentError::OrderNotPayable(other)),
    }
}

/// Run `gateway.initiate` and record the resulting `pending` payment.
///
/// Nothing is written if the provider call fails. A retry that the provider
/// answers with the same transaction id reuses the existing row.
///
/// # Errors
///
/// Returns `PaymentError::OrderNotPayable`, the provider error, or
/// `PaymentError::Repository` if the row cannot be written.
#[tracing::instrument(skip_all, fields(order_id = %request.order.id, method = %gateway.method()))]
pub async fn initiate_and_record<G: PaymentGateway + Sync>(
    pool: &PgPool,
    gateway: &G,
    request: &PaymentRequest<'_>,
) -> Result<(Payment, Initiation), PaymentError> {
    ensure_payable(request.order)?;

    let initiation = gateway.initiate(request).await?;
    let payment = PaymentRepository::new(pool)
        .record_attempt(&NewPayment {
            order_id: request.order.id,
            payment_method: gateway.method(),
            amount: request.order.total,
            currency: request.order.currency.clone(),
            status: PaymentStatus::Pending,
            transaction_id: Some(initiation.transaction_id.clone()),
            gateway_response: Some(initiation.gateway_response.clone()),
        })
        .await?;

    tracing::info!(payment_id = %payment.id, transaction_id = %initiation.transaction_id, "payment initiated");
    Ok((payment, initiation))
}

/// Record a confirmed payment against `order_id` and mark the order paid.
///
/// # Errors
///
/// Returns `PaymentError::OrderNotFound` if the order does not exist, or
/// `PaymentError::Repository` for conflicts and database failures.
pub async fn record_confirmation(
    pool: &PgPool,
    order_id: OrderId,
    method: PaymentMethod,
    confirmed: &ConfirmedPayment,
) -> Result<Completion, PaymentError> {
    let completion = PaymentRepository::new(pool)
        .complete(&NewPayment {
            order_id,
            payment_method: method,
            amount: confirmed.amount,
            currency: confirmed.currency.clone(),
            status: PaymentStatus::Completed,
            transaction_id: Some(confirmed.transaction_id.clone()),
            gateway_response: Some(confirmed.gateway_response.clone()),
        })
        .await?
        .ok_or(PaymentError::OrderNotFound)?;

    tracing::info!(
        %order_id,
        payment_id = %completion.payment.id,
        order_marked_paid = completion.order_marked_paid,
        "payment confirmed"
    );
    Ok(completion)
}

/// Move a `pending` payment to `failed` or `cancelled`.
///
/// Returns `None` if no pending payment had this transaction id.
///
/// # Errors
///
/// Returns `PaymentError::Repository` if the update fails.
pub async fn record_abandoned(
    pool: &PgPool,
    method: PaymentMethod,
    transaction_id: &str,
    status: PaymentStatus,
) -> Result<Option<Payment>, PaymentError> {
    let payment = PaymentRepository::new(pool)
        .transition(method, transaction_id, PaymentStatus::Pending, status)
        .await?;
    if payment.is_none() {
        tracing::debug!(%method, transaction_id, "no pending payment to update");
    }
    Ok(payment)
}

/// Shorten a provider error body for logs and messages.
pub(crate) fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use suuq_core::StoreId;

    use super::*;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(1),
            order_number: "ORD-20250301-000000000001".to_owned(),
            customer_id: None,
            store_id: StoreId::new(1),
            status,
            subtotal: Decimal::ONE_HUNDRED,
            total: Decimal::ONE_HUNDRED,
            currency: "USD".to_owned(),
            payment_method: None,
            shipping_address: None,
            notes: None,
            checkout_token: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_pending_orders_are_payable() {
        assert!(ensure_payable(&order(OrderStatus::Pending)).is_ok());
        for status in [
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert!(matches!(
                ensure_payable(&order(status)),
                Err(PaymentError::OrderNotPayable(s)) if s == status
            ));
        }
    }

    #[test]
    fn test_next_action_json() {
        let value = serde_json::to_value(NextAction::Redirect("https://x.test".to_owned())).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "redirect", "value": "https://x.test"})
        );
        let value = serde_json::to_value(NextAction::AwaitCustomer).unwrap();
        assert_eq!(value, serde_json::json!({"type": "await_customer"}));
    }

    #[test]
    fn test_description() {
        let order = order(OrderStatus::Pending);
        let request = PaymentRequest {
            order: &order,
            phone: None,
        };
        assert_eq!(
            request.description(),
            "Payment for order ORD-20250301-000000000001"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate(&"x".repeat(500)).len(), 200);
        assert_eq!(truncate("short"), "short");
    }
}
