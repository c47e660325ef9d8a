//! Payment initiation and provider callbacks (`/payment/*`).
//!
//! Initiation endpoints take the order id (never an amount) and answer
//! with the provider's next step for the browser. Only the order's
//! customer or the session that placed it may start a payment.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::instrument;

use suuq_core::{OrderId, PaymentId, PaymentMethod, PaymentStatus};

use crate::db::{OrderRepository, StoreRepository};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalUser;
use crate::models::session::{keys, placed_orders};
use crate::models::{CurrentUser, Order, PendingPaypalPayment};
use crate::routes::cart::{can_view_order, confirmation_path};
use crate::services::payments::{
    Confirmation, MobileMoneyProvider, NextAction, PaymentError, PaymentGateway, PaymentRequest,
    PaypalReturn, StripeWebhook, initiate_and_record, record_abandoned, record_confirmation,
};
use crate::state::AppState;

/// Body of every initiation request.
#[derive(Debug, Deserialize)]
pub struct InitiatePayment {
    pub order_id: OrderId,
    /// Wallet number, mobile money only.
    pub phone: Option<String>,
}

/// Query string `PayPal` appends when the buyer returns. Both fields are
/// optional so a truncated return still clears the session.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaypalReturnQuery {
    #[serde(rename = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
}

/// What the browser does next.
#[derive(Debug, Serialize)]
pub struct InitiatedPayment {
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub next_action: NextAction,
}

/// A pay button on the order confirmation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOption {
    pub method: PaymentMethod,
    /// Initiation endpoint the button posts to.
    pub endpoint: String,
    /// Mobile money asks for the wallet number.
    pub needs_phone: bool,
}

impl PaymentOption {
    /// `None` for methods settled outside the site (cash on delivery).
    #[must_use]
    pub fn for_method(method: PaymentMethod) -> Option<Self> {
        let (endpoint, needs_phone) = match method {
            PaymentMethod::Stripe => ("/payment/stripe/create-payment-intent".to_owned(), false),
            PaymentMethod::Paypal => ("/payment/paypal/create".to_owned(), false),
            PaymentMethod::CashOnDelivery => return None,
            other => {
                let provider = MobileMoneyProvider::ALL
                    .into_iter()
                    .find(|p| p.method() == other)?;
                (format!("/payment/{}/initiate", provider.slug()), true)
            }
        };
        Some(Self {
            method,
            endpoint,
            needs_phone,
        })
    }
}

/// Load an order the visitor may pay for; anything else is 404.
async fn payable_order(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
    order_id: OrderId,
) -> Result<Order> {
    let order = OrderRepository::new(state.pool())
        .get_by_id(order_id)
        .await?
        .ok_or(PaymentError::OrderNotFound)?;
    let placed = placed_orders(session).await?;
    if !can_view_order(user, &placed, &order) {
        return Err(PaymentError::OrderNotFound.into());
    }
    Ok(order)
}

async fn initiate<G: PaymentGateway + Sync>(
    state: &AppState,
    gateway: &G,
    order: &Order,
    phone: Option<&str>,
) -> Result<InitiatedPayment> {
    let (payment, initiation) = initiate_and_record(
        state.pool(),
        gateway,
        &PaymentRequest { order, phone },
    )
    .await?;

    let order_id = order.id.to_string();
    add_breadcrumb(
        "payment",
        "Payment initiated",
        Some(&[("order_id", order_id.as_str()), ("method", gateway.method().as_str())]),
    );
    Ok(InitiatedPayment {
        payment_id: payment.id,
        transaction_id: initiation.transaction_id,
        next_action: initiation.next_action,
    })
}

/// Order confirmation path for `order_id` with a `payment` outcome flag, or
/// the home page if the order or its store is gone.
async fn order_return_path(state: &AppState, order_id: OrderId, outcome: &str) -> Result<String> {
    let Some(order) = OrderRepository::new(state.pool()).get_by_id(order_id).await? else {
        return Ok("/".to_owned());
    };
    let store = StoreRepository::new(state.pool())
        .get_by_id(order.store_id)
        .await?;
    Ok(store.map_or_else(
        || "/".to_owned(),
        |store| format!("{}?payment={outcome}", confirmation_path(&store, order.id)),
    ))
}

/// Create a Stripe `PaymentIntent` for an order.
#[instrument(skip(state, session, user, body), fields(order_id = %body.order_id))]
pub async fn stripe_create_intent(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Json(body): Json<InitiatePayment>,
) -> Result<Json<InitiatedPayment>> {
    let gateway = state
        .stripe()
        .ok_or(PaymentError::NotConfigured("Stripe"))?;
    let order = payable_order(&state, &session, user.as_ref(), body.order_id).await?;
    Ok(Json(initiate(&state, gateway, &order, None).await?))
}

/// Stripe webhook.
///
/// The signature is verified against the raw body before anything is
/// parsed; a bad signature answers 400 without touching the database.
#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Json<Value>> {
    let gateway = state
        .stripe()
        .filter(|g| g.accepts_webhooks())
        .ok_or(PaymentError::NotConfigured("Stripe webhook"))?;

    let webhook = StripeWebhook {
        payload: payload.to_vec(),
        signature: headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        received_at: chrono::Utc::now().timestamp(),
    };

    match gateway.confirm(webhook).await {
        Ok(Confirmation::Succeeded(confirmed)) => {
            let Some(order_id) = confirmed.order_id else {
                tracing::warn!(transaction_id = %confirmed.transaction_id, "succeeded intent without order id");
                return Ok(Json(json!({ "received": true })));
            };
            record_confirmation(state.pool(), order_id, PaymentMethod::Stripe, &confirmed).await?;
        }
        Ok(Confirmation::Failed {
            transaction_id,
            reason,
        }) => {
            tracing::info!(%transaction_id, %reason, "stripe payment failed");
            record_abandoned(
                state.pool(),
                PaymentMethod::Stripe,
                &transaction_id,
                PaymentStatus::Failed,
            )
            .await?;
        }
        Ok(Confirmation::Ignored(event)) => {
            tracing::debug!(%event, "stripe event ignored");
        }
        Err(err) => {
            tracing::warn!(error = %err, "stripe webhook rejected");
            return Err(err.into());
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// Create a `PayPal` payment and hand back the approval URL.
///
/// The `PayPal` payment id is kept in the session until the buyer returns.
#[instrument(skip(state, session, user, body), fields(order_id = %body.order_id))]
pub async fn paypal_create(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Json(body): Json<InitiatePayment>,
) -> Result<Json<InitiatedPayment>> {
    let gateway = state
        .paypal()
        .ok_or(PaymentError::NotConfigured("PayPal"))?;
    let order = payable_order(&state, &session, user.as_ref(), body.order_id).await?;
    let initiated = initiate(&state, gateway, &order, None).await?;

    session
        .insert(
            keys::PAYPAL_PAYMENT,
            PendingPaypalPayment {
                payment_id: initiated.transaction_id.clone(),
                order_id: order.id,
            },
        )
        .await?;
    Ok(Json(initiated))
}

/// Buyer returned from `PayPal` after approving: execute the payment.
///
/// The payment executed is the one held in the session, whatever
/// `paymentId` the query string carries. The session entry is cleared
/// before anything else, whatever the outcome. A return without `PayerID`
/// marks the payment failed.
#[instrument(skip_all)]
pub async fn paypal_success(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<PaypalReturnQuery>,
) -> Result<Redirect> {
    let pending = session
        .remove::<PendingPaypalPayment>(keys::PAYPAL_PAYMENT)
        .await?
        .ok_or(PaymentError::SessionExpired)?;
    let gateway = state
        .paypal()
        .ok_or(PaymentError::NotConfigured("PayPal"))?;
    if query.payment_id.as_deref() != Some(pending.payment_id.as_str()) {
        tracing::warn!(
            session_payment = %pending.payment_id,
            query_payment = ?query.payment_id,
            "paypal return does not match session"
        );
    }

    let confirmation = match query.payer_id.filter(|id| !id.trim().is_empty()) {
        Some(payer_id) => {
            gateway
                .confirm(PaypalReturn {
                    payment_id: pending.payment_id.clone(),
                    payer_id,
                })
                .await?
        }
        None => Confirmation::Failed {
            transaction_id: pending.payment_id.clone(),
            reason: "return without PayerID".to_owned(),
        },
    };

    let outcome = match confirmation {
        Confirmation::Succeeded(confirmed) => {
            record_confirmation(state.pool(), pending.order_id, PaymentMethod::Paypal, &confirmed)
                .await?;
            "completed"
        }
        Confirmation::Failed {
            transaction_id,
            reason,
        } => {
            tracing::info!(%transaction_id, %reason, "paypal payment not approved");
            record_abandoned(
                state.pool(),
                PaymentMethod::Paypal,
                &transaction_id,
                PaymentStatus::Failed,
            )
            .await?;
            "failed"
        }
        Confirmation::Ignored(reason) => {
            tracing::warn!(%reason, "paypal execution ignored");
            "failed"
        }
    };

    Ok(Redirect::to(
        &order_return_path(&state, pending.order_id, outcome).await?,
    ))
}

/// Buyer cancelled on `PayPal`.
#[instrument(skip_all)]
pub async fn paypal_cancel(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let Some(pending) = session
        .remove::<PendingPaypalPayment>(keys::PAYPAL_PAYMENT)
        .await?
    else {
        return Ok(Redirect::to("/"));
    };

    record_abandoned(
        state.pool(),
        PaymentMethod::Paypal,
        &pending.payment_id,
        PaymentStatus::Cancelled,
    )
    .await?;
    Ok(Redirect::to(
        &order_return_path(&state, pending.order_id, "cancelled").await?,
    ))
}

/// Push a mobile-money payment request to the customer's phone.
#[instrument(skip(state, session, user, body), fields(order_id = %body.order_id))]
pub async fn mobile_money_initiate(
    State(state): State<AppState>,
    session: Session,
    OptionalUser(user): OptionalUser,
    Path(provider): Path<String>,
    Json(body): Json<InitiatePayment>,
) -> Result<Json<InitiatedPayment>> {
    let provider: MobileMoneyProvider = provider
        .parse()
        .map_err(|_| AppError::NotFound(format!("payment provider {provider}")))?;
    let gateway = state
        .mobile_money(provider)
        .ok_or(PaymentError::NotConfigured(provider.label()))?;

    let order = payable_order(&state, &session, user.as_ref(), body.order_id).await?;
    Ok(Json(
        initiate(&state, gateway, &order, body.phone.as_deref()).await?,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_paypal_return_query() {
        let parsed: PaypalReturnQuery =
            serde_json::from_value(json!({"paymentId": "PAY-1", "PayerID": "XYZ"})).unwrap();
        assert_eq!(parsed.payment_id.as_deref(), Some("PAY-1"));
        assert_eq!(parsed.payer_id.as_deref(), Some("XYZ"));

        let truncated: PaypalReturnQuery = serde_json::from_value(json!({"token": "EC-1"})).unwrap();
        assert!(truncated.payment_id.is_none());
        assert!(truncated.payer_id.is_none());
    }

    #[test]
    fn test_payment_options() {
        let stripe = PaymentOption::for_method(PaymentMethod::Stripe).unwrap();
        assert_eq!(stripe.endpoint, "/payment/stripe/create-payment-intent");
        assert!(!stripe.needs_phone);

        let paypal = PaymentOption::for_method(PaymentMethod::Paypal).unwrap();
        assert_eq!(paypal.endpoint, "/payment/paypal/create");

        for provider in MobileMoneyProvider::ALL {
            let option = PaymentOption::for_method(provider.method()).unwrap();
            assert_eq!(option.endpoint, format!("/payment/{}/initiate", provider.slug()));
            assert!(option.needs_phone);
        }

        assert!(PaymentOption::for_method(PaymentMethod::CashOnDelivery).is_none());
    }
}
