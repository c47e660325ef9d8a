//! Stripe card payments.
//!
//! Initiation creates a `PaymentIntent` through the form-encoded REST API and
//! hands its `client_secret` to the browser. Confirmation arrives as a
//! `payment_intent.succeeded` webhook whose `Stripe-Signature` header is
//! checked before the body is parsed.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;

use suuq_core::{OrderId, PaymentMethod, from_minor_units, to_minor_units};

use super::{
    Confirmation, ConfirmedPayment, Initiation, NextAction, PaymentError, PaymentGateway,
    PaymentRequest, truncate,
};
use crate::config::StripeConfig;

const PROVIDER: &str = "Stripe";

/// Maximum age of a webhook signature, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Stripe API client.
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: Option<SecretString>,
}

/// Raw webhook delivery.
#[derive(Debug, Clone)]
pub struct StripeWebhook {
    pub payload: Vec<u8>,
    pub signature: Option<String>,
    /// Unix time the delivery was received.
    pub received_at: i64,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentCreated {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    last_payment_error: Option<StripeErrorDetail>,
}

impl StripeGateway {
    #[must_use]
    pub fn new(config: &StripeConfig, client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(StripeGatewayInner {
                client,
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
                webhook_secret: config.webhook_secret.clone(),
            }),
        }
    }

    /// Whether webhooks can be verified.
    #[must_use]
    pub fn accepts_webhooks(&self) -> bool {
        self.inner.webhook_secret.is_some()
    }
}

impl PaymentGateway for StripeGateway {
    type Confirm = StripeWebhook;

    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn initiate(&self, request: &PaymentRequest<'_>) -> Result<Initiation, PaymentError> {
        let order = request.order;
        let amount =
            to_minor_units(order.total).ok_or(PaymentError::InvalidAmount(order.total))?;

        let params = [
            ("amount", amount.to_string()),
            ("currency", order.currency.to_ascii_lowercase()),
            ("description", request.description()),
            ("metadata[order_id]", order.id.to_string()),
            ("metadata[order_number]", order.order_number.clone()),
            ("automatic_payment_methods[enabled]", "true".to_owned()),
        ];

        let response = self
            .inner
            .client
            .post(format!("{}/v1/payment_intents", self.inner.api_base))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .header("Idempotency-Key", format!("order-{}-intent", order.id))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| truncate(&body));
            tracing::error!(%status, %message, "Stripe rejected payment intent");
            return Err(PaymentError::Provider {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let mut gateway_response: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| invalid_response(&e))?;
        let created: PaymentIntentCreated =
            serde_json::from_value(gateway_response.clone()).map_err(|e| invalid_response(&e))?;
        if let Some(object) = gateway_response.as_object_mut() {
            object.remove("client_secret");
        }

        Ok(Initiation {
            transaction_id: created.id,
            gateway_response,
            next_action: NextAction::ClientSecret(created.client_secret),
        })
    }

    async fn confirm(&self, webhook: StripeWebhook) -> Result<Confirmation, PaymentError> {
        let secret = self
            .inner
            .webhook_secret
            .as_ref()
            .ok_or(PaymentError::NotConfigured("Stripe webhook"))?;
        let signature = webhook
            .signature
            .as_deref()
            .ok_or(PaymentError::InvalidSignature)?;

        verify_signature(
            &webhook.payload,
            signature,
            secret.expose_secret(),
            webhook.received_at,
        )?;
        parse_event(&webhook.payload)
    }
}

fn invalid_response(err: &serde_json::Error) -> PaymentError {
    PaymentError::InvalidResponse {
        provider: PROVIDER,
        message: err.to_string(),
    }
}

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=…]`).
///
/// The signed message is `"{t}." + payload`, authenticated with HMAC-SHA256
/// under the endpoint secret. Any matching `v1` entry is accepted as long as
/// `t` is within [`SIGNATURE_TOLERANCE_SECS`] of `now`.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the header is malformed, too
/// old, or no signature matches.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::InvalidSignature)?;
    if signatures.is_empty() || (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.into_iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });
    if matched {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

/// Interpret a verified webhook body.
fn parse_event(payload: &[u8]) -> Result<Confirmation, PaymentError> {
    let event: Event =
        serde_json::from_slice(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

    match event.kind.as_str() {
        "payment_intent.succeeded" => {
            let intent: PaymentIntent = serde_json::from_value(event.data.object.clone())
                .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
            let order_id = intent
                .metadata
                .get("order_id")
                .map(|raw| {
                    raw.parse::<OrderId>()
                        .map_err(|_| PaymentError::InvalidPayload(format!("bad order_id `{raw}`")))
                })
                .transpose()?;
            if order_id.is_none() {
                return Ok(Confirmation::Ignored(format!(
                    "event {} has no order_id metadata",
                    event.id
                )));
            }

            Ok(Confirmation::Succeeded(ConfirmedPayment {
                order_id,
                transaction_id: intent.id,
                amount: from_minor_units(intent.amount),
                currency: intent.currency.to_ascii_uppercase(),
                gateway_response: event.data.object,
            }))
        }
        "payment_intent.payment_failed" => {
            let intent: PaymentIntent = serde_json::from_value(event.data.object)
                .map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;
            Ok(Confirmation::Failed {
                transaction_id: intent.id,
                reason: intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "payment failed".to_owned()),
            })
        }
        other => Ok(Confirmation::Ignored(format!("unhandled event type {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn succeeded_event(order_id: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_123",
                "amount": 2550,
                "currency": "usd",
                "metadata": {"order_id": order_id, "order_number": "ORD-20250301-AAAAAAAAAAAA"}
            }}
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_signature() {
        let payload = succeeded_event("7");
        let header = sign(&payload, 1_700_000_000, SECRET);
        assert!(verify_signature(&payload, &header, SECRET, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let payload = b"{}";
        let good = sign(payload, 1_700_000_000, SECRET);
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t=1700000000,v1={},v1={good_sig}", "00".repeat(32));
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_rejects_wrong_secret_and_tampering() {
        let payload = succeeded_event("7");
        let header = sign(&payload, 1_700_000_000, "whsec_other");
        assert!(matches!(
            verify_signature(&payload, &header, SECRET, 1_700_000_000),
            Err(PaymentError::InvalidSignature)
        ));

        let header = sign(&payload, 1_700_000_000, SECRET);
        let tampered = succeeded_event("8");
        assert!(verify_signature(&tampered, &header, SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn test_rejects_stale_and_malformed_headers() {
        let payload = b"{}";
        let header = sign(payload, 1_700_000_000, SECRET);
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_301).is_err());
        assert!(verify_signature(payload, &header, SECRET, 1_700_000_300).is_ok());

        for bad in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "t=1700000000,v1=zz"] {
            assert!(
                verify_signature(payload, bad, SECRET, 1_700_000_000).is_err(),
                "header {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_succeeded_event() {
        let Confirmation::Succeeded(confirmed) = parse_event(&succeeded_event("7")).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(confirmed.order_id, Some(OrderId::new(7)));
        assert_eq!(confirmed.transaction_id, "pi_123");
        assert_eq!(confirmed.amount, "25.50".parse().unwrap());
        assert_eq!(confirmed.currency, "USD");
    }

    #[test]
    fn test_parse_failed_and_other_events() {
        let failed = serde_json::to_vec(&serde_json::json!({
            "id": "evt_2",
            "type": "payment_intent.payment_failed",
            "data": {"object": {
                "id": "pi_9", "amount": 100, "currency": "usd",
                "last_payment_error": {"message": "card declined"}
            }}
        }))
        .unwrap();
        assert!(matches!(
            parse_event(&failed).unwrap(),
            Confirmation::Failed { transaction_id, reason } if transaction_id == "pi_9" && reason == "card declined"
        ));

        let other = br#"{"id":"evt_3","type":"charge.refunded","data":{"object":{}}}"#;
        assert!(matches!(parse_event(other).unwrap(), Confirmation::Ignored(_)));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(PaymentError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_event(&succeeded_event("abc")),
            Err(PaymentError::InvalidPayload(_))
        ));
    }
}
