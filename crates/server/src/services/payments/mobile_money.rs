//! Mobile-money push payments: EVC Plus, Golis Saad and eDahab.
//!
//! The three providers share one request shape: a JSON `POST` with
//! `{amount, phone, reference, description}` and a bearer key. A 2xx answer
//! carrying a `transaction_id` means the customer has been prompted on their
//! phone; the payment stays `pending` until settled out of band.

use std::str::FromStr;
use std::sync::Arc;

use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use suuq_core::PaymentMethod;

use super::{Confirmation, Initiation, NextAction, PaymentError, PaymentGateway, PaymentRequest};
use crate::config::{MobileMoneyConfig, PaymentsConfig};

/// A mobile-money provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobileMoneyProvider {
    EvcPlus,
    GolisSaad,
    Edahab,
}

impl MobileMoneyProvider {
    pub const ALL: [Self; 3] = [Self::EvcPlus, Self::GolisSaad, Self::Edahab];

    #[must_use]
    pub const fn method(self) -> PaymentMethod {
        match self {
            Self::EvcPlus => PaymentMethod::EvcPlus,
            Self::GolisSaad => PaymentMethod::GolisSaad,
            Self::Edahab => PaymentMethod::Edahab,
        }
    }

    /// Path segment under `/payment/`.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::EvcPlus => "evc-plus",
            Self::GolisSaad => "golis-saad",
            Self::Edahab => "edahab",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        self.method().label()
    }

    /// This provider's credentials, if configured.
    #[must_use]
    pub const fn config(self, payments: &PaymentsConfig) -> Option<&MobileMoneyConfig> {
        match self {
            Self::EvcPlus => payments.evc_plus.as_ref(),
            Self::GolisSaad => payments.golis_saad.as_ref(),
            Self::Edahab => payments.edahab.as_ref(),
        }
    }
}

impl FromStr for MobileMoneyProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.slug() == s)
            .ok_or_else(|| format!("unknown mobile money provider `{s}`"))
    }
}

impl std::fmt::Display for MobileMoneyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Adapter for one mobile-money provider.
#[derive(Clone)]
pub struct MobileMoneyGateway {
    inner: Arc<MobileMoneyGatewayInner>,
}

struct MobileMoneyGatewayInner {
    provider: MobileMoneyProvider,
    client: reqwest::Client,
    api_url: String,
    api_key: SecretString,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    amount: Decimal,
    phone: &'a str,
    reference: &'a str,
    description: String,
}

impl MobileMoneyGateway {
    #[must_use]
    pub fn new(
        provider: MobileMoneyProvider,
        config: &MobileMoneyConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(MobileMoneyGatewayInner {
                provider,
                client,
                api_url: config.api_url.clone(),
                api_key: config.api_key.clone(),
            }),
        }
    }

    #[must_use]
    pub fn provider(&self) -> MobileMoneyProvider {
        self.inner.provider
    }
}

impl PaymentGateway for MobileMoneyGateway {
    /// These providers have no confirmation callback.
    type Confirm = std::convert::Infallible;

    fn method(&self) -> PaymentMethod {
        self.inner.provider.method()
    }

    async fn initiate(&self, request: &PaymentRequest<'_>) -> Result<Initiation, PaymentError> {
        let provider = self.inner.provider;
        let phone = normalize_phone(request.phone.unwrap_or_default())?;
        let body = PushRequest {
            amount: request.order.total,
            phone: &phone,
            reference: &request.order.order_number,
            description: request.description(),
        };

        let response = self
            .inner
            .client
            .post(&self.inner.api_url)
            .bearer_auth(self.inner.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        if !status.is_success() {
            tracing::error!(%provider, %status, body = %super::truncate(&text), "mobile money push rejected");
        }
        interpret_response(provider, status, value)
    }

    async fn confirm(&self, input: Self::Confirm) -> Result<Confirmation, PaymentError> {
        match input {}
    }
}

/// Interpret a provider's answer to a push request.
///
/// # Errors
///
/// Returns `PaymentError::Provider` for non-2xx statuses and
/// `PaymentError::InvalidResponse` for a 2xx without a transaction id.
pub fn interpret_response(
    provider: MobileMoneyProvider,
    status: StatusCode,
    body: serde_json::Value,
) -> Result<Initiation, PaymentError> {
    if !status.is_success() {
        return Err(PaymentError::Provider {
            provider: provider.label(),
            status: status.as_u16(),
            message: "payment initiation failed".to_owned(),
        });
    }

    let transaction_id = match body.get("transaction_id") {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => id.trim().to_owned(),
        Some(serde_json::Value::Number(id)) => id.to_string(),
        _ => {
            return Err(PaymentError::InvalidResponse {
                provider: provider.label(),
                message: "response has no transaction_id".to_owned(),
            });
        }
    };

    Ok(Initiation {
        transaction_id,
        gateway_response: body,
        next_action: NextAction::AwaitCustomer,
    })
}

/// Strip separators from a phone number and check it looks dialable.
///
/// Accepts an optional leading `+` followed by 7 to 15 digits; spaces,
/// dashes, dots and parentheses are dropped.
///
/// # Errors
///
/// Returns `PaymentError::InvalidInput` if the number is missing or malformed.
pub fn normalize_phone(raw: &str) -> Result<String, PaymentError> {
    let raw = raw.trim();
    let (plus, rest) = raw
        .strip_prefix('+')
        .map_or((false, raw), |rest| (true, rest));

    let mut digits = String::with_capacity(rest.len() + 1);
    if plus {
        digits.push('+');
    }
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(PaymentError::InvalidInput(
                    "phone number may only contain digits".to_owned(),
                ));
            }
        }
    }

    let count = digits.trim_start_matches('+').len();
    if !(7..=15).contains(&count) {
        return Err(PaymentError::InvalidInput(
            "enter the phone number registered with your wallet".to_owned(),
        ));
    }
    Ok(digits)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs_round_trip() {
        for provider in MobileMoneyProvider::ALL {
            assert_eq!(provider.slug().parse::<MobileMoneyProvider>().unwrap(), provider);
            assert!(provider.method().is_mobile_money());
        }
        assert!("mpesa".parse::<MobileMoneyProvider>().is_err());
    }

    #[test]
    fn test_success_needs_transaction_id() {
        let ok = interpret_response(
            MobileMoneyProvider::EvcPlus,
            StatusCode::OK,
            serde_json::json!({"transaction_id": "EVC-991", "status": "queued"}),
        )
        .unwrap();
        assert_eq!(ok.transaction_id, "EVC-991");
        assert_eq!(ok.next_action, NextAction::AwaitCustomer);

        let numeric = interpret_response(
            MobileMoneyProvider::Edahab,
            StatusCode::CREATED,
            serde_json::json!({"transaction_id": 12345}),
        )
        .unwrap();
        assert_eq!(numeric.transaction_id, "12345");

        let missing = interpret_response(
            MobileMoneyProvider::GolisSaad,
            StatusCode::OK,
            serde_json::json!({"status": "ok"}),
        );
        assert!(matches!(missing, Err(PaymentError::InvalidResponse { .. })));
    }

    #[test]
    fn test_non_success_is_provider_error() {
        let result = interpret_response(
            MobileMoneyProvider::EvcPlus,
            StatusCode::PAYMENT_REQUIRED,
            serde_json::json!({"transaction_id": "EVC-1"}),
        );
        assert!(matches!(
            result,
            Err(PaymentError::Provider { status: 402, provider: "EVC Plus", .. })
        ));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+252 61 555-1234").unwrap(), "+252615551234");
        assert_eq!(normalize_phone("(061) 555.1234").unwrap(), "0615551234");
        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("+25261555123x").is_err());
        assert!(normalize_phone(&"1".repeat(16)).is_err());
    }

    #[test]
    fn test_push_request_shape() {
        let body = PushRequest {
            amount: "12.50".parse().unwrap(),
            phone: "+252615551234",
            reference: "ORD-20250301-AAAAAAAAAAAA",
            description: "Payment for order ORD-20250301-AAAAAAAAAAAA".to_owned(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["amount"], "12.50");
        assert_eq!(value["phone"], "+252615551234");
        assert_eq!(value["reference"], "ORD-20250301-AAAAAAAAAAAA");
    }
}
