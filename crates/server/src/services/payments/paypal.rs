//! `PayPal` redirect payments (REST v1 payments API).
//!
//! Initiation creates a `sale` payment and returns the approval URL. When the
//! buyer comes back to `/payment/paypal/success` the payment is executed with
//! the `PayerID` from the query string.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use suuq_core::PaymentMethod;

use super::{
    Confirmation, ConfirmedPayment, Initiation, NextAction, PaymentError, PaymentGateway,
    PaymentRequest, truncate,
};
use crate::config::PaypalConfig;

const PROVIDER: &str = "PayPal";

/// Access tokens live for hours; refresh well before that.
const TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// `PayPal` REST client.
#[derive(Clone)]
pub struct PaypalGateway {
    inner: Arc<PaypalGatewayInner>,
}

struct PaypalGatewayInner {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: SecretString,
    return_url: String,
    cancel_url: String,
    token: Cache<(), Arc<String>>,
}

/// An approved payment to execute.
#[derive(Debug, Clone)]
pub struct PaypalReturn {
    pub payment_id: String,
    pub payer_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPayment {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct ExecutedPayment {
    id: String,
    state: String,
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    amount: Amount,
}

#[derive(Debug, Deserialize)]
struct Amount {
    total: String,
    currency: String,
}

impl PaypalGateway {
    /// `base_url` is the public URL of this server, used for the return and
    /// cancel redirects.
    #[must_use]
    pub fn new(config: &PaypalConfig, base_url: &str, client: reqwest::Client) -> Self {
        let token = Cache::builder()
            .max_capacity(1)
            .time_to_live(TOKEN_TTL)
            .build();

        Self {
            inner: Arc::new(PaypalGatewayInner {
                client,
                api_base: config.api_base().to_owned(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                return_url: format!("{base_url}/payment/paypal/success"),
                cancel_url: format!("{base_url}/payment/paypal/cancel"),
                token,
            }),
        }
    }

    /// OAuth client-credentials token, cached.
    async fn access_token(&self) -> Result<Arc<String>, PaymentError> {
        self.inner
            .token
            .try_get_with((), self.fetch_token())
            .await
            .map_err(|e| match Arc::try_unwrap(e) {
                Ok(err) => err,
                Err(shared) => PaymentError::InvalidResponse {
                    provider: PROVIDER,
                    message: shared.to_string(),
                },
            })
    }

    async fn fetch_token(&self) -> Result<Arc<String>, PaymentError> {
        let response = self
            .inner
            .client
            .post(format!("{}/v1/oauth2/token", self.inner.api_base))
            .basic_auth(
                &self.inner.client_id,
                Some(self.inner.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %truncate(&body), "PayPal token request failed");
            return Err(PaymentError::Provider {
                provider: PROVIDER,
                status: status.as_u16(),
                message: "authentication failed".to_owned(),
            });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!("PayPal access token refreshed");
        Ok(Arc::new(token.access_token))
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, PaymentError> {
        let token = self.access_token().await?;
        let response = self
            .inner
            .client
            .post(format!("{}{path}", self.inner.api_base))
            .bearer_auth(token.as_str())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.inner.token.invalidate(&()).await;
            }
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
                .unwrap_or_else(|| truncate(&text));
            tracing::error!(%status, %message, path, "PayPal request failed");
            return Err(PaymentError::Provider {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| PaymentError::InvalidResponse {
            provider: PROVIDER,
            message: e.to_string(),
        })
    }

    fn payment_body(&self, request: &PaymentRequest<'_>) -> serde_json::Value {
        payment_body(request, &self.inner.return_url, &self.inner.cancel_url)
    }
}

/// JSON body of `POST /v1/payments/payment`.
fn payment_body(
    request: &PaymentRequest<'_>,
    return_url: &str,
    cancel_url: &str,
) -> serde_json::Value {
    let order = request.order;
    let total = format!("{:.2}", order.total);
    json!({
        "intent": "sale",
        "payer": {"payment_method": "paypal"},
        "redirect_urls": {
            "return_url": return_url,
            "cancel_url": cancel_url,
        },
        "transactions": [{
            "item_list": {"items": [{
                "name": format!("Order {}", order.order_number),
                "sku": order.order_number,
                "price": total,
                "currency": order.currency,
                "quantity": 1,
            }]},
            "amount": {"total": total, "currency": order.currency},
            "description": request.description(),
            "invoice_number": order.order_number,
        }],
    })
}

fn approval_url(created: &CreatedPayment) -> Option<&str> {
    created
        .links
        .iter()
        .find(|link| link.rel == "approval_url")
        .map(|link| link.href.as_str())
}

/// Interpret the response of the execute call.
fn interpret_execution(value: serde_json::Value) -> Result<Confirmation, PaymentError> {
    let executed: ExecutedPayment =
        serde_json::from_value(value.clone()).map_err(|e| PaymentError::InvalidResponse {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

    if executed.state != "approved" {
        return Ok(Confirmation::Failed {
            transaction_id: executed.id,
            reason: format!("payment state is {}", executed.state),
        });
    }

    let (amount, currency) = executed
        .transactions
        .first()
        .ok_or_else(|| PaymentError::InvalidResponse {
            provider: PROVIDER,
            message: "executed payment has no transactions".to_owned(),
        })?
        .amount
        .parse()?;

    Ok(Confirmation::Succeeded(ConfirmedPayment {
        order_id: None,
        transaction_id: executed.id,
        amount,
        currency,
        gateway_response: value,
    }))
}

impl Amount {
    fn parse(&self) -> Result<(Decimal, String), PaymentError> {
        let total = self
            .total
            .parse::<Decimal>()
            .map_err(|e| PaymentError::InvalidResponse {
                provider: PROVIDER,
                message: format!("bad amount `{}`: {e}", self.total),
            })?;
        Ok((total, self.currency.to_ascii_uppercase()))
    }
}

impl PaymentGateway for PaypalGateway {
    type Confirm = PaypalReturn;

    fn method(&self) -> PaymentMethod {
        PaymentMethod::Paypal
    }

    async fn initiate(&self, request: &PaymentRequest<'_>) -> Result<Initiation, PaymentError> {
        let gateway_response = self
            .post_json("/v1/payments/payment", &self.payment_body(request))
            .await?;
        let created: CreatedPayment =
            serde_json::from_value(gateway_response.clone()).map_err(|e| {
                PaymentError::InvalidResponse {
                    provider: PROVIDER,
                    message: e.to_string(),
                }
            })?;
        let redirect = approval_url(&created)
            .ok_or_else(|| PaymentError::InvalidResponse {
                provider: PROVIDER,
                message: "no approval_url link".to_owned(),
            })?
            .to_owned();

        Ok(Initiation {
            transaction_id: created.id,
            gateway_response,
            next_action: NextAction::Redirect(redirect),
        })
    }

    async fn confirm(&self, input: PaypalReturn) -> Result<Confirmation, PaymentError> {
        let path = format!(
            "/v1/payments/payment/{}/execute",
            urlencoding::encode(&input.payment_id)
        );
        match self
            .post_json(&path, &json!({"payer_id": input.payer_id}))
            .await
        {
            Ok(value) => interpret_execution(value),
            // PayPal refuses to execute declined or expired approvals with 400.
            Err(PaymentError::Provider {
                status: 400,
                message,
                ..
            }) => Ok(Confirmation::Failed {
                transaction_id: input.payment_id,
                reason: message,
            }),
            Err(other) => Err(other),
        }
    }
}
