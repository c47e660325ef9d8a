//! Application state shared across handlers.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;

use suuq_core::PaymentMethod;

use crate::config::ServerConfig;
use crate::services::email::{EmailError, EmailService};
use crate::services::payments::{
    MobileMoneyGateway, MobileMoneyProvider, PaypalGateway, StripeGateway, http_client,
};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("email: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Every integration is built
/// once at startup; disabled ones are `None`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    email: Option<EmailService>,
    stripe: Option<StripeGateway>,
    paypal: Option<PaypalGateway>,
    mobile_money: HashMap<MobileMoneyProvider, MobileMoneyGateway>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the SMTP transport cannot be
    /// built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, StateError> {
        let client = http_client()?;
        let payments = &config.payments;

        let stripe = payments
            .stripe
            .as_ref()
            .map(|c| StripeGateway::new(c, client.clone()));
        let paypal = payments
            .paypal
            .as_ref()
            .map(|c| PaypalGateway::new(c, &config.base_url, client.clone()));
        let mobile_money: HashMap<_, _> = MobileMoneyProvider::ALL
            .into_iter()
            .filter_map(|provider| {
                provider
                    .config(payments)
                    .map(|c| (provider, MobileMoneyGateway::new(provider, c, client.clone())))
            })
            .collect();
        let email = config.email.as_ref().map(EmailService::new).transpose()?;

        tracing::info!(
            stripe = stripe.is_some(),
            paypal = paypal.is_some(),
            mobile_money = ?mobile_money.keys().collect::<Vec<_>>(),
            email = email.is_some(),
            "integrations configured"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                email,
                stripe,
                paypal,
                mobile_money,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// SMTP mailer, if configured.
    #[must_use]
    pub fn email(&self) -> Option<&EmailService> {
        self.inner.email.as_ref()
    }

    /// Stripe gateway, if configured.
    #[must_use]
    pub fn stripe(&self) -> Option<&StripeGateway> {
        self.inner.stripe.as_ref()
    }

    /// `PayPal` gateway, if configured.
    #[must_use]
    pub fn paypal(&self) -> Option<&PaypalGateway> {
        self.inner.paypal.as_ref()
    }

    /// Mobile-money gateway for `provider`, if configured.
    #[must_use]
    pub fn mobile_money(&self, provider: MobileMoneyProvider) -> Option<&MobileMoneyGateway> {
        self.inner.mobile_money.get(&provider)
    }

    /// Payment methods a customer can choose at checkout: every configured
    /// provider plus cash on delivery.
    #[must_use]
    pub fn payment_methods(&self) -> Vec<PaymentMethod> {
        let mut methods = Vec::with_capacity(PaymentMethod::ALL.len());
        if self.inner.stripe.is_some() {
            methods.push(PaymentMethod::Stripe);
        }
        if self.inner.paypal.is_some() {
            methods.push(PaymentMethod::Paypal);
        }
        methods.extend(
            MobileMoneyProvider::ALL
                .into_iter()
                .filter(|p| self.inner.mobile_money.contains_key(p))
                .map(MobileMoneyProvider::method),
        );
        methods.push(PaymentMethod::CashOnDelivery);
        methods
    }
}
