//! Outbound email.
//!
//! Notifications are fire-and-forget: callers spawn [`EmailService::send_order_confirmation`]
//! and only log failures.

use askama::Template;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use thiserror::Error;

use suuq_core::Email;

use crate::config::EmailConfig;
use crate::models::order::{Order, OrderItem};

/// Errors that can occur while sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Plain-text order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    customer_name: &'a str,
    store_name: &'a str,
    order_number: &'a str,
    items: &'a [OrderItem],
    total: Decimal,
    currency: &'a str,
    order_url: &'a str,
}

/// HTML order confirmation.
#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    customer_name: &'a str,
    store_name: &'a str,
    order_number: &'a str,
    items: &'a [OrderItem],
    total: Decimal,
    currency: &'a str,
    order_url: &'a str,
}

/// What goes into an order confirmation.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub to: Email,
    pub customer_name: String,
    pub store_name: String,
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub order_url: String,
}

impl OrderConfirmation {
    /// Render the plain-text and HTML bodies.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn render(&self) -> Result<(String, String), EmailError> {
        let text = OrderConfirmationText {
            customer_name: &self.customer_name,
            store_name: &self.store_name,
            order_number: &self.order.order_number,
            items: &self.items,
            total: self.order.total,
            currency: &self.order.currency,
            order_url: &self.order_url,
        }
        .render()?;
        let html = OrderConfirmationHtml {
            customer_name: &self.customer_name,
            store_name: &self.store_name,
            order_number: &self.order.order_number,
            items: &self.items,
            total: self.order.total,
            currency: &self.order.currency,
            order_url: &self.order_url,
        }
        .render()?;
        Ok((text, html))
    }

    fn subject(&self) -> String {
        format!(
            "Order {} confirmed - {}",
            self.order.order_number, self.store_name
        )
    }
}

/// SMTP mailer.
#[derive(Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    /// Build the SMTP transport (STARTTLS).
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host or sender address is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.expose_secret().to_owned(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from_address.parse()?,
        })
    }

    /// Send an order confirmation.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if rendering, building or delivery fails.
    #[tracing::instrument(skip(self, confirmation), fields(order_id = %confirmation.order.id))]
    pub async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), EmailError> {
        let (text, html) = confirmation.render()?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(confirmation.to.as_str().parse()?)
            .subject(confirmation.subject())
            .multipart(MultiPart::alternative_plain_html(text, html))?;

        self.transport.send(message).await?;
        tracing::info!("order confirmation sent");
        Ok(())
    }
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use suuq_core::{OrderId, OrderItemId, OrderStatus, ProductId, StoreId};

    use super::*;

    fn confirmation() -> OrderConfirmation {
        OrderConfirmation {
            to: Email::parse("amina@example.com").unwrap(),
            customer_name: "Amina".to_owned(),
            store_name: "Acme & Sons".to_owned(),
            order: Order {
                id: OrderId::new(5),
                order_number: "ORD-20250301-ABCDEF012345".to_owned(),
                customer_id: None,
                store_id: StoreId::new(1),
                status: OrderStatus::Pending,
                subtotal: "12.50".parse().unwrap(),
                total: "12.50".parse().unwrap(),
                currency: "USD".to_owned(),
                payment_method: None,
                shipping_address: None,
                notes: None,
                checkout_token: None,
                created_at: Utc::now(),
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(5),
                product_id: ProductId::new(3),
                product_name: "Tea <loose>".to_owned(),
                quantity: 5,
                price: "2.50".parse().unwrap(),
                total: "12.50".parse().unwrap(),
            }],
            order_url: "https://suuq.test/store/acme/order/5/confirmation".to_owned(),
        }
    }

    #[test]
    fn test_render_bodies() {
        let (text, html) = confirmation().render().unwrap();

        assert!(text.contains("ORD-20250301-ABCDEF012345"));
        assert!(text.contains("5 x Tea <loose> @ 2.50 = 12.50"));
        assert!(text.contains("Total: 12.50 USD"));

        assert!(html.contains("<strong>ORD-20250301-ABCDEF012345</strong>"));
        assert!(!html.contains("Tea <loose>"), "html body must be escaped");
    }

    #[test]
    fn test_subject() {
        assert_eq!(
            confirmation().subject(),
            "Order ORD-20250301-ABCDEF012345 confirmed - Acme & Sons"
        );
    }
}
