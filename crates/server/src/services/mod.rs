//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration and password login
//! - `cart` - Pricing the session cart
//! - `checkout` - Cart to order, with stock reservation
//! - `email` - Order notifications over SMTP
//! - `payments` - Stripe, `PayPal` and mobile-money adapters

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod email;
pub mod payments;
