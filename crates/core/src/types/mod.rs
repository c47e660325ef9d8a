//! Core types for Suuq.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod order_number;
pub mod slug;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, CurrencyError, from_minor_units, to_minor_units};
pub use order_number::OrderNumber;
pub use slug::{MAX_SLUG_LEN, pick_available_slug, slugify};
pub use status::*;
