//! Suuq Core - Shared domain types.
//!
//! This crate provides the types used across all Suuq components:
//! - `server` - Storefront, merchant dashboard, admin console and payment routes
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. Database encoding for IDs and enums is available
//! behind the `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, emails, statuses, money, slugs and order numbers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
