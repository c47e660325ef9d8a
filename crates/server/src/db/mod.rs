//! Database operations.
//!
//! ## Tables
//!
//! - `users` - Accounts (customers, store owners, admins)
//! - `stores` - Tenant shops, unique `slug`
//! - `products` - Store catalog, `stock_quantity >= 0` enforced by CHECK
//! - `orders` / `order_items` - Checked-out carts, unique `order_number` and `checkout_token`
//! - `payments` - Provider payment attempts, unique `(payment_method, transaction_id)`
//! - `tower_sessions.session` - Session storage (created by the session store)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p suuq-cli -- migrate
//! ```

pub mod orders;
pub mod payments;
pub mod products;
pub mod reports;
pub mod stores;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use suuq_core::ProductId;

pub use orders::OrderRepository;
pub use payments::PaymentRepository;
pub use products::ProductRepository;
pub use reports::ReportRepository;
pub use stores::StoreRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A guarded stock decrement matched no row.
    #[error("insufficient stock for product {0}")]
    InsufficientStock(ProductId),
}

/// Name of the unique constraint a database error violated, if any.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    if let sqlx::Error::Database(db_err) = err
        && db_err.is_unique_violation()
    {
        return Some(db_err.constraint().unwrap_or("unknown"));
    }
    None
}

/// Map a unique violation to [`RepositoryError::Conflict`], anything else to `Database`.
pub(crate) fn conflict_or_database(err: sqlx::Error) -> RepositoryError {
    match unique_violation(&err) {
        Some(constraint) => RepositoryError::Conflict(constraint.to_owned()),
        None => RepositoryError::Database(err),
    }
}

/// Default page size for list screens.
pub const PAGE_SIZE: u32 = 20;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1 }
    }
}

impl PageRequest {
    /// Page number clamped to at least 1.
    #[must_use]
    pub const fn page(self) -> u32 {
        if self.page == 0 { 1 } else { self.page }
    }

    #[must_use]
    pub const fn limit(self) -> i64 {
        PAGE_SIZE as i64
    }

    #[must_use]
    pub const fn offset(self) -> i64 {
        (self.page() as i64 - 1) * PAGE_SIZE as i64
    }
}

/// One page of results plus the numbers a pager needs.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = i64::from(PAGE_SIZE);
        Self {
            items,
            page: request.page(),
            per_page: PAGE_SIZE,
            total,
            pages: (total + per_page - 1) / per_page,
        }
    }

    /// Page before this one, if any.
    #[must_use]
    pub const fn previous_page(&self) -> Option<u32> {
        if self.page > 1 { Some(self.page - 1) } else { None }
    }

    /// Page after this one, if any.
    #[must_use]
    pub fn next_page(&self) -> Option<u32> {
        (i64::from(self.page) < self.pages).then(|| self.page + 1)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_offsets() {
        assert_eq!(PageRequest { page: 0 }.offset(), 0);
        assert_eq!(PageRequest { page: 1 }.offset(), 0);
        assert_eq!(PageRequest { page: 3 }.offset(), 40);
        assert_eq!(PageRequest::default().limit(), 20);
    }

    #[test]
    fn test_page_counts() {
        let page: Page<u8> = Page::new(vec![], PageRequest { page: 2 }, 41);
        assert_eq!(page.pages, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.previous_page(), Some(1));
        assert_eq!(page.next_page(), Some(3));

        let last: Page<u8> = Page::new(vec![], PageRequest { page: 3 }, 41);
        assert_eq!(last.next_page(), None);

        let empty: Page<u8> = Page::new(vec![], PageRequest::default(), 0);
        assert_eq!(empty.pages, 0);
        assert_eq!(empty.previous_page(), None);
        assert_eq!(empty.next_page(), None);
    }
}
