//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use suuq_core::{Email, SubscriptionTier, UserId};

/// A registered account: customer, store owner, or platform admin.
///
/// The password hash is not part of this type; only
/// [`UserRepository::get_credentials_by_email`] loads it.
///
/// [`UserRepository::get_credentials_by_email`]: crate::db::UserRepository::get_credentials_by_email
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub subscription_tier: SubscriptionTier,
    pub subscription_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// "First Last", trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

/// Validated input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub is_admin: bool,
}
