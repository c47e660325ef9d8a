//! Store (tenant) domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use suuq_core::{StoreId, StoreTheme, UserId};

/// A tenant's shop, addressed publicly by its unique slug.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub is_active: bool,
    pub theme: StoreTheme,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Public URL of the store front.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/store/{}", base_url.trim_end_matches('/'), self.slug)
    }
}

/// Validated input for creating a store. The slug is derived on insert.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub theme: StoreTheme,
}
