//! Product domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use suuq_core::{ProductId, StoreId};

/// A product listed by a store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether a cart entry for this product in `store_id` may be bought.
    #[must_use]
    pub fn is_available_in(&self, store_id: StoreId) -> bool {
        self.is_active && self.store_id == store_id
    }

    /// Whether `compare_price` shows a discount.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.compare_price.is_some_and(|compare| compare > self.price)
    }
}

/// Validated input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub store_id: StoreId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_price: Option<Decimal>,
    pub stock_quantity: i32,
    pub is_featured: bool,
    pub image_url: Option<String>,
}
