//! Cart pricing.
//!
//! Turns the session cart for one store into priced lines, using the current
//! product rows and the configured [`PricePolicy`].

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use suuq_core::{ProductId, StoreId};

use crate::config::PricePolicy;
use crate::db::{ProductRepository, RepositoryError};
use crate::models::cart::{CartEntry, StoreCart};
use crate::models::product::Product;

/// One priced cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// The cart of one store as shown to the visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub item_count: u32,
}

impl CartView {
    /// Price `entries` against `products`.
    ///
    /// Entries whose product is missing, inactive, or belongs to another
    /// store are left out of the view.
    #[must_use]
    pub fn build(
        store_id: StoreId,
        entries: &StoreCart,
        products: &[Product],
        policy: PricePolicy,
    ) -> Self {
        let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

        let mut view = Self::default();
        for (product_id, entry) in entries {
            let Some(product) = by_id
                .get(product_id)
                .filter(|p| p.is_available_in(store_id))
            else {
                continue;
            };
            let unit_price = unit_price(policy, product, entry);
            let line_total = unit_price * Decimal::from(entry.quantity);
            view.total += line_total;
            view.item_count += entry.quantity;
            view.lines.push(CartLine {
                product_id: *product_id,
                name: product.name.clone(),
                image_url: product.image_url.clone(),
                quantity: entry.quantity,
                unit_price,
                line_total,
            });
        }
        view
    }

    /// Load the products referenced by `entries` and price them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if loading products fails.
    pub async fn load(
        pool: &PgPool,
        store_id: StoreId,
        entries: Option<&StoreCart>,
        policy: PricePolicy,
    ) -> Result<Self, RepositoryError> {
        let Some(entries) = entries.filter(|e| !e.is_empty()) else {
            return Ok(Self::default());
        };
        let ids: Vec<ProductId> = entries.keys().copied().collect();
        let products = ProductRepository::new(pool).get_many(&ids).await?;
        Ok(Self::build(store_id, entries, &products, policy))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The price charged for one unit under `policy`.
#[must_use]
pub fn unit_price(policy: PricePolicy, product: &Product, entry: &CartEntry) -> Decimal {
    match policy {
        PricePolicy::Live => product.price,
        PricePolicy::Captured => entry.captured_price,
    }
}
