//! Session cart.
//!
//! The cart is keyed by store, then by product. It is serialized as JSON into
//! the session record under [`keys::CART`](super::session::keys::CART). Each
//! entry remembers the unit price seen when it was added so checkout can
//! honour the `captured` price policy.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use suuq_core::{ProductId, StoreId};

use super::session::keys;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 999;

/// One product in the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub quantity: u32,
    pub captured_price: Decimal,
}

/// Entries for one store.
pub type StoreCart = BTreeMap<ProductId, CartEntry>;

/// A visitor's cart across every store they have shopped in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    stores: BTreeMap<StoreId, StoreCart>,
}

impl Cart {
    /// Load the cart from the session, or an empty cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn load(session: &Session) -> Result<Self, tower_sessions::session::Error> {
        Ok(session.get::<Self>(keys::CART).await?.unwrap_or_default())
    }

    /// Write the cart back to the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn save(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        session.insert(keys::CART, self).await
    }

    /// Add `quantity` of a product, merging with an existing entry.
    ///
    /// The captured price is refreshed to `unit_price`, the price the visitor
    /// saw on this add. Quantities saturate at [`MAX_LINE_QUANTITY`]. Returns
    /// the line's new quantity.
    pub fn add(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Decimal,
    ) -> u32 {
        let entry = self
            .stores
            .entry(store_id)
            .or_default()
            .entry(product_id)
            .or_insert(CartEntry {
                quantity: 0,
                captured_price: unit_price,
            });
        entry.quantity = entry.quantity.saturating_add(quantity).min(MAX_LINE_QUANTITY);
        entry.captured_price = unit_price;
        entry.quantity
    }

    /// Remove a product. Returns whether anything was removed.
    pub fn remove(&mut self, store_id: StoreId, product_id: ProductId) -> bool {
        let Some(entries) = self.stores.get_mut(&store_id) else {
            return false;
        };
        let removed = entries.remove(&product_id).is_some();
        if entries.is_empty() {
            self.stores.remove(&store_id);
        }
        removed
    }

    /// Entries for one store, if any.
    #[must_use]
    pub fn store(&self, store_id: StoreId) -> Option<&StoreCart> {
        self.stores.get(&store_id)
    }

    /// Drop every entry for one store, returning them.
    pub fn clear(&mut self, store_id: StoreId) -> Option<StoreCart> {
        self.stores.remove(&store_id)
    }

    /// Total number of units for one store.
    #[must_use]
    pub fn item_count(&self, store_id: StoreId) -> u32 {
        self.store(store_id)
            .map_or(0, |entries| entries.values().map(|e| e.quantity).sum())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
