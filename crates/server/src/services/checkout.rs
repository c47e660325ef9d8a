//! Checkout: cart to order.
//!
//! [`plan_order`] validates a store's cart against current product rows and
//! prices every line. [`CheckoutService::place_order`] persists the plan with
//! [`OrderRepository::create`], which decrements stock in the same
//! transaction.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use suuq_core::{CurrencyCode, PaymentMethod, ProductId, StoreId, UserId};

use crate::config::PricePolicy;
use crate::db::orders::CHECKOUT_TOKEN_CONSTRAINT;
use crate::db::{OrderRepository, ProductRepository, RepositoryError};
use crate::models::cart::StoreCart;
use crate::models::order::{NewOrder, NewOrderLine, Order};
use crate::models::product::Product;

use super::cart::unit_price;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("your cart is empty")]
    EmptyCart,

    /// Cart entries whose product was removed, deactivated or moved.
    #[error("some items are no longer available: {}", .0.join(", "))]
    UnavailableItems(Vec<String>),

    #[error("not enough stock for {name}")]
    InsufficientStock { product_id: ProductId, name: String },

    /// The posted checkout token is missing or does not match the session.
    #[error("this checkout form has expired, please review your cart and try again")]
    InvalidToken,

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CheckoutError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::InsufficientStock(product_id) => Self::InsufficientStock {
                product_id,
                name: format!("product {product_id}"),
            },
            other => Self::Repository(other),
        }
    }
}

/// Priced, validated lines ready to become an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlan {
    pub lines: Vec<NewOrderLine>,
    pub subtotal: Decimal,
}

/// Validate `entries` against `products` and price them under `policy`.
///
/// Every unavailable entry is reported, not dropped. A line asking for more
/// than the product's current stock is rejected up front; the guarded
/// decrement at commit time still has the final word.
///
/// # Errors
///
/// - `CheckoutError::EmptyCart` if there are no entries
/// - `CheckoutError::UnavailableItems` listing every unusable entry
/// - `CheckoutError::InsufficientStock` for the first short line
pub fn plan_order(
    store_id: StoreId,
    entries: &StoreCart,
    products: &[Product],
    policy: PricePolicy,
) -> Result<OrderPlan, CheckoutError> {
    if entries.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let mut unavailable = Vec::new();
    let mut lines = Vec::with_capacity(entries.len());
    for (product_id, entry) in entries {
        let Some(product) = by_id
            .get(product_id)
            .copied()
            .filter(|p| p.is_available_in(store_id))
        else {
            unavailable.push(
                by_id
                    .get(product_id)
                    .map_or_else(|| format!("product #{product_id}"), |p| p.name.clone()),
            );
            continue;
        };

        let quantity = i32::try_from(entry.quantity).unwrap_or(i32::MAX);
        if quantity < 1 {
            continue;
        }
        if product.stock_quantity < quantity {
            return Err(CheckoutError::InsufficientStock {
                product_id: product.id,
                name: product.name.clone(),
            });
        }

        let unit_price = unit_price(policy, product, entry);
        lines.push(NewOrderLine {
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price,
            total: unit_price * Decimal::from(quantity),
        });
    }

    if !unavailable.is_empty() {
        return Err(CheckoutError::UnavailableItems(unavailable));
    }
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let subtotal = lines.iter().map(|line| line.total).sum();
    Ok(OrderPlan { lines, subtotal })
}

/// Everything needed to place one order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'c> {
    pub store_id: StoreId,
    pub customer_id: Option<UserId>,
    pub entries: &'c StoreCart,
    pub checkout_token: String,
    pub payment_method: Option<PaymentMethod>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

/// Outcome of [`CheckoutService::place_order`].
#[derive(Debug)]
pub struct PlacedOrder {
    pub order: Order,
    /// `false` when the checkout token had already produced this order.
    pub created: bool,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    policy: PricePolicy,
    currency: &'a CurrencyCode,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, policy: PricePolicy, currency: &'a CurrencyCode) -> Self {
        Self {
            pool,
            policy,
            currency,
        }
    }

    /// Turn the cart into an order, at most once per checkout token.
    ///
    /// A token that already produced an order in this store returns that
    /// order with `created = false`, without touching stock again.
    ///
    /// # Errors
    ///
    /// Returns the [`plan_order`] errors, `CheckoutError::InsufficientStock`
    /// if the guarded decrement fails, or `CheckoutError::Repository`.
    #[tracing::instrument(skip(self, request), fields(store_id = %request.store_id))]
    pub async fn place_order(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<PlacedOrder, CheckoutError> {
        let orders = OrderRepository::new(self.pool);

        if let Some(order) = self.replayed(&orders, request).await? {
            return Ok(PlacedOrder {
                order,
                created: false,
            });
        }

        let ids: Vec<ProductId> = request.entries.keys().copied().collect();
        let products = ProductRepository::new(self.pool).get_many(&ids).await?;
        let plan = plan_order(request.store_id, request.entries, &products, self.policy)?;

        let new_order = NewOrder {
            customer_id: request.customer_id,
            store_id: request.store_id,
            subtotal: plan.subtotal,
            total: plan.subtotal,
            currency: self.currency.as_str().to_owned(),
            payment_method: request.payment_method,
            shipping_address: request.shipping_address.clone(),
            notes: request.notes.clone(),
            checkout_token: Some(request.checkout_token.clone()),
            lines: plan.lines,
        };

        match orders.create(&new_order).await {
            Ok(order) => Ok(PlacedOrder {
                order,
                created: true,
            }),
            Err(RepositoryError::Conflict(constraint))
                if constraint == CHECKOUT_TOKEN_CONSTRAINT =>
            {
                // A concurrent submit of the same form won the insert.
                self.replayed(&orders, request)
                    .await?
                    .map(|order| PlacedOrder {
                        order,
                        created: false,
                    })
                    .ok_or(CheckoutError::InvalidToken)
            }
            Err(RepositoryError::InsufficientStock(product_id)) => {
                let name = products
                    .iter()
                    .find(|p| p.id == product_id)
                    .map_or_else(|| format!("product #{product_id}"), |p| p.name.clone());
                Err(CheckoutError::InsufficientStock { product_id, name })
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn replayed(
        &self,
        orders: &OrderRepository<'_>,
        request: &CheckoutRequest<'_>,
    ) -> Result<Option<Order>, CheckoutError> {
        let existing = orders
            .get_by_checkout_token(&request.checkout_token)
            .await?;
        match existing {
            Some(order) if order.store_id == request.store_id => {
                tracing::info!(order_id = %order.id, "checkout token replayed");
                Ok(Some(order))
            }
            Some(_) => Err(CheckoutError::InvalidToken),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::cart::Cart;
    use crate::services::cart::tests::product;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_cart_rejected() {
        let result = plan_order(StoreId::new(1), &StoreCart::new(), &[], PricePolicy::Live);
        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
    }

    #[test]
    fn test_plan_prices_lines() {
        let store = StoreId::new(1);
        let mut cart = Cart::default();
        cart.add(store, ProductId::new(1), 2, dec("9.00"));
        cart.add(store, ProductId::new(2), 1, dec("3.25"));
        let products = [product(1, 1, "10.00", 5), product(2, 1, "3.25", 1)];

        let plan = plan_order(store, cart.store(store).unwrap(), &products, PricePolicy::Live).unwrap();

        assert_eq!(plan.lines.len(), 2);
        assert_eq!(plan.lines[0].unit_price, dec("10.00"));
        assert_eq!(plan.lines[0].total, dec("20.00"));
        assert_eq!(plan.subtotal, dec("23.25"));
    }

    #[test]
    fn test_captured_policy_uses_cart_price() {
        let store = StoreId::new(1);
        let mut cart = Cart::default();
        cart.add(store, ProductId::new(1), 2, dec("9.00"));
        let products = [product(1, 1, "10.00", 5)];

        let plan =
            plan_order(store, cart.store(store).unwrap(), &products, PricePolicy::Captured).unwrap();

        assert_eq!(plan.subtotal, dec("18.00"));
    }

    #[test]
    fn test_unavailable_items_reported() {
        let store = StoreId::new(1);
        let mut cart = Cart::default();
        cart.add(store, ProductId::new(1), 1, dec("1.00"));
        cart.add(store, ProductId::new(2), 1, dec("1.00"));
        cart.add(store, ProductId::new(3), 1, dec("1.00"));
        let mut inactive = product(2, 1, "1.00", 5);
        inactive.is_active = false;
        let products = [product(1, 1, "1.00", 5), inactive];

        let Err(CheckoutError::UnavailableItems(names)) =
            plan_order(store, cart.store(store).unwrap(), &products, PricePolicy::Live)
        else {
            panic!("expected unavailable items");
        };
        assert_eq!(names, vec!["Product 2".to_owned(), "product #3".to_owned()]);
    }

    #[test]
    fn test_foreign_product_is_unavailable() {
        let store = StoreId::new(1);
        let mut cart = Cart::default();
        cart.add(store, ProductId::new(1), 1, dec("1.00"));
        let products = [product(1, 2, "1.00", 5)];

        assert!(matches!(
            plan_order(store, cart.store(store).unwrap(), &products, PricePolicy::Live),
            Err(CheckoutError::UnavailableItems(_))
        ));
    }

    #[test]
    fn test_short_stock_rejected() {
        let store = StoreId::new(1);
        let mut cart = Cart::default();
        cart.add(store, ProductId::new(1), 3, dec("1.00"));
        let products = [product(1, 1, "1.00", 2)];

        assert!(matches!(
            plan_order(store, cart.store(store).unwrap(), &products, PricePolicy::Live),
            Err(CheckoutError::InsufficientStock { product_id, .. }) if product_id == ProductId::new(1)
        ));
    }
}
