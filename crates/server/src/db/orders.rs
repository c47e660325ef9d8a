//! Order repository for database operations.
//!
//! [`OrderRepository::create`] is the checkout transaction: the order row,
//! its lines and the stock decrements commit together or not at all.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use suuq_core::{OrderId, OrderNumber, OrderStatus, StoreId, UserId};

use super::{Page, PageRequest, PaymentRepository, RepositoryError, conflict_or_database};
use crate::models::order::{NewOrder, NewOrderLine, Order, OrderItem, OrderWithItems};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, store_id, status, subtotal, total, \
     currency, payment_method, shipping_address, notes, checkout_token, created_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, price, total";

/// Unique constraint on `orders.order_number`.
pub const ORDER_NUMBER_CONSTRAINT: &str = "orders_order_number_key";

/// Unique constraint on `orders.checkout_token`.
pub const CHECKOUT_TOKEN_CONSTRAINT: &str = "orders_checkout_token_key";

/// Fresh order numbers to try before giving up.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist an order with its lines and decrement stock, atomically.
    ///
    /// Each line's stock decrement is guarded by `stock_quantity >= quantity`;
    /// if any guard matches no row the whole transaction rolls back. Row locks
    /// taken by the guarded `UPDATE` serialize concurrent checkouts of the
    /// same product, so a single remaining unit can only be sold once.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::InsufficientStock` if a line cannot be covered
    /// - `RepositoryError::Conflict(CHECKOUT_TOKEN_CONSTRAINT)` if an order
    ///   with the same checkout token already exists
    /// - `RepositoryError::Database` for anything else
    #[tracing::instrument(skip(self, new), fields(store_id = %new.store_id, lines = new.lines.len()))]
    pub async fn create(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        for attempt in 1..=ORDER_NUMBER_ATTEMPTS {
            match self.try_create(new).await {
                Err(RepositoryError::Conflict(constraint))
                    if constraint == ORDER_NUMBER_CONSTRAINT =>
                {
                    tracing::warn!(attempt, "order number collision, regenerating");
                }
                other => return other,
            }
        }
        Err(RepositoryError::Conflict(ORDER_NUMBER_CONSTRAINT.to_owned()))
    }

    async fn try_create(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let order_number = OrderNumber::generate(Utc::now());

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            INSERT INTO orders
                (order_number, customer_id, store_id, subtotal, total, currency,
                 payment_method, shipping_address, notes, checkout_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order_number.as_str())
        .bind(new.customer_id)
        .bind(new.store_id)
        .bind(new.subtotal)
        .bind(new.total)
        .bind(&new.currency)
        .bind(new.payment_method)
        .bind(&new.shipping_address)
        .bind(&new.notes)
        .bind(&new.checkout_token)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_or_database)?;

        // Lock rows in product-id order so overlapping carts cannot deadlock.
        let mut lines: Vec<&NewOrderLine> = new.lines.iter().collect();
        lines.sort_by_key(|line| line.product_id);

        for line in lines {
            decrement_stock(&mut tx, new.store_id, line).await?;

            sqlx::query(
                r"
                INSERT INTO order_items (order_id, product_id, product_name, quantity, price, total)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(order.id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
        Ok(order)
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(order)
    }

    /// Get the order created by a checkout token, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_checkout_token(&self, token: &str) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE checkout_token = $1"
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;
        Ok(order)
    }

    /// Lines of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// An order with its lines and payment attempts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_with_details(
        &self,
        id: OrderId,
    ) -> Result<Option<OrderWithItems>, RepositoryError> {
        let Some(order) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let items = self.items(id).await?;
        let payments = PaymentRepository::new(self.pool).list_for_order(id).await?;
        Ok(Some(OrderWithItems {
            order,
            items,
            payments,
        }))
    }

    /// All orders, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        request: PageRequest,
        status: Option<OrderStatus>,
    ) -> Result<Page<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ($1::order_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::order_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok(Page::new(orders, request, total))
    }

    /// Orders across every store owned by `owner_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_owner(
        &self,
        owner_id: UserId,
        limit: Option<i64>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let columns = ORDER_COLUMNS
            .split(", ")
            .map(|c| format!("o.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {columns} FROM orders o
            JOIN stores s ON s.id = o.store_id
            WHERE s.owner_id = $1
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $2
            "
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(orders)
    }

    /// Count orders across every store owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_by_owner(&self, owner_id: UserId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders o JOIN stores s ON s.id = o.store_id WHERE s.owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// The most recent orders platform-wide.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(orders)
    }

    /// Count every order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Sum of totals for orders that have been paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue(&self) -> Result<Decimal, RepositoryError> {
        let revenue: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(total) FROM orders WHERE status IN ('paid', 'shipped', 'delivered')",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(revenue.unwrap_or_default())
    }

    /// Set an order's status (admin action).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such order exists.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Orders in one store (used to scope confirmation pages).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_in_store(
        &self,
        store_id: StoreId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND store_id = $2"
        ))
        .bind(id)
        .bind(store_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(order)
    }
}

/// Guarded decrement: succeeds only if the product is active in `store_id`
/// and has at least `line.quantity` units left.
async fn decrement_stock(
    tx: &mut Transaction<'_, Postgres>,
    store_id: StoreId,
    line: &NewOrderLine,
) -> Result<(), RepositoryError> {
    let updated = sqlx::query(
        r"
        UPDATE products
        SET stock_quantity = stock_quantity - $1
        WHERE id = $2 AND store_id = $3 AND is_active AND stock_quantity >= $1
        ",
    )
    .bind(line.quantity)
    .bind(line.product_id)
    .bind(store_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tracing::info!(product_id = %line.product_id, quantity = line.quantity, "stock guard rejected line");
        return Err(RepositoryError::InsufficientStock(line.product_id));
    }
    Ok(())
}
