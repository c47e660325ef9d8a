//! Payment repository for database operations.

use rust_decimal::Decimal;
use sqlx::PgPool;

use suuq_core::{OrderId, OrderStatus, PaymentMethod, PaymentStatus};

use super::{Page, PageRequest, RepositoryError, conflict_or_database};
use crate::models::payment::{NewPayment, Payment};

const PAYMENT_COLUMNS: &str = "id, order_id, payment_method, amount, currency, status, \
     transaction_id, gateway_response, created_at, updated_at";

/// Result of recording a confirmed payment.
#[derive(Debug)]
pub struct Completion {
    pub payment: Payment,
    /// Whether this call moved the order from `pending` to `paid`.
    pub order_marked_paid: bool,
}

/// Repository for payment database operations.
pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentRepository<'a> {
    /// Create a new payment repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a payment attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the provider transaction id was
    /// already recorded for this method.
    pub async fn create(&self, new: &NewPayment) -> Result<Payment, RepositoryError> {
        sqlx::query_as::<_, Payment>(&format!(
            r"
            INSERT INTO payments
                (order_id, payment_method, amount, currency, status, transaction_id, gateway_response)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(new.order_id)
        .bind(new.payment_method)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(new.status)
        .bind(&new.transaction_id)
        .bind(&new.gateway_response)
        .fetch_one(self.pool)
        .await
        .map_err(conflict_or_database)
    }

    /// Record a `pending` attempt the provider just accepted.
    ///
    /// Providers hand back the same transaction id when an initiation is
    /// retried (Stripe's idempotency key, for one). An existing row for that
    /// id on the same order is reopened as `pending` and returned instead of
    /// inserting a duplicate.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Conflict` if the transaction id belongs to another
    ///   order or is already `completed`
    /// - `RepositoryError::Database` for anything else
    pub async fn record_attempt(&self, new: &NewPayment) -> Result<Payment, RepositoryError> {
        sqlx::query_as::<_, Payment>(&format!(
            r"
            INSERT INTO payments
                (order_id, payment_method, amount, currency, status, transaction_id, gateway_response)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            ON CONFLICT (payment_method, transaction_id) DO UPDATE
                SET status = 'pending',
                    amount = EXCLUDED.amount,
                    currency = EXCLUDED.currency,
                    gateway_response = EXCLUDED.gateway_response,
                    updated_at = NOW()
                WHERE payments.order_id = EXCLUDED.order_id
                  AND payments.status <> 'completed'
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(new.order_id)
        .bind(new.payment_method)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(&new.transaction_id)
        .bind(&new.gateway_response)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| RepositoryError::Conflict("payments_method_transaction_key".to_owned()))
    }

    /// Record a provider-confirmed payment and mark its order paid.
    ///
    /// Upserts the payment by `(payment_method, transaction_id)` as
    /// `completed`, then moves the order from `pending` to `paid` when the
    /// confirmed amount covers the order total. Both happen in one
    /// transaction. Replaying the same confirmation leaves the rows as they
    /// are and reports `order_marked_paid = false`.
    ///
    /// Returns `Ok(None)` if the order does not exist.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Conflict` if the transaction id is already recorded
    ///   against a different order
    /// - `RepositoryError::Database` for anything else
    #[tracing::instrument(skip(self, confirmed), fields(order_id = %confirmed.order_id, method = %confirmed.payment_method))]
    pub async fn complete(
        &self,
        confirmed: &NewPayment,
    ) -> Result<Option<Completion>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_total: Option<Decimal> =
            sqlx::query_scalar("SELECT total FROM orders WHERE id = $1 FOR UPDATE")
                .bind(confirmed.order_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(order_total) = order_total else {
            return Ok(None);
        };

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r"
            INSERT INTO payments
                (order_id, payment_method, amount, currency, status, transaction_id, gateway_response)
            VALUES ($1, $2, $3, $4, 'completed', $5, $6)
            ON CONFLICT (payment_method, transaction_id) DO UPDATE
                SET status = 'completed',
                    amount = EXCLUDED.amount,
                    gateway_response = EXCLUDED.gateway_response,
                    updated_at = NOW()
                WHERE payments.order_id = EXCLUDED.order_id
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(confirmed.order_id)
        .bind(confirmed.payment_method)
        .bind(confirmed.amount)
        .bind(&confirmed.currency)
        .bind(&confirmed.transaction_id)
        .bind(&confirmed.gateway_response)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            RepositoryError::Conflict("transaction id belongs to another order".to_owned())
        })?;

        let order_marked_paid = if confirmed.amount >= order_total {
            sqlx::query("UPDATE orders SET status = $2 WHERE id = $1 AND status = $3")
                .bind(confirmed.order_id)
                .bind(OrderStatus::Paid)
                .bind(OrderStatus::Pending)
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0
        } else {
            tracing::warn!(
                amount = %confirmed.amount,
                %order_total,
                "confirmed amount does not cover order total, order left unchanged"
            );
            false
        };

        tx.commit().await?;
        Ok(Some(Completion {
            payment,
            order_marked_paid,
        }))
    }

    /// Move a payment identified by provider transaction id from `from` to `to`.
    ///
    /// Returns `Ok(None)` if no payment in status `from` matched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition(
        &self,
        method: PaymentMethod,
        transaction_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r"
            UPDATE payments SET status = $4, updated_at = NOW()
            WHERE payment_method = $1 AND transaction_id = $2 AND status = $3
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(method)
        .bind(transaction_id)
        .bind(from)
        .bind(to)
        .fetch_optional(self.pool)
        .await?;
        Ok(payment)
    }

    /// Payment attempts for one order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>, RepositoryError> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at, id"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(payments)
    }

    /// All payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, request: PageRequest) -> Result<Page<Payment>, RepositoryError> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(self.pool)
            .await?;

        Ok(Page::new(payments, request, total))
    }
}
