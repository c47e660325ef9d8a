//! Read-only aggregations for the admin reports screen.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use suuq_core::{PaymentMethod, ProductId};

use super::RepositoryError;

/// Revenue for one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: Decimal,
    pub orders: i64,
}

/// A product ranked by units sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: ProductId,
    pub name: String,
    pub total_sold: i64,
}

/// Number of payment attempts per method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PaymentMethodCount {
    pub payment_method: PaymentMethod,
    pub count: i64,
}

/// Repository for reporting queries.
pub struct ReportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Revenue of paid orders grouped by month, oldest month first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue_by_month(&self) -> Result<Vec<MonthlyRevenue>, RepositoryError> {
        let rows = sqlx::query_as::<_, MonthlyRevenue>(
            r"
            SELECT to_char(date_trunc('month', created_at), 'YYYY-MM') AS month,
                   SUM(total) AS revenue,
                   COUNT(*) AS orders
            FROM orders
            WHERE status IN ('paid', 'shipped', 'delivered')
            GROUP BY 1
            ORDER BY 1
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// The ten products with the most units sold.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_products(&self) -> Result<Vec<TopProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopProduct>(
            r"
            SELECT p.id AS product_id, p.name, SUM(oi.quantity)::BIGINT AS total_sold
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            GROUP BY p.id, p.name
            ORDER BY total_sold DESC, p.id
            LIMIT 10
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Payment attempts per method, most used first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn payment_methods(&self) -> Result<Vec<PaymentMethodCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentMethodCount>(
            r"
            SELECT payment_method, COUNT(*) AS count
            FROM payments
            GROUP BY payment_method
            ORDER BY count DESC, payment_method
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
