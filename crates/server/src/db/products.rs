//! Product repository for database operations.
//!
//! Stock is only ever decremented inside checkout; see
//! [`OrderRepository::create`](super::OrderRepository::create).

use sqlx::PgPool;

use suuq_core::{ProductId, StoreId, UserId};

use super::{RepositoryError, conflict_or_database};
use crate::models::product::{NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, store_id, name, description, price, compare_price, \
     stock_quantity, is_active, is_featured, image_url, created_at";

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails (including
    /// CHECK violations for negative price or stock).
    pub async fn create(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            INSERT INTO products
                (store_id, name, description, price, compare_price, stock_quantity, is_featured, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(new.store_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.compare_price)
        .bind(new.stock_quantity)
        .bind(new.is_featured)
        .bind(&new.image_url)
        .fetch_one(self.pool)
        .await
        .map_err(conflict_or_database)
    }

    /// Get a product by ID regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// Get an active product that belongs to `store_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_in_store(
        &self,
        store_id: StoreId,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND store_id = $2 AND is_active"
        ))
        .bind(id)
        .bind(store_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// Load several products by ID in one query, in any store and any status.
    ///
    /// Callers decide which of them are usable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(self.pool)
        .await?;
        Ok(products)
    }

    /// Active products of a store, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self, store_id: StoreId) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE store_id = $1 AND is_active
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(store_id)
        .fetch_all(self.pool)
        .await?;
        Ok(products)
    }

    /// Every product of a store, including inactive ones (dashboard).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_store(&self, store_id: StoreId) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE store_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(store_id)
        .fetch_all(self.pool)
        .await?;
        Ok(products)
    }

    /// Up to `limit` other active products from the same store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn related(
        &self,
        store_id: StoreId,
        exclude: ProductId,
        limit: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let products = sqlx::query_as::<_, Product>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE store_id = $1 AND id <> $2 AND is_active
            ORDER BY is_featured DESC, created_at DESC, id DESC
            LIMIT $3
            "
        ))
        .bind(store_id)
        .bind(exclude)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(products)
    }

    /// Flip `is_active` on a product of `store_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in that store.
    pub async fn toggle_active(
        &self,
        store_id: StoreId,
        id: ProductId,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            UPDATE products SET is_active = NOT is_active
            WHERE id = $1 AND store_id = $2
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(store_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Count every product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Count products across every store owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_by_owner(&self, owner_id: UserId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products p JOIN stores s ON s.id = p.store_id WHERE s.owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}
