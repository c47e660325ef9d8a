//! Store repository for database operations.

use std::collections::HashSet;

use sqlx::PgPool;

use suuq_core::{StoreId, UserId, pick_available_slug, slugify};

use super::{Page, PageRequest, RepositoryError, conflict_or_database, unique_violation};
use crate::models::store::{NewStore, Store};

const STORE_COLUMNS: &str = "id, name, slug, description, logo, banner, address, phone, email, \
     website, is_active, theme, owner_id, created_at";

/// How many times to re-pick a slug when a concurrent insert takes it first.
const SLUG_ATTEMPTS: usize = 5;

/// Repository for store database operations.
pub struct StoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoreRepository<'a> {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a store, deriving a unique slug from its name.
    ///
    /// The first store named "Acme" gets `acme`, the next `acme-1`, and so on.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a free slug could not be claimed
    /// after several attempts, `RepositoryError::Database` otherwise.
    #[tracing::instrument(skip(self, new), fields(owner_id = %new.owner_id, name = %new.name))]
    pub async fn create(&self, new: &NewStore) -> Result<Store, RepositoryError> {
        let base = slugify(&new.name);

        for _ in 0..SLUG_ATTEMPTS {
            let taken = self.slugs_like(&base).await?;
            let slug = pick_available_slug(&base, &taken);

            let result = sqlx::query_as::<_, Store>(&format!(
                r"
                INSERT INTO stores (name, slug, description, address, phone, email, website, theme, owner_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING {STORE_COLUMNS}
                "
            ))
            .bind(&new.name)
            .bind(&slug)
            .bind(&new.description)
            .bind(&new.address)
            .bind(&new.phone)
            .bind(&new.email)
            .bind(&new.website)
            .bind(new.theme)
            .bind(new.owner_id)
            .fetch_one(self.pool)
            .await;

            match result {
                Ok(store) => return Ok(store),
                Err(e) if unique_violation(&e) == Some("stores_slug_key") => {
                    tracing::debug!(%slug, "slug taken concurrently, retrying");
                }
                Err(e) => return Err(conflict_or_database(e)),
            }
        }

        Err(RepositoryError::Conflict("stores_slug_key".to_owned()))
    }

    /// Existing slugs equal to `base` or of the form `base-…`.
    async fn slugs_like(&self, base: &str) -> Result<HashSet<String>, RepositoryError> {
        let slugs: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM stores WHERE slug = $1 OR slug LIKE $1 || '-%'")
                .bind(base)
                .fetch_all(self.pool)
                .await?;
        Ok(slugs.into_iter().collect())
    }

    /// Get an active store by slug (public storefront lookup).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE slug = $1 AND is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        Ok(store)
    }

    /// Get a store by ID regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(store)
    }

    /// Get a store only if `owner_id` owns it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_owned(
        &self,
        id: StoreId,
        owner_id: UserId,
    ) -> Result<Option<Store>, RepositoryError> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(store)
    }

    /// All active stores, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Store>, RepositoryError> {
        let stores = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE is_active ORDER BY name, id"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(stores)
    }

    /// Stores owned by one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Store>, RepositoryError> {
        let stores = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(self.pool)
        .await?;
        Ok(stores)
    }

    /// All stores, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, request: PageRequest) -> Result<Page<Store>, RepositoryError> {
        let stores = sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(self.pool)
        .await?;
        Ok(Page::new(stores, request, self.count().await?))
    }

    /// Count all stores.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Flip `is_active` for one store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such store exists.
    pub async fn toggle_active(&self, id: StoreId) -> Result<Store, RepositoryError> {
        sqlx::query_as::<_, Store>(&format!(
            "UPDATE stores SET is_active = NOT is_active WHERE id = $1 RETURNING {STORE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}
