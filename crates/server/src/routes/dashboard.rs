//! Store owner dashboard (`/dashboard/*`).
//!
//! Every route here sits behind [`require_login`](crate::middleware::require_login).
//! Stores are always looked up together with their owner, so another
//! owner's store id answers 404.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::Redirect,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use suuq_core::{Email, ProductId, StoreId, StoreTheme, UserId};

use crate::db::{OrderRepository, ProductRepository, StoreRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::product::NewProduct;
use crate::models::store::NewStore;
use crate::models::{Order, Product, Store};
use crate::state::AppState;

/// Recent orders on the overview.
const RECENT_ORDERS: i64 = 5;

#[derive(Template, WebTemplate)]
#[template(path = "dashboard/overview.html")]
pub struct OverviewTemplate {
    pub stores: Vec<Store>,
    pub total_orders: i64,
    pub total_products: i64,
    /// The most recent orders.
    pub orders: Vec<Order>,
}

#[derive(Template, WebTemplate)]
#[template(path = "dashboard/stores.html")]
pub struct StoresTemplate {
    pub stores: Vec<Store>,
    pub themes: &'static [StoreTheme],
}

#[derive(Template, WebTemplate)]
#[template(path = "dashboard/products.html")]
pub struct ProductsTemplate {
    pub store: Store,
    pub products: Vec<Product>,
}

#[derive(Template, WebTemplate)]
#[template(path = "dashboard/orders.html")]
pub struct OrdersTemplate {
    pub orders: Vec<Order>,
}

/// New store form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreForm {
    pub name: String,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub theme: Option<StoreTheme>,
}

/// New product form data.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProductForm {
    pub name: String,
    pub description: String,
    pub price: String,
    pub compare_price: String,
    pub stock_quantity: String,
    /// Checkbox: present when ticked.
    pub is_featured: Option<String>,
    pub image_url: String,
}

fn optional(value: &str, field: &str, max: usize) -> Result<Option<String>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.chars().count() > max {
        return Err(AppError::BadRequest(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(value.to_owned()))
}

fn required(value: &str, field: &str, max: usize) -> Result<String> {
    optional(value, field, max)?.ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

fn non_negative_decimal(value: &str, field: &str) -> Result<Decimal> {
    let amount: Decimal = value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{field} must be a number")))?;
    if amount < Decimal::ZERO {
        return Err(AppError::BadRequest(format!("{field} cannot be negative")));
    }
    Ok(amount.round_dp(2))
}

impl StoreForm {
    /// Validate into a [`NewStore`] owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` naming the first invalid field.
    pub fn validate(&self, owner_id: UserId) -> Result<NewStore> {
        let email = optional(&self.email, "email", 120)?
            .map(|e| {
                Email::parse(&e)
                    .map(Email::into_inner)
                    .map_err(|err| AppError::BadRequest(err.to_string()))
            })
            .transpose()?;

        Ok(NewStore {
            owner_id,
            name: required(&self.name, "store name", 100)?,
            description: optional(&self.description, "description", 5000)?,
            address: optional(&self.address, "address", 200)?,
            phone: optional(&self.phone, "phone", 20)?,
            email,
            website: optional(&self.website, "website", 200)?,
            theme: self.theme.unwrap_or_default(),
        })
    }
}

impl ProductForm {
    /// Validate into a [`NewProduct`] for `store_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` naming the first invalid field.
    pub fn validate(&self, store_id: StoreId) -> Result<NewProduct> {
        let compare_price = if self.compare_price.trim().is_empty() {
            None
        } else {
            Some(non_negative_decimal(&self.compare_price, "compare price")?)
        };
        let stock_quantity: i32 = self
            .stock_quantity
            .trim()
            .parse()
            .map_err(|_| AppError::BadRequest("stock quantity must be a whole number".to_owned()))?;
        if stock_quantity < 0 {
            return Err(AppError::BadRequest("stock quantity cannot be negative".to_owned()));
        }

        Ok(NewProduct {
            store_id,
            name: required(&self.name, "product name", 100)?,
            description: optional(&self.description, "description", 5000)?,
            price: non_negative_decimal(&self.price, "price")?,
            compare_price,
            stock_quantity,
            is_featured: self.is_featured.is_some(),
            image_url: optional(&self.image_url, "image URL", 500)?,
        })
    }
}

async fn owned_store(state: &AppState, store_id: StoreId, owner_id: UserId) -> Result<Store> {
    StoreRepository::new(state.pool())
        .get_owned(store_id, owner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {store_id}")))
}

fn products_path(store_id: StoreId) -> String {
    format!("/dashboard/stores/{store_id}/products")
}

/// Owner overview.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn overview(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<OverviewTemplate> {
    let pool = state.pool();
    let orders = OrderRepository::new(pool);

    Ok(OverviewTemplate {
        stores: StoreRepository::new(pool).list_by_owner(user.id).await?,
        total_orders: orders.count_by_owner(user.id).await?,
        total_products: ProductRepository::new(pool).count_by_owner(user.id).await?,
        orders: orders.list_by_owner(user.id, Some(RECENT_ORDERS)).await?,
    })
}

/// The owner's stores.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn stores(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<StoresTemplate> {
    let stores = StoreRepository::new(state.pool())
        .list_by_owner(user.id)
        .await?;
    Ok(StoresTemplate {
        stores,
        themes: StoreTheme::ALL,
    })
}

/// Create a store. The slug is derived from the name.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_store(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Form(form): Form<StoreForm>,
) -> Result<Redirect> {
    let new = form.validate(user.id)?;
    let store = StoreRepository::new(state.pool()).create(&new).await?;
    tracing::info!(store_id = %store.id, slug = %store.slug, "store created");
    Ok(Redirect::to("/dashboard/stores"))
}

/// Products of one owned store, active or not.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn products(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(store_id): Path<StoreId>,
) -> Result<ProductsTemplate> {
    let store = owned_store(&state, store_id, user.id).await?;
    let products = ProductRepository::new(state.pool())
        .list_by_store(store.id)
        .await?;
    Ok(ProductsTemplate { store, products })
}

/// Add a product to an owned store.
#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(store_id): Path<StoreId>,
    Form(form): Form<ProductForm>,
) -> Result<Redirect> {
    let store = owned_store(&state, store_id, user.id).await?;
    let new = form.validate(store.id)?;
    let product = ProductRepository::new(state.pool()).create(&new).await?;
    tracing::info!(product_id = %product.id, "product created");
    Ok(Redirect::to(&products_path(store.id)))
}

/// Show or hide a product of an owned store.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn toggle_product(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path((store_id, product_id)): Path<(StoreId, ProductId)>,
) -> Result<Redirect> {
    let store = owned_store(&state, store_id, user.id).await?;
    let product = ProductRepository::new(state.pool())
        .toggle_active(store.id, product_id)
        .await?;
    tracing::info!(%product_id, is_active = product.is_active, "product visibility changed");
    Ok(Redirect::to(&products_path(store.id)))
}

/// Orders across the owner's stores, newest first.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn orders(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<OrdersTemplate> {
    let orders = OrderRepository::new(state.pool())
        .list_by_owner(user.id, None)
        .await?;
    Ok(OrdersTemplate { orders })
}
