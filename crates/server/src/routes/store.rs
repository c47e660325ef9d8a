//! Public store front: store page, product detail and WhatsApp ordering.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::Redirect,
};
use tower_sessions::Session;
use tracing::instrument;

use suuq_core::ProductId;

use crate::db::{ProductRepository, StoreRepository};
use crate::error::{AppError, Result};
use crate::models::{Cart, Product, Store};
use crate::state::AppState;

/// Related products shown on a product page.
const RELATED_LIMIT: i64 = 4;

/// Store page template.
#[derive(Template, WebTemplate)]
#[template(path = "store/show.html")]
pub struct StoreTemplate {
    pub store: Store,
    pub products: Vec<Product>,
    pub featured: Vec<Product>,
    pub cart_count: u32,
}

/// Product detail template.
#[derive(Template, WebTemplate)]
#[template(path = "store/product.html")]
pub struct ProductTemplate {
    pub store: Store,
    pub product: Product,
    pub related: Vec<Product>,
    pub cart_count: u32,
}

/// Load an active store by slug or answer 404.
pub(crate) async fn active_store(state: &AppState, slug: &str) -> Result<Store> {
    StoreRepository::new(state.pool())
        .get_active_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {slug}")))
}

/// Load an active product of `store` or answer 404.
pub(crate) async fn active_product(
    state: &AppState,
    store: &Store,
    product_id: ProductId,
) -> Result<Product> {
    ProductRepository::new(state.pool())
        .get_active_in_store(store.id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))
}

/// Store page with its active and featured products.
#[instrument(skip(state, session))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<StoreTemplate> {
    let store = active_store(&state, &slug).await?;
    let products = ProductRepository::new(state.pool())
        .list_active(store.id)
        .await?;
    let featured = products.iter().filter(|p| p.is_featured).cloned().collect();
    let cart_count = Cart::load(&session).await?.item_count(store.id);

    Ok(StoreTemplate {
        store,
        products,
        featured,
        cart_count,
    })
}

/// Product detail with a few other products from the same store.
#[instrument(skip(state, session))]
pub async fn product(
    State(state): State<AppState>,
    session: Session,
    Path((slug, product_id)): Path<(String, ProductId)>,
) -> Result<ProductTemplate> {
    let store = active_store(&state, &slug).await?;
    let product = active_product(&state, &store, product_id).await?;
    let related = ProductRepository::new(state.pool())
        .related(store.id, product.id, RELATED_LIMIT)
        .await?;
    let cart_count = Cart::load(&session).await?.item_count(store.id);

    Ok(ProductTemplate {
        store,
        product,
        related,
        cart_count,
    })
}

/// Redirect to a WhatsApp chat with the store, pre-filled with the product.
#[instrument(skip(state))]
pub async fn whatsapp_order(
    State(state): State<AppState>,
    Path((slug, product_id)): Path<(String, ProductId)>,
) -> Result<Redirect> {
    let store = active_store(&state, &slug).await?;
    let product = active_product(&state, &store, product_id).await?;
    let url = whatsapp_url(&store, &product, &state.config().base_url)
        .ok_or_else(|| AppError::NotFound("WhatsApp contact for this store".to_owned()))?;
    Ok(Redirect::to(&url))
}

/// `wa.me` link for ordering `product`, or `None` if the store has no phone.
fn whatsapp_url(store: &Store, product: &Product, base_url: &str) -> Option<String> {
    let phone: String = store
        .phone
        .as_deref()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if phone.is_empty() {
        return None;
    }

    let message = format!(
        "Hi! I'd like to order:\n\n{}\nPrice: {}\n\nStore: {}\nStore URL: {}",
        product.name,
        product.price,
        store.name,
        store.url(base_url)
    );
    Some(format!(
        "https://wa.me/{phone}?text={}",
        urlencoding::encode(&message)
    ))
}
