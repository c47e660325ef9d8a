//! Landing page and store directory.

use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;
use tracing::instrument;

use crate::db::StoreRepository;
use crate::error::Result;
use crate::middleware::OptionalUser;
use crate::models::{CurrentUser, Store};
use crate::state::AppState;

/// Stores shown on the landing page.
const HOME_STORE_LIMIT: usize = 8;

/// Landing page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
    pub stores: Vec<Store>,
}

/// Store directory template.
#[derive(Template, WebTemplate)]
#[template(path = "stores.html")]
pub struct StoreDirectoryTemplate {
    pub stores: Vec<Store>,
}

/// Landing page.
#[instrument(skip_all)]
pub async fn home(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> Result<HomeTemplate> {
    let mut stores = StoreRepository::new(state.pool()).list_active().await?;
    stores.truncate(HOME_STORE_LIMIT);
    Ok(HomeTemplate { user, stores })
}

/// Every active store.
#[instrument(skip_all)]
pub async fn stores(State(state): State<AppState>) -> Result<StoreDirectoryTemplate> {
    let stores = StoreRepository::new(state.pool()).list_active().await?;
    Ok(StoreDirectoryTemplate { stores })
}
