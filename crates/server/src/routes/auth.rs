//! Account route handlers: registration, login and logout.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{OptionalUser, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthService, MIN_PASSWORD_LENGTH, Registration};
use crate::state::AppState;

/// Where users land after logging in.
const AFTER_LOGIN: &str = "/dashboard";

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    /// Local path to return to.
    pub next: Option<String>,
}

/// `?next=` on the login page.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    /// Local path to return to after logging in.
    pub next: Option<String>,
}

/// Registration page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub min_password_len: usize,
}

/// Login page: anonymous visitors get the form, logged-in users are sent on.
pub async fn login_page(
    OptionalUser(user): OptionalUser,
    Query(query): Query<NextQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to(AFTER_LOGIN).into_response();
    }
    LoginTemplate {
        next: query.next.filter(|next| is_local_path(next)),
    }
    .into_response()
}

/// Registration page.
pub async fn register_page(OptionalUser(user): OptionalUser) -> Response {
    if user.is_some() {
        return Redirect::to(AFTER_LOGIN).into_response();
    }
    RegisterTemplate {
        min_password_len: MIN_PASSWORD_LENGTH,
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect> {
    let user = AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await?;
    start_session(&session, &user).await?;

    let target = form
        .next
        .as_deref()
        .filter(|next| is_local_path(next))
        .unwrap_or(AFTER_LOGIN);
    Ok(Redirect::to(target))
}

/// Handle registration form submission; the new account is logged in.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<Registration>,
) -> Result<Redirect> {
    let user = AuthService::new(state.pool()).register(&form).await?;
    start_session(&session, &user).await?;
    Ok(Redirect::to(AFTER_LOGIN))
}

/// Handle logout. The cart survives; the identity and session id do not.
pub async fn logout(session: Session) -> Result<Redirect> {
    clear_current_user(&session).await?;
    session.cycle_id().await?;
    Ok(Redirect::to("/"))
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    session.cycle_id().await?;
    set_current_user(session, &CurrentUser::from(user)).await?;
    let user_id = user.id.to_string();
    add_breadcrumb("auth", "User logged in", Some(&[("user_id", user_id.as_str())]));
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(())
}

/// Only same-site absolute paths are followed after login.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\')
}
