//! Authentication guards and extractors.
//!
//! Role gating is composed at route registration: [`require_login`] wraps
//! `/dashboard`, [`require_admin`] wraps `/admin`. Both re-read the user row
//! so a deactivated or demoted account loses access on its next request.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::db::UserRepository;
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::models::CurrentUser;
use crate::models::session::keys;
use crate::state::AppState;

/// Where anonymous visitors are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// Extractor that requires a logged-in user.
///
/// Behind a guard the user comes from request extensions; elsewhere it is
/// read from the session.
///
/// # Example
///
/// ```rust,ignore
/// async fn overview(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

/// Error returned when a handler needs a user and there is none.
pub enum AuthRejection {
    /// Redirect to the login page (browser navigation).
    RedirectToLogin,
    /// Bare 401 (payment and other API endpoints).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let OptionalUser(user) = OptionalUser::from_request_parts(parts, state)
            .await
            .unwrap_or(OptionalUser(None));

        user.map(Self).ok_or_else(|| {
            if parts.uri.path().starts_with("/payment/") {
                AuthRejection::Unauthorized
            } else {
                AuthRejection::RedirectToLogin
            }
        })
    }
}

/// Extractor that optionally gets the current user.
pub struct OptionalUser(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(Self(Some(user.clone())));
        }

        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user))
    }
}

/// Resolve the session user against the database.
///
/// Returns `None` (and forgets the session identity) when the account is
/// gone or deactivated.
async fn refresh_user(state: &AppState, session: &Session) -> Result<Option<CurrentUser>, AppError> {
    let Some(cached) = session.get::<CurrentUser>(keys::CURRENT_USER).await? else {
        return Ok(None);
    };

    let user = UserRepository::new(state.pool()).get_by_id(cached.id).await?;
    match user {
        Some(user) if user.is_active => {
            let current = CurrentUser::from(&user);
            if current != cached {
                set_current_user(session, &current).await?;
            }
            Ok(Some(current))
        }
        _ => {
            tracing::info!(user_id = %cached.id, "dropping session for missing or inactive user");
            clear_current_user(session).await?;
            Ok(None)
        }
    }
}

/// Guard for routes that need any logged-in user.
///
/// # Errors
///
/// Returns an error if the session store or database fails.
pub async fn require_login(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = refresh_user(&state, &session).await? else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Guard for routes that need an administrator.
///
/// Anonymous visitors are sent to the login page; logged-in non-admins get
/// 403.
///
/// # Errors
///
/// Returns an error if the session store or database fails, or
/// `AppError::Forbidden` for non-admins.
pub async fn require_admin(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = refresh_user(&state, &session).await? else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    if !user.is_admin {
        tracing::warn!(user_id = %user.id, path = %request.uri().path(), "admin area refused");
        return Err(AppError::Forbidden("administrator access required".to_owned()));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Store the logged-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(keys::CURRENT_USER, user).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Forget the logged-in user (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<CurrentUser>(keys::CURRENT_USER).await?;
    clear_sentry_user();
    Ok(())
}
