//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Grant admin rights to an existing account
//! suuq user promote -e owner@example.com
//!
//! # Bootstrap a fresh administrator
//! suuq user create-admin -u admin -e admin@example.com \
//!     --first-name Ayaan --last-name Warsame
//! ```
//!
//! `create-admin` reads the password from `SUUQ_ADMIN_PASSWORD` when
//! `--password` is omitted.

use suuq_core::{Email, UserId};
use suuq_server::db::{RepositoryError, UserRepository};
use suuq_server::services::auth::{AuthError, AuthService, Registration};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserCommandError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with that email.
    #[error("No user with email: {0}")]
    UnknownUser(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Could not create admin: {0}")]
    Auth(#[from] AuthError),
}

/// Promote an existing user to administrator.
pub async fn promote(email: &str) -> Result<UserId, UserCommandError> {
    let parsed = Email::parse(email).map_err(|_| UserCommandError::InvalidEmail(email.to_owned()))?;
    let pool = connect().await?;

    let user = UserRepository::new(&pool)
        .promote_by_email(&parsed)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => UserCommandError::UnknownUser(email.to_owned()),
            other => UserCommandError::Repository(other),
        })?;

    tracing::info!(user_id = %user.id, username = %user.username, "User promoted to admin");
    Ok(user.id)
}

/// Fields for a new administrator.
pub struct NewAdmin {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// Create a new administrator account.
pub async fn create_admin(admin: NewAdmin) -> Result<UserId, UserCommandError> {
    let pool = connect().await?;

    let form = Registration {
        username: admin.username,
        email: admin.email,
        first_name: admin.first_name,
        last_name: admin.last_name,
        phone: None,
        confirm_password: admin.password.clone(),
        password: admin.password,
    };

    let user = AuthService::new(&pool).register_admin(&form).await?;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        "Admin user created successfully"
    );
    Ok(user.id)
}
