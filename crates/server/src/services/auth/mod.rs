//! Authentication service.
//!
//! Password registration and login. Sessions are handled by the
//! `middleware::auth` helpers; this module only decides who someone is.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use sqlx::PgPool;

use suuq_core::Email;

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::user::{NewUser, User};

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Username length bounds, in characters.
const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=20;

/// Longest first or last name, in characters.
const MAX_NAME_LENGTH: usize = 50;

/// Registration form input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

impl Registration {
    /// Check every field and produce the row to insert.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn validate(&self, is_admin: bool) -> Result<NewUser, AuthError> {
        let username = self.username.trim();
        if !USERNAME_LENGTH.contains(&username.chars().count()) {
            return Err(AuthError::Validation(format!(
                "username must be between {} and {} characters",
                USERNAME_LENGTH.start(),
                USERNAME_LENGTH.end()
            )));
        }

        let email = Email::parse(&self.email)?;

        let first_name = required_name(&self.first_name, "first name")?;
        let last_name = required_name(&self.last_name, "last name")?;

        validate_password(&self.password)?;
        if self.password != self.confirm_password {
            return Err(AuthError::WeakPassword("passwords do not match".to_owned()));
        }

        let phone = self
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned);

        Ok(NewUser {
            username: username.to_owned(),
            email,
            first_name,
            last_name,
            phone,
            is_admin,
        })
    }
}

fn required_name(value: &str, field: &str) -> Result<String, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::Validation(format!(
            "{field} must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(value.to_owned())
}

/// Authentication service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Register a new customer or store owner.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation`, `InvalidEmail` or `WeakPassword` for
    /// bad input, `EmailTaken` / `UsernameTaken` on duplicates.
    #[tracing::instrument(skip(self, form), fields(username = %form.username))]
    pub async fn register(&self, form: &Registration) -> Result<User, AuthError> {
        self.create(form, false).await
    }

    /// Register a platform administrator (CLI bootstrap).
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub async fn register_admin(&self, form: &Registration) -> Result<User, AuthError> {
        self.create(form, true).await
    }

    async fn create(&self, form: &Registration, is_admin: bool) -> Result<User, AuthError> {
        let new_user = form.validate(is_admin)?;
        let password_hash = hash_password(&form.password)?;

        let user = self
            .users
            .create(&new_user, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(constraint) if constraint == "users_username_key" => {
                    AuthError::UsernameTaken
                }
                RepositoryError::Conflict(_) => AuthError::EmailTaken,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, is_admin, "user registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong
    /// and `AuthError::AccountDisabled` if the account was deactivated.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let credentials = self
            .users
            .get_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &credentials.password_hash)?;

        if !credentials.user.is_active {
            tracing::info!(user_id = %credentials.user.id, "login refused for inactive user");
            return Err(AuthError::AccountDisabled);
        }

        Ok(credentials.user)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
