//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! # Apply schema migrations and create the session table
//! suuq migrate
//! ```
//!
//! # Environment Variables
//!
//! - `SUUQ_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Schema migrations live in `crates/server/migrations/` and are embedded
//! into the binary at compile time. The session table belongs to
//! `tower-sessions-sqlx-store` and is created by its own migration.

use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Session store migration error: {0}")]
    SessionStore(#[from] sqlx::Error),
}

/// Run every pending migration.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running schema migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Creating session table...");
    suuq_server::middleware::session::session_store(&pool)
        .migrate()
        .await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
