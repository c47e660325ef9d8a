//! suuq CLI - Database migrations and user management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! suuq migrate
//!
//! # Promote an existing account to administrator
//! suuq user promote -e owner@example.com
//!
//! # Create an administrator from scratch
//! suuq user create-admin -u admin -e admin@example.com --first-name Ayaan --last-name Warsame
//! ```
//!
//! # Commands
//!
//! - `migrate` - Apply schema migrations and create the session table
//! - `user promote` - Grant admin rights by email
//! - `user create-admin` - Create an administrator account

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "suuq")]
#[command(version, about = "suuq operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Grant admin rights to an existing user
    Promote {
        /// Email address of the account
        #[arg(short, long)]
        email: String,
    },
    /// Create a new administrator account
    CreateAdmin {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Account password
        #[arg(long, env = "SUUQ_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Promote { email } => {
                commands::user::promote(&email).await?;
            }
            UserAction::CreateAdmin {
                username,
                email,
                first_name,
                last_name,
                password,
            } => {
                commands::user::create_admin(commands::user::NewAdmin {
                    username,
                    email,
                    first_name,
                    last_name,
                    password,
                })
                .await?;
            }
        },
    }
    Ok(())
}
