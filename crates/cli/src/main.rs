//! Sole CLI - Database migrations and catalog seeding.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! sole migrate
//!
//! # Seed the six-sneaker catalog and its reviews (no-op when populated)
//! sole seed
//! ```
//!
//! Both commands read `STOREFRONT_DATABASE_URL` (falling back to
//! `DATABASE_URL`), loading `.env` if present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sole")]
#[command(author, version, about = "Sole CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed catalog and reviews if they are empty
    Seed,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await,
        Commands::Seed => commands::seed::catalog().await,
    }
}
