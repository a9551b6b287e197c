//! Classfund CLI - shared class-fund manager
//!
//! Usage:
//!   classfund init                Initialize database
//!   classfund serve --port 3000   Start web server
//!   classfund seed-demo           Seed a demo class
//!   classfund ledger --class 1    Print a class ledger
//!   classfund status              Show database status

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Serve {
            port,
            host,
            no_auth,
            images_dir,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, images_dir).await,
        Commands::SeedDemo => commands::cmd_seed_demo(&cli.db),
        Commands::Ledger {
            class,
            cycle,
            from,
            to,
        } => commands::cmd_ledger(&cli.db, class, cycle, from.as_deref(), to.as_deref()),
        Commands::Status => commands::cmd_status(&cli.db),
    }
}
