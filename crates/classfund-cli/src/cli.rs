//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Classfund - shared class-fund manager
#[derive(Parser)]
#[command(name = "classfund")]
#[command(about = "Self-hosted class fund manager with payment-proof auto-verification", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "classfund.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a
        /// network. By default every request must carry the user header
        /// injected by the authenticating proxy.
        #[arg(long)]
        no_auth: bool,

        /// Directory for proof/receipt images (defaults to the platform
        /// data directory)
        #[arg(long)]
        images_dir: Option<PathBuf>,
    },

    /// Seed a demo class with members, a cycle and invoices
    SeedDemo,

    /// Print the reconstructed ledger of a class
    Ledger {
        /// Class id
        #[arg(short, long)]
        class: i64,

        /// Narrow to one fee cycle
        #[arg(long)]
        cycle: Option<i64>,

        /// From date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// To date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Show database status
    Status,
}
