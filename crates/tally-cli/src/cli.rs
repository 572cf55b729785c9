//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Categorize bank statements
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Bank statement labeller and transaction categorizer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Copy ledger categories onto a bank statement
    Label {
        /// Bank name, e.g. ASB
        bank: String,

        /// Bank statement (CSV or spreadsheet)
        statement: PathBuf,

        /// Ledger with a Category or Transfers column
        ledger: PathBuf,

        /// Output file path
        #[arg(short, long, default_value = "Combined-ASB-labelled.csv")]
        output: PathBuf,
    },

    /// Predict categories for a bank statement
    Categorize {
        /// Bank statement (CSV or spreadsheet)
        statement: PathBuf,

        /// Ledger whose matching rows take precedence over predictions
        #[arg(short, long)]
        ledger: Option<PathBuf>,

        /// Output format: json, csv (MoneyWiz)
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the categorization API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable API key authentication (for local development only)
        #[arg(long)]
        no_auth: bool,
    },

    /// Load models and check the embedding backend is ready
    Check,
}
