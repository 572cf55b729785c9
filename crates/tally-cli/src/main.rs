//! Tally CLI - Bank statement categorizer
//!
//! Usage:
//!   tally label ASB statement.csv ledger.csv -o out.csv   Copy ledger categories
//!   tally categorize statement.xlsx --format csv          Predict categories
//!   tally serve --port 8000                               Start API server
//!   tally check                                           Check models are ready

mod cli;
mod commands;

#[cfg(test)]
mod tests;

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

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Label {
            bank,
            statement,
            ledger,
            output,
        } => commands::cmd_label(&config, &bank, &statement, &ledger, &output),
        Commands::Categorize {
            statement,
            ledger,
            format,
            output,
        } => {
            commands::cmd_categorize(
                &config,
                &statement,
                ledger.as_deref(),
                &format,
                output.as_deref(),
            )
            .await
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&config, &host, port, no_auth).await,
        Commands::Check => commands::cmd_check(&config).await,
    }
}
