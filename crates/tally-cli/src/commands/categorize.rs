//! Statement categorization command

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{CategorizationPipeline, Config, ExportFormat, Reconciler, Table};
use tracing::info;

use super::{load_models, prepare_output, resolve_input};

pub async fn cmd_categorize(
    config: &Config,
    statement: &Path,
    ledger: Option<&Path>,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let rendered = categorize_file(config, statement, ledger, format).await?;

    match output {
        Some(path) => {
            let path = prepare_output(path)?;
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            println!("✅ Categorized statement saved to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

/// Read, categorize and render a statement
pub async fn categorize_file(
    config: &Config,
    statement: &Path,
    ledger: Option<&Path>,
    format: ExportFormat,
) -> Result<String> {
    let statement_path = resolve_input(statement)?;
    let rows = Table::read_path(&statement_path, &config.statement.read_options())
        .with_context(|| format!("Failed to read statement: {}", statement_path.display()))?
        .to_transactions();
    info!(
        "Read {} transactions from {}",
        rows.len(),
        statement_path.display()
    );

    // Ledger problems are reported before any model is loaded
    let reconciler = match ledger {
        Some(ledger) => {
            let ledger_path = resolve_input(ledger)?;
            let ledger_rows = Table::read_path(&ledger_path, &config.statement.ledger_options())
                .with_context(|| format!("Failed to read ledger: {}", ledger_path.display()))?
                .to_transactions();
            Some(Reconciler::new(&ledger_rows)?)
        }
        None => None,
    };
    CategorizationPipeline::validate(&rows)?;

    let state = load_models(config)?;
    state
        .ensure_ready()
        .await
        .context("Models are not ready; run `tally check` for details")?;
    let pipeline = CategorizationPipeline::new(state);

    let categorized = match &reconciler {
        Some(reconciler) => pipeline.categorize_with_ledger(rows, reconciler).await?.0,
        None => pipeline.categorize(rows).await?,
    };

    Ok(format.render(&categorized, &config.export)?)
}
