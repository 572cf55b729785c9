//! Statement labelling command

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use tally_core::export::write_labelled_csv;
use tally_core::{Bank, Config, Reconciler, Table};
use tracing::warn;

use super::{prepare_output, resolve_input};

pub fn cmd_label(
    config: &Config,
    bank: &str,
    statement: &Path,
    ledger: &Path,
    output: &Path,
) -> Result<()> {
    let bank: Bank = bank.parse().map_err(anyhow::Error::msg)?;
    let statement_path = resolve_input(statement)?;
    let ledger_path = resolve_input(ledger)?;
    let output_path = prepare_output(output)?;

    println!(
        "🏷️  Labelling {} statement {}...",
        bank,
        statement_path.display()
    );

    let mut rows = Table::read_path(&statement_path, &config.statement.read_options())
        .with_context(|| format!("Failed to read statement: {}", statement_path.display()))?
        .to_transactions();
    let ledger_rows = Table::read_path(&ledger_path, &config.statement.ledger_options())
        .with_context(|| format!("Failed to read ledger: {}", ledger_path.display()))?
        .to_transactions();

    let reconciler = Reconciler::new(&ledger_rows)?;
    let stats = reconciler.label(&mut rows);

    if !output_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    {
        warn!(
            "Labelled statements are written as CSV regardless of extension: {}",
            output_path.display()
        );
    }
    let file = File::create(&output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
    write_labelled_csv(&rows, BufWriter::new(file))?;

    println!("✅ Labelled file saved to {}", output_path.display());
    println!("   Matched: {}", stats.matched);
    println!("   Unmatched: {}", stats.unmatched);
    println!("   Category column: {}", reconciler.column());

    Ok(())
}
