//! Export of categorized transactions
//!
//! Supports:
//! - JSON array of categorized rows (source fields plus category fields)
//! - MoneyWiz import CSV with a fixed ten-column layout
//! - Labelled statement CSV (the input table with a `Category` column)

use std::io::Write;
use std::str::FromStr;

use csv::{QuoteStyle, WriterBuilder};

use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::models::{CategorizedTransaction, Transaction};
use crate::table::Table;

/// Export format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }

    /// Render categorized rows in this format
    pub fn render(&self, rows: &[CategorizedTransaction], config: &ExportConfig) -> Result<String> {
        match self {
            Self::Json => to_json(rows),
            Self::Csv => MoneyWizExporter::new(config.clone()).render(rows),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(Error::UnsupportedFormat(format!(
                "export format '{}' (expected json or csv)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Serialize categorized rows as a pretty JSON array
pub fn to_json(rows: &[CategorizedTransaction]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

/// MoneyWiz column order
pub const MONEYWIZ_COLUMNS: [&str; 10] = [
    "Account",
    "Transfers",
    "Description",
    "Payee",
    "Category",
    "Date",
    "Time",
    "Amount",
    "Currency",
    "Probability",
];

/// Renders the MoneyWiz import CSV
///
/// A `sep=,` line precedes the header and every value is quoted. Account,
/// Transfers and Description are left empty; Time and Currency come from
/// config. Rendering is a pure function of its input.
#[derive(Debug, Clone, Default)]
pub struct MoneyWizExporter {
    config: ExportConfig,
}

impl MoneyWizExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn render(&self, rows: &[CategorizedTransaction]) -> Result<String> {
        let mut out = Vec::new();
        self.write(rows, &mut out)?;
        String::from_utf8(out).map_err(|e| Error::InvalidTable(format!("non-UTF-8 export: {}", e)))
    }

    pub fn write<W: Write>(&self, rows: &[CategorizedTransaction], mut writer: W) -> Result<()> {
        writer.write_all(b"sep=,\n")?;

        let mut wtr = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(writer);
        wtr.write_record(MONEYWIZ_COLUMNS)?;
        for row in rows {
            wtr.write_record(self.record(row))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn record(&self, row: &CategorizedTransaction) -> [String; 10] {
        let tx = &row.transaction;
        let probability = row.probability().map(|p| p.to_string()).unwrap_or_default();
        [
            String::new(),
            String::new(),
            String::new(),
            tx.payee().unwrap_or_default().to_string(),
            row.category().to_string(),
            tx.date().unwrap_or_default().to_string(),
            self.config.time.clone(),
            tx.amount().unwrap_or_default().to_string(),
            self.config.currency.clone(),
            probability,
        ]
    }
}

/// Write a labelled statement as CSV, columns in source order
///
/// The `Category` column is added after the source columns, or overwritten
/// in place if the statement already had one.
pub fn write_labelled_csv<W: Write>(statement: &[Transaction], writer: W) -> Result<()> {
    Table::from_transactions(statement).write_csv(writer)
}
