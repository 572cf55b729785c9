//! Error types for Tally

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Could not find file: {path} (tried: {})", format_paths(.tried))]
    FileNotFound { path: PathBuf, tried: Vec<PathBuf> },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Neither column {} was found in ledger", format_columns(.allowed))]
    MissingCategoryColumn { allowed: Vec<String> },

    #[error("Missing required columns in row {row}: {}", .columns.join(", "))]
    MissingColumns { row: usize, columns: Vec<String> },

    #[error("Cannot categorize an empty batch")]
    EmptyBatch,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Model not ready: {0}")]
    ModelNotReady(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    /// Whether the caller can fix this by changing their input
    ///
    /// Everything else (model load, inference, transport) is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Csv(_)
                | Error::Spreadsheet(_)
                | Error::InvalidTable(_)
                | Error::MissingCategoryColumn { .. }
                | Error::MissingColumns { .. }
                | Error::EmptyBatch
                | Error::UnsupportedFormat(_)
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(" nor ")
}

pub type Result<T> = std::result::Result<T, Error>;
