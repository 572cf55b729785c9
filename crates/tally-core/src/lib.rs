//! Tally Core Library
//!
//! Shared functionality for the Tally bank statement categorizer:
//! - Statement and ledger readers (CSV, XLSX/XLS/ODS)
//! - Ledger reconciliation by date and amount
//! - Pluggable embedding backends (Ollama, OpenAI-compatible, local hashing)
//! - Category classifier over transaction embeddings
//! - Categorization pipeline with explicit model loading and readiness checks
//! - MoneyWiz CSV and JSON export

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod table;

/// Test utilities including mock embedding server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use classifier::{CategoryClassifier, Classification, ClassifierArtifact};
pub use config::{Config, EmbeddingBackendKind, EmbeddingConfig, ExportConfig};
pub use embedding::{
    transaction_context, Embedder, Embedding, EmbeddingClient, EmbeddingInput, HashingEmbedder,
    OllamaEmbedder, OpenAICompatibleEmbedder,
};
pub use error::{Error, Result};
pub use export::{ExportFormat, MoneyWizExporter};
pub use models::{
    Bank, Categorization, CategorizedTransaction, CategoryColumn, RowId, Transaction,
};
pub use pipeline::{CategorizationPipeline, ModelState, Readiness};
pub use reconcile::{ReconcileStats, Reconciler};
pub use table::{HeaderLocator, ReadOptions, Table, TableFormat};
