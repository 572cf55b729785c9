//! Categorizer configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded in layers:
//! 1. An explicit path (`--config`), or the override in the data dir
//!    (~/.local/share/tally/config/tally.toml) when it exists
//! 2. Otherwise the embedded defaults (compiled into binary)
//! 3. Environment variables override individual keys

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::table::{
    validate_date_format, HeaderLocator, ReadOptions, DEFAULT_DATE_FORMAT, DEFAULT_HEADER_ROW,
};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/tally.toml");

/// Which embedding service produces transaction vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// Ollama `/api/embed`
    Ollama,
    /// Any server exposing OpenAI's `/v1/embeddings`
    OpenAICompatible,
    /// Local feature-hashing embedder, no server needed
    Hashing,
}

impl EmbeddingBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAICompatible => "openai_compatible",
            Self::Hashing => "hashing",
        }
    }

    /// Parse a backend name, falling back to Ollama for unknown values
    pub fn parse_lenient(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "ollama" => Self::Ollama,
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                Self::OpenAICompatible
            }
            "hashing" | "local" | "mock" => Self::Hashing,
            _ => {
                warn!(backend = %name, "Unknown embedding backend, falling back to ollama");
                Self::Ollama
            }
        }
    }
}

impl std::fmt::Display for EmbeddingBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackendKind,
    pub host: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Expected vector width, if known up front
    pub dimensions: Option<usize>,
    pub timeout: Duration,
    /// Max texts per request; chunks are sent in order, one at a time
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Ollama,
            host: "http://localhost:11434".to_string(),
            model: "all-minilm:l6-v2".to_string(),
            api_key: None,
            dimensions: Some(384),
            timeout: Duration::from_secs(30),
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub categories_path: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/transaction_classifier.json"),
            categories_path: PathBuf::from("models/transaction_categories.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatementConfig {
    pub header: HeaderLocator,
    /// chrono format for date cells in spreadsheet statements and ledgers
    pub date_format: String,
}

impl StatementConfig {
    /// Read options for bank statements
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions::new(self.header.clone()).with_date_format(self.date_format.clone())
    }

    /// Read options for ledgers, which carry their header on the first row
    pub fn ledger_options(&self) -> ReadOptions {
        ReadOptions::new(HeaderLocator::Fixed(0)).with_date_format(self.date_format.clone())
    }
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            header: HeaderLocator::Fixed(DEFAULT_HEADER_ROW),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

/// Placeholder values for export columns the statement has no data for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub time: String,
    pub currency: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            time: "9:00 AM".to_string(),
            currency: "NZD".to_string(),
        }
    }
}

/// Full categorizer configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub classifier: ClassifierConfig,
    pub statement: StatementConfig,
    pub export: ExportConfig,
    /// File the config was read from, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load config (override file or embedded default), then apply env vars
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (content, source) = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                (content, Some(path.to_path_buf()))
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default_path) => {
                    let content = fs::read_to_string(&default_path).map_err(|e| {
                        Error::Config(format!("Failed to read config: {}", e))
                    })?;
                    (content, Some(default_path))
                }
                None => (DEFAULT_CONFIG.to_string(), None),
            },
        };

        let mut config = parse_config(&content)?;
        config.source = source;
        config.apply_env();
        debug!(source = ?config.source, backend = %config.embedding.backend, "Loaded config");
        Ok(config)
    }

    /// Embedded defaults only, ignoring files and environment
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = var("TALLY_EMBEDDING_BACKEND") {
            self.embedding.backend = EmbeddingBackendKind::parse_lenient(&backend);
        }
        let host_var = match self.embedding.backend {
            EmbeddingBackendKind::Ollama => Some("OLLAMA_HOST"),
            EmbeddingBackendKind::OpenAICompatible => Some("OPENAI_COMPATIBLE_HOST"),
            EmbeddingBackendKind::Hashing => None,
        };
        if let Some(host) = host_var.and_then(&var) {
            self.embedding.host = host;
        }
        if let Some(model) = var("TALLY_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = var("OPENAI_COMPATIBLE_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Some(path) = var("TALLY_CLASSIFIER_MODEL") {
            self.classifier.model_path = PathBuf::from(path);
        }
        if let Some(path) = var("TALLY_CATEGORIES") {
            self.classifier.categories_path = PathBuf::from(path);
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("tally.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    embedding: Option<RawEmbedding>,
    classifier: Option<RawClassifier>,
    statement: Option<RawStatement>,
    export: Option<RawExport>,
}

#[derive(Debug, Deserialize)]
struct RawEmbedding {
    backend: Option<String>,
    host: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    dimensions: Option<usize>,
    timeout_secs: Option<u64>,
    batch_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawClassifier {
    model_path: Option<PathBuf>,
    categories_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawStatement {
    header_row: Option<usize>,
    header_marker: Option<String>,
    date_format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExport {
    time: Option<String>,
    currency: Option<String>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::default();

    if let Some(embedding) = raw.embedding {
        if let Some(backend) = embedding.backend {
            config.embedding.backend = EmbeddingBackendKind::parse_lenient(&backend);
        }
        if let Some(host) = embedding.host {
            config.embedding.host = host;
        }
        if let Some(model) = embedding.model {
            config.embedding.model = model;
        }
        config.embedding.api_key = embedding.api_key;
        if embedding.dimensions.is_some() {
            config.embedding.dimensions = embedding.dimensions;
        }
        if let Some(timeout) = embedding.timeout_secs {
            config.embedding.timeout = Duration::from_secs(timeout);
        }
        if let Some(batch_size) = embedding.batch_size {
            if batch_size == 0 {
                return Err(Error::Config("embedding.batch_size must be positive".into()));
            }
            config.embedding.batch_size = batch_size;
        }
    }

    if let Some(classifier) = raw.classifier {
        if let Some(path) = classifier.model_path {
            config.classifier.model_path = path;
        }
        if let Some(path) = classifier.categories_path {
            config.classifier.categories_path = path;
        }
    }

    if let Some(statement) = raw.statement {
        // A marker takes precedence over a fixed row
        config.statement.header = match (statement.header_marker, statement.header_row) {
            (Some(marker), _) if !marker.is_empty() => HeaderLocator::AfterMarker(marker),
            (_, Some(row)) => HeaderLocator::Fixed(row),
            _ => HeaderLocator::Fixed(DEFAULT_HEADER_ROW),
        };
        if let Some(date_format) = statement.date_format {
            validate_date_format(&date_format)?;
            config.statement.date_format = date_format;
        }
    }

    if let Some(export) = raw.export {
        if let Some(time) = export.time {
            config.export.time = time;
        }
        if let Some(currency) = export.currency {
            config.export.currency = currency;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.embedding.backend, EmbeddingBackendKind::Ollama);
        assert_eq!(config.embedding.dimensions, Some(384));
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.statement.header, HeaderLocator::Fixed(5));
        assert_eq!(config.statement.date_format, "%d/%m/%Y");
        assert_eq!(config.export, ExportConfig::default());
    }

    #[test]
    fn test_header_marker_wins() {
        let config = parse_config(
            r#"
            [statement]
            header_row = 2
            header_marker = "Ledger Balance"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.statement.header,
            HeaderLocator::AfterMarker("Ledger Balance".to_string())
        );
    }

    #[test]
    fn test_statement_date_format() {
        let config = parse_config(
            r#"
            [statement]
            header_marker = "Ledger Balance"
            date_format = "%Y-%m-%d"
            "#,
        )
        .unwrap();

        let statement = config.statement.read_options();
        assert_eq!(
            statement.header,
            HeaderLocator::AfterMarker("Ledger Balance".to_string())
        );
        assert_eq!(statement.date_format, "%Y-%m-%d");

        let ledger = config.statement.ledger_options();
        assert_eq!(ledger.header, HeaderLocator::Fixed(0));
        assert_eq!(ledger.date_format, "%Y-%m-%d");
    }

    #[test]
    fn test_invalid_date_format_rejected() {
        let err = parse_config("[statement]\ndate_format = \"%d/%Q\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = parse_config("[embedding]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(parse_config("[embedding\n").is_err());
    }

    #[test]
    fn test_backend_parse_lenient() {
        assert_eq!(
            EmbeddingBackendKind::parse_lenient("vllm"),
            EmbeddingBackendKind::OpenAICompatible
        );
        assert_eq!(
            EmbeddingBackendKind::parse_lenient("HASHING"),
            EmbeddingBackendKind::Hashing
        );
        assert_eq!(
            EmbeddingBackendKind::parse_lenient("nonsense"),
            EmbeddingBackendKind::Ollama
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TALLY_EMBEDDING_BACKEND", "openai_compatible"),
            ("OPENAI_COMPATIBLE_HOST", "http://gpu-box:8080"),
            ("OLLAMA_HOST", "http://ignored:11434"),
            ("TALLY_EMBEDDING_MODEL", "bge-small"),
            ("TALLY_CATEGORIES", "/srv/categories.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::embedded().unwrap();
        config.apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.embedding.backend,
            EmbeddingBackendKind::OpenAICompatible
        );
        assert_eq!(config.embedding.host, "http://gpu-box:8080");
        assert_eq!(config.embedding.model, "bge-small");
        assert_eq!(
            config.classifier.categories_path,
            PathBuf::from("/srv/categories.json")
        );
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        fs::write(&path, "[export]\ncurrency = \"AUD\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.export.currency, "AUD");
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/tally.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
