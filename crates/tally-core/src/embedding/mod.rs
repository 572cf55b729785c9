//! Pluggable text embedding backends
//!
//! Turns transaction context strings into fixed-width, L2-normalized vectors.
//!
//! # Architecture
//!
//! - `Embedder` trait: the interface every backend implements
//! - `EmbeddingClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaEmbedder`, `OpenAICompatibleEmbedder`, `HashingEmbedder`
//!
//! # Ordering
//!
//! Vector `i` always belongs to input `i`. Backends must never reorder, drop
//! or pad inputs; `EmbeddingClient::embed_rows` checks the count and width of
//! every response and tags each vector with the `RowId` of its input so later
//! stages join on identity, not position.
//!
//! # Configuration
//!
//! See `config::EmbeddingConfig`. Environment variables:
//! - `TALLY_EMBEDDING_BACKEND`: ollama, openai_compatible, hashing. Default: ollama
//! - `OLLAMA_HOST` / `OPENAI_COMPATIBLE_HOST`: server URL
//! - `TALLY_EMBEDDING_MODEL`: model name
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod hashing;
mod ollama;
mod openai_compatible;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai_compatible::OpenAICompatibleEmbedder;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{EmbeddingBackendKind, EmbeddingConfig};
use crate::error::{Error, Result};
use crate::models::{RowId, Transaction};

/// Text used in health-check probes
const PROBE_TEXT: &str = "COUNTDOWN EFTPOS";

/// Trait defining the interface for all embedding backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed texts, returning exactly one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// An embedding tagged with the row it was computed for
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub row: RowId,
    pub vector: Vec<f32>,
}

/// Text to embed for one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    pub row: RowId,
    pub text: String,
}

/// Build the text a transaction is embedded from
///
/// Trimmed Payee, Memo and Tran Type joined by single spaces. A missing Memo
/// or Tran Type contributes an empty string.
pub fn transaction_context(tx: &Transaction) -> String {
    format!(
        "{} {} {}",
        tx.payee().unwrap_or_default().trim(),
        tx.memo().unwrap_or_default().trim(),
        tx.tran_type().unwrap_or_default().trim()
    )
}

/// Average token vectors into one vector
///
/// Returns a zero vector of width `dims` when there are no tokens.
pub fn mean_pool(tokens: &[Vec<f32>], dims: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dims];
    if tokens.is_empty() {
        return pooled;
    }
    for token in tokens {
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += value;
        }
    }
    let n = tokens.len() as f32;
    for value in pooled.iter_mut() {
        *value /= n;
    }
    pooled
}

/// Scale a vector to unit length; zero vectors are left unchanged
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Concrete embedding client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum EmbeddingClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaEmbedder),
    /// OpenAI-compatible backend (vLLM, LocalAI, llama-server, TEI, etc.)
    OpenAICompatible(OpenAICompatibleEmbedder),
    /// Local feature-hashing backend
    Hashing(HashingEmbedder),
}

impl EmbeddingClient {
    /// Create a client from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let client = match config.backend {
            EmbeddingBackendKind::Ollama => Self::Ollama(OllamaEmbedder::new(config)?),
            EmbeddingBackendKind::OpenAICompatible => {
                Self::OpenAICompatible(OpenAICompatibleEmbedder::new(config)?)
            }
            EmbeddingBackendKind::Hashing => Self::Hashing(HashingEmbedder::new(
                config.dimensions.unwrap_or(hashing::DEFAULT_DIMENSIONS),
            )),
        };
        Ok(client)
    }

    /// Create a local hashing client
    pub fn hashing(dimensions: usize) -> Self {
        Self::Hashing(HashingEmbedder::new(dimensions))
    }

    /// Embed one batch of rows, preserving input order
    ///
    /// Inputs are sent in chunks of `batch_size`, one chunk at a time, and
    /// every chunk must come back with one vector per text and a consistent
    /// width. Vectors are L2-normalized and tagged with their input's row.
    pub async fn embed_rows(
        &self,
        inputs: &[EmbeddingInput],
        batch_size: usize,
    ) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(inputs.len());
        let mut width: Option<usize> = None;

        for chunk in inputs.chunks(batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|i| i.text.clone()).collect();
            let vectors = self.embed(&texts).await?;

            if vectors.len() != chunk.len() {
                return Err(Error::ShapeMismatch(format!(
                    "embedding backend returned {} vectors for {} inputs",
                    vectors.len(),
                    chunk.len()
                )));
            }

            for (input, mut vector) in chunk.iter().zip(vectors) {
                let expected = *width.get_or_insert(vector.len());
                if vector.len() != expected || expected == 0 {
                    return Err(Error::ShapeMismatch(format!(
                        "{} embedding has width {}, expected {}",
                        input.row,
                        vector.len(),
                        expected
                    )));
                }
                l2_normalize(&mut vector);
                embeddings.push(Embedding {
                    row: input.row,
                    vector,
                });
            }
        }

        debug!(
            rows = embeddings.len(),
            dims = width.unwrap_or(0),
            model = self.model(),
            "Embedded batch"
        );
        Ok(embeddings)
    }

    /// Embed a probe string and report the vector width
    pub async fn probe_dimensions(&self) -> Result<usize> {
        let vectors = self.embed(&[PROBE_TEXT.to_string()]).await?;
        vectors
            .first()
            .map(Vec::len)
            .filter(|d| *d > 0)
            .ok_or_else(|| Error::Model("embedding probe returned no vector".into()))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbeddingClient::Ollama(b) => b.embed(texts).await,
            EmbeddingClient::OpenAICompatible(b) => b.embed(texts).await,
            EmbeddingClient::Hashing(b) => b.embed(texts).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            EmbeddingClient::Ollama(b) => b.health_check().await,
            EmbeddingClient::OpenAICompatible(b) => b.health_check().await,
            EmbeddingClient::Hashing(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            EmbeddingClient::Ollama(b) => b.model(),
            EmbeddingClient::OpenAICompatible(b) => b.model(),
            EmbeddingClient::Hashing(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            EmbeddingClient::Ollama(b) => b.host(),
            EmbeddingClient::OpenAICompatible(b) => b.host(),
            EmbeddingClient::Hashing(b) => b.host(),
        }
    }
}
