//! Test utilities for tally-core
//!
//! This module provides testing infrastructure including a mock embedding
//! server speaking both the Ollama and OpenAI-compatible APIs, and fixture
//! classifier artifacts that pair with the hashing embedder, plus a small
//! XLSX builder for spreadsheet statements.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::oneshot;

use crate::classifier::ClassifierArtifact;
use crate::embedding::HashingEmbedder;

/// Categories and the prototype text each fixture weight row is built from
pub const FIXTURE_CATEGORIES: &[(&str, &str)] = &[
    ("Groceries", "countdown new world pak n save supermarket"),
    ("Fuel", "z energy bp mobil fuel petrol"),
    ("Transfers", "transfer savings account internet banking"),
];

/// Scale applied to fixture weights so predictions are confident
const FIXTURE_WEIGHT_SCALE: f32 = 8.0;

/// Mock embedding server for testing and development
///
/// Vectors come from a `HashingEmbedder` of the configured width, so tests can
/// compare responses against `expected_vector`.
pub struct MockEmbeddingServer {
    addr: SocketAddr,
    embedder: HashingEmbedder,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockEmbeddingServer {
    /// Start the mock server on an available port
    pub async fn start(dimensions: usize) -> Self {
        let embedder = HashingEmbedder::new(dimensions);
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/embed", post(handle_ollama_embed))
            .route("/v1/models", get(handle_models))
            .route("/v1/embeddings", post(handle_openai_embeddings))
            .with_state(embedder.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            embedder,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The raw vector the server returns for `text`
    pub fn expected_vector(&self, text: &str) -> Vec<f32> {
        self.embedder.embed_one(text)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockEmbeddingServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct EmbedRequest {
    #[allow(dead_code)]
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<serde_json::Value> {
    Json(json!({
        "models": [{
            "name": "all-minilm:l6-v2",
            "modified_at": "2024-01-01T00:00:00Z",
            "size": 45_000_000
        }]
    }))
}

/// Ollama batch embed endpoint, answers in input order
async fn handle_ollama_embed(
    State(embedder): State<HashingEmbedder>,
    Json(request): Json<EmbedRequest>,
) -> Json<OllamaEmbedResponse> {
    Json(OllamaEmbedResponse {
        embeddings: request.input.iter().map(|t| embedder.embed_one(t)).collect(),
    })
}

/// OpenAI-compatible model list (health check)
async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{ "id": "bge-small", "object": "model" }]
    }))
}

/// OpenAI-compatible embeddings endpoint, answers in reverse order
async fn handle_openai_embeddings(
    State(embedder): State<HashingEmbedder>,
    Json(request): Json<EmbedRequest>,
) -> Json<serde_json::Value> {
    let data: Vec<serde_json::Value> = request
        .input
        .iter()
        .enumerate()
        .rev()
        .map(|(index, text)| {
            json!({
                "object": "embedding",
                "index": index,
                "embedding": embedder.embed_one(text),
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// Classifier artifact whose weight rows are scaled hashing embeddings of the
/// fixture prototype texts
pub fn fixture_artifact(dimensions: usize) -> (ClassifierArtifact, Vec<String>) {
    let embedder = HashingEmbedder::new(dimensions);
    let weights = FIXTURE_CATEGORIES
        .iter()
        .map(|(_, text)| {
            embedder
                .embed_one(text)
                .into_iter()
                .map(|w| w * FIXTURE_WEIGHT_SCALE)
                .collect()
        })
        .collect();
    let categories = FIXTURE_CATEGORIES
        .iter()
        .map(|(name, _)| name.to_string())
        .collect();

    (
        ClassifierArtifact {
            input_dim: dimensions,
            weights,
            bias: vec![0.0; FIXTURE_CATEGORIES.len()],
        },
        categories,
    )
}

/// Fixture artifacts written to disk
pub struct FixtureArtifacts {
    // Held so the directory outlives the paths
    _dir: TempDir,
    pub model_path: PathBuf,
    pub categories_path: PathBuf,
}

impl FixtureArtifacts {
    /// Write a fixture model and category list into a fresh temp directory
    pub fn write(dimensions: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (model_path, categories_path) = write_fixture_artifacts(dir.path(), dimensions);
        Self {
            _dir: dir,
            model_path,
            categories_path,
        }
    }
}

/// Write a fixture model and category list into `dir`
pub fn write_fixture_artifacts(dir: &Path, dimensions: usize) -> (PathBuf, PathBuf) {
    let (artifact, categories) = fixture_artifact(dimensions);
    let model_path = dir.join("transaction_classifier.json");
    let categories_path = dir.join("transaction_categories.json");
    std::fs::write(&model_path, serde_json::to_vec(&artifact).unwrap()).unwrap();
    std::fs::write(&categories_path, serde_json::to_vec(&categories).unwrap()).unwrap();
    (model_path, categories_path)
}


/// A cell in a generated spreadsheet statement
#[derive(Debug, Clone, Copy)]
pub enum SheetCell<'a> {
    Empty,
    Text(&'a str),
    Number(f64),
    /// Excel day serial with a `dd/mm/yyyy` display format
    Date(f64),
}

/// Build XLSX bytes with `rows` written from sheet row `first_row` down
pub fn xlsx_bytes(first_row: u32, rows: &[Vec<SheetCell<'_>>]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("dd/mm/yyyy");
    let sheet = workbook.add_worksheet();

    for (offset, cells) in rows.iter().enumerate() {
        let row = first_row + offset as u32;
        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match *cell {
                SheetCell::Empty => {}
                SheetCell::Text(text) => {
                    sheet.write_string(row, col, text).unwrap();
                }
                SheetCell::Number(value) => {
                    sheet.write_number(row, col, value).unwrap();
                }
                SheetCell::Date(serial) => {
                    sheet
                        .write_number_with_format(row, col, serial, &date_format)
                        .unwrap();
                }
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}
