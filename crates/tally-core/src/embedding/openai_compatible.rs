//! OpenAI-compatible embedding backend
//!
//! Works with any server exposing `POST /v1/embeddings` (vLLM, LocalAI,
//! llama-server, text-embeddings-inference, ...). The response carries an
//! `index` per item and servers are free to return items out of order, so
//! results are placed by index and every index must appear exactly once.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

use super::Embedder;

#[derive(Clone)]
pub struct OpenAICompatibleEmbedder {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http_client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http_client,
            base_url: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Place response items by their `index`
fn order_by_index(items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if items.len() != expected {
        return Err(Error::ShapeMismatch(format!(
            "embedding server returned {} items for {} inputs",
            items.len(),
            expected
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            Error::ShapeMismatch(format!(
                "embedding index {} out of range for {} inputs",
                item.index, expected
            ))
        })?;
        if slot.replace(item.embedding).is_some() {
            return Err(Error::ShapeMismatch(format!(
                "embedding index {} returned twice",
                item.index
            )));
        }
    }

    // Counts match and no index repeats, so every slot is filled
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| Error::ShapeMismatch(format!("embedding index {} missing", i)))
        })
        .collect()
}

#[async_trait]
impl Embedder for OpenAICompatibleEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let response = self
            .authorize(
                self.http_client
                    .post(format!("{}/v1/embeddings", self.base_url)),
            )
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: EmbeddingsResponse = response.json().await?;
        debug!(
            "Embedding server returned {} items for {} inputs",
            body.data.len(),
            texts.len()
        );
        order_by_index(body.data, texts.len())
    }

    async fn health_check(&self) -> bool {
        match self
            .authorize(self.http_client.get(format!("{}/v1/models", self.base_url)))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
