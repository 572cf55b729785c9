//! Readiness endpoint

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use tally_core::Embedder;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the embedding backend is unreachable
    pub status: &'static str,
    pub embedding_model: String,
    pub categories: usize,
}

/// GET /api/health - Model readiness
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let models = state.pipeline.state();
    let status = if models.embedder().health_check().await {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        embedding_model: models.embedder().model().to_string(),
        categories: models.classifier().num_categories(),
    })
}
