//! Categorization pipeline
//!
//! Validates a batch, builds context strings, embeds them, classifies the
//! embeddings and joins the results back onto the source rows. Every row
//! carries its `RowId` through both stages and the join checks it, so a
//! backend that reorders or drops rows fails the batch instead of attaching
//! labels to the wrong transactions.
//!
//! Model state is loaded explicitly with `ModelState::load` and checked with
//! `ensure_ready` before the pipeline serves anything.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{CategoryClassifier, Classification};
use crate::config::{Config, EmbeddingBackendKind};
use crate::embedding::{transaction_context, Embedder, EmbeddingClient, EmbeddingInput};
use crate::error::{Error, Result};
use crate::models::{CategorizedTransaction, RowId, Transaction, REQUIRED_COLUMNS};
use crate::reconcile::{ReconcileStats, Reconciler};

/// Loaded models, shared read-only across requests
pub struct ModelState {
    embedder: EmbeddingClient,
    classifier: CategoryClassifier,
    batch_size: usize,
}

/// Result of a successful readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub embedding_model: String,
    pub embedding_host: String,
    pub dimensions: usize,
    pub categories: usize,
}

impl ModelState {
    /// Load the classifier artifacts and build the embedding client
    pub fn load(config: &Config) -> Result<Self> {
        let classifier = CategoryClassifier::load(
            &config.classifier.model_path,
            &config.classifier.categories_path,
        )?;

        let mut embedding = config.embedding.clone();
        match embedding.dimensions {
            Some(dims) if dims != classifier.input_dim() => {
                return Err(Error::ShapeMismatch(format!(
                    "embedding model {} produces {} dimensions but the classifier expects {}",
                    embedding.model,
                    dims,
                    classifier.input_dim()
                )));
            }
            Some(_) => {}
            None => embedding.dimensions = Some(classifier.input_dim()),
        }

        let embedder = EmbeddingClient::from_config(&embedding)?;
        if embedding.backend == EmbeddingBackendKind::Hashing {
            warn!("Using local hashing embedder; predictions only make sense with a matching classifier");
        }

        Ok(Self::new(embedder, classifier, embedding.batch_size))
    }

    pub fn new(embedder: EmbeddingClient, classifier: CategoryClassifier, batch_size: usize) -> Self {
        Self {
            embedder,
            classifier,
            batch_size: batch_size.max(1),
        }
    }

    /// Check the embedder is reachable and agrees with the classifier on width
    pub async fn ensure_ready(&self) -> Result<Readiness> {
        if !self.embedder.health_check().await {
            return Err(Error::ModelNotReady(format!(
                "embedding backend at {} is not reachable",
                self.embedder.host()
            )));
        }

        let dimensions = self.embedder.probe_dimensions().await?;
        if dimensions != self.classifier.input_dim() {
            return Err(Error::ShapeMismatch(format!(
                "embedding model {} produces {} dimensions but the classifier expects {}",
                self.embedder.model(),
                dimensions,
                self.classifier.input_dim()
            )));
        }

        let readiness = Readiness {
            embedding_model: self.embedder.model().to_string(),
            embedding_host: self.embedder.host().to_string(),
            dimensions,
            categories: self.classifier.num_categories(),
        };
        info!(
            "Models ready: {} ({} dims) with {} categories",
            readiness.embedding_model, readiness.dimensions, readiness.categories
        );
        Ok(readiness)
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    pub fn classifier(&self) -> &CategoryClassifier {
        &self.classifier
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Categorizes batches of transactions
///
/// Cheap to clone; clones share the same model state.
#[derive(Clone)]
pub struct CategorizationPipeline {
    state: Arc<ModelState>,
}

impl CategorizationPipeline {
    pub fn new(state: ModelState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    /// Check a batch can be categorized without touching any model
    ///
    /// Every row must carry the Payee, Memo and Tran Type columns. Values may
    /// be blank. The first malformed row is reported with the names it lacks.
    pub fn validate(batch: &[Transaction]) -> Result<()> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        for (row, tx) in batch.iter().enumerate() {
            let columns = tx.missing_columns(&REQUIRED_COLUMNS);
            if !columns.is_empty() {
                return Err(Error::MissingColumns { row, columns });
            }
        }
        Ok(())
    }

    /// Predict a category for every row, preserving input order
    ///
    /// Fails as a whole: either every row is categorized or none is.
    pub async fn categorize(&self, batch: Vec<Transaction>) -> Result<Vec<CategorizedTransaction>> {
        Self::validate(&batch)?;

        let rows: Vec<(RowId, &Transaction)> = batch
            .iter()
            .enumerate()
            .map(|(i, tx)| (RowId(i), tx))
            .collect();
        let classifications = self.predict(&rows).await?;

        Ok(batch
            .into_iter()
            .zip(classifications)
            .map(|(tx, c)| CategorizedTransaction::predicted(tx, c.label, c.probability))
            .collect())
    }

    /// Copy ledger categories where rows match, predict the rest
    ///
    /// A ledger match with a blank category is treated as unmatched.
    pub async fn categorize_with_ledger(
        &self,
        batch: Vec<Transaction>,
        reconciler: &Reconciler,
    ) -> Result<(Vec<CategorizedTransaction>, ReconcileStats)> {
        Self::validate(&batch)?;

        let known: Vec<Option<String>> = batch
            .iter()
            .map(|tx| {
                reconciler
                    .lookup(tx)
                    .filter(|category| !category.is_empty())
                    .map(str::to_string)
            })
            .collect();

        let pending: Vec<(RowId, &Transaction)> = batch
            .iter()
            .zip(&known)
            .enumerate()
            .filter(|(_, (_, known))| known.is_none())
            .map(|(i, (tx, _))| (RowId(i), tx))
            .collect();

        let stats = ReconcileStats {
            matched: batch.len() - pending.len(),
            unmatched: pending.len(),
        };
        info!(
            "Reconciled {} of {} rows from {} column, predicting {}",
            stats.matched,
            batch.len(),
            reconciler.column(),
            stats.unmatched
        );

        let predictions = if pending.is_empty() {
            Vec::new()
        } else {
            self.predict(&pending).await?
        };
        let mut predictions = predictions.into_iter();

        let mut categorized = Vec::with_capacity(batch.len());
        for (tx, known) in batch.into_iter().zip(known) {
            let row = match known {
                Some(category) => CategorizedTransaction::reconciled(tx, category),
                None => {
                    let c = predictions.next().ok_or_else(|| {
                        Error::Model("classifier returned fewer rows than requested".into())
                    })?;
                    CategorizedTransaction::predicted(tx, c.label, c.probability)
                }
            };
            categorized.push(row);
        }

        Ok((categorized, stats))
    }

    /// Embed and classify rows, checking results line up with the request
    async fn predict(&self, rows: &[(RowId, &Transaction)]) -> Result<Vec<Classification>> {
        let started = Instant::now();
        let inputs: Vec<EmbeddingInput> = rows
            .iter()
            .map(|(row, tx)| EmbeddingInput {
                row: *row,
                text: transaction_context(tx),
            })
            .collect();

        let embeddings = self
            .state
            .embedder
            .embed_rows(&inputs, self.state.batch_size)
            .await?;
        let embedded_at = started.elapsed();

        let classifications = self.state.classifier.classify(&embeddings)?;

        if classifications.len() != rows.len() {
            return Err(Error::Model(format!(
                "got {} classifications for {} rows",
                classifications.len(),
                rows.len()
            )));
        }
        for ((expected, _), classification) in rows.iter().zip(&classifications) {
            if classification.row != *expected {
                return Err(Error::Model(format!(
                    "classification for {} returned in place of {}",
                    classification.row, expected
                )));
            }
        }

        debug!(
            rows = rows.len(),
            embed_ms = embedded_at.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "Categorized batch"
        );
        Ok(classifications)
    }
}
