//! Category classifier over transaction embeddings
//!
//! The model artifact is a multinomial logistic regression exported as JSON:
//!
//! ```json
//! { "input_dim": 384, "weights": [[...384 floats...], ...], "bias": [...] }
//! ```
//!
//! with one weight row and one bias per category. The category names live in
//! a separate JSON array, index-aligned with the weight rows. Both files are
//! loaded once and shared read-only for the life of the process.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::models::RowId;

/// Label reported when the predicted category has no name
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Serialized classifier weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub input_dim: usize,
    /// One row of `input_dim` weights per category
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

/// A batch of embeddings laid out as an (N, D) row-major tensor
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    rows: Vec<RowId>,
    data: Vec<f32>,
    dims: usize,
}

impl InputTensor {
    /// Stack embeddings into one tensor, checking every width against `dims`
    pub fn from_embeddings(embeddings: &[Embedding], dims: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(embeddings.len() * dims);
        let mut rows = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            if embedding.vector.len() != dims {
                return Err(Error::ShapeMismatch(format!(
                    "{} embedding has width {} but the classifier expects {}",
                    embedding.row,
                    embedding.vector.len(),
                    dims
                )));
            }
            rows.push(embedding.row);
            data.extend_from_slice(&embedding.vector);
        }
        Ok(Self { rows, data, dims })
    }

    /// (N, D)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.dims)
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }
}

/// Classifier output for one row
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub row: RowId,
    pub label: String,
    /// Distribution over every known category, in category-list order
    pub probabilities: Vec<f32>,
    /// Highest entry of `probabilities`
    pub probability: f32,
}

/// Loaded classifier plus its category names
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    input_dim: usize,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    categories: Vec<String>,
    fingerprint: String,
}

impl CategoryClassifier {
    /// Load the model artifact and category list from disk
    pub fn load(model_path: &Path, categories_path: &Path) -> Result<Self> {
        let model_bytes = read_artifact(model_path, "classifier model")?;
        let category_bytes = read_artifact(categories_path, "category list")?;

        let artifact: ClassifierArtifact = serde_json::from_slice(&model_bytes).map_err(|e| {
            Error::Model(format!(
                "Invalid classifier model {}: {}",
                model_path.display(),
                e
            ))
        })?;
        let categories: Vec<String> = serde_json::from_slice(&category_bytes).map_err(|e| {
            Error::Model(format!(
                "Invalid category list {}: {}",
                categories_path.display(),
                e
            ))
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&model_bytes);
        hasher.update(&category_bytes);
        let fingerprint = hex::encode(hasher.finalize());

        let classifier = Self::from_parts(artifact, categories)?.with_fingerprint(fingerprint);
        info!(
            "Loaded classifier {} ({} categories, input width {}, sha256 {})",
            model_path.display(),
            classifier.num_categories(),
            classifier.input_dim(),
            &classifier.fingerprint[..12]
        );
        Ok(classifier)
    }

    /// Build from an in-memory artifact, validating shapes
    pub fn from_parts(artifact: ClassifierArtifact, categories: Vec<String>) -> Result<Self> {
        let ClassifierArtifact {
            input_dim,
            weights,
            bias,
        } = artifact;

        if input_dim == 0 {
            return Err(Error::Model("classifier input_dim must be positive".into()));
        }
        if categories.is_empty() {
            return Err(Error::Model("category list is empty".into()));
        }
        if weights.len() != categories.len() {
            return Err(Error::ShapeMismatch(format!(
                "classifier has {} weight rows but {} categories",
                weights.len(),
                categories.len()
            )));
        }
        if bias.len() != categories.len() {
            return Err(Error::ShapeMismatch(format!(
                "classifier has {} biases but {} categories",
                bias.len(),
                categories.len()
            )));
        }
        if let Some((i, row)) = weights
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != input_dim)
        {
            return Err(Error::ShapeMismatch(format!(
                "weight row {} has width {}, expected {}",
                i,
                row.len(),
                input_dim
            )));
        }
        if weights.iter().flatten().chain(&bias).any(|w| !w.is_finite()) {
            return Err(Error::Model("classifier contains non-finite weights".into()));
        }

        Ok(Self {
            input_dim,
            weights,
            bias,
            categories,
            fingerprint: String::new(),
        })
    }

    fn with_fingerprint(mut self, fingerprint: String) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Expected embedding width (D)
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Number of known categories (C)
    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// SHA-256 of the artifacts this classifier was loaded from (empty if built in memory)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Classify a batch of embeddings, one result per row in input order
    pub fn classify(&self, embeddings: &[Embedding]) -> Result<Vec<Classification>> {
        let tensor = InputTensor::from_embeddings(embeddings, self.input_dim)?;
        Ok(self.run(&tensor))
    }

    /// Run the model over an (N, D) tensor
    pub fn run(&self, tensor: &InputTensor) -> Vec<Classification> {
        let (n, _) = tensor.shape();
        let results: Vec<Classification> = (0..n)
            .map(|i| self.classify_row(tensor.rows[i], tensor.row(i)))
            .collect();
        debug!(
            rows = n,
            categories = self.num_categories(),
            "Classified batch"
        );
        results
    }

    fn classify_row(&self, row: RowId, input: &[f32]) -> Classification {
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| w.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();
        let probabilities = softmax(&logits);

        // Full distribution; the last category is a candidate like any other
        let best = argmax(&probabilities);
        let probability = probabilities[best];
        let label = match self.categories[best].trim() {
            "" => UNCATEGORIZED.to_string(),
            name => name.to_string(),
        };

        Classification {
            row,
            label,
            probabilities,
            probability,
        }
    }
}

fn read_artifact(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| Error::Model(format!("Failed to read {} {}: {}", what, path.display(), e)))
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first wins on ties
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_classifier() -> CategoryClassifier {
        CategoryClassifier::from_parts(
            ClassifierArtifact {
                input_dim: 3,
                weights: vec![
                    vec![4.0, 0.0, 0.0],
                    vec![0.0, 4.0, 0.0],
                    vec![0.0, 0.0, 4.0],
                ],
                bias: vec![0.0, 0.0, 0.0],
            },
            vec!["Groceries".into(), "Fuel".into(), "Transfers".into()],
        )
        .unwrap()
    }

    fn embedding(row: usize, vector: Vec<f32>) -> Embedding {
        Embedding {
            row: RowId(row),
            vector,
        }
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);

        // Large logits must not overflow
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_first_wins() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[1.0]), 0);
    }

    #[test]
    fn test_classify_preserves_order() {
        let classifier = identity_classifier();
        let results = classifier
            .classify(&[
                embedding(0, vec![0.0, 1.0, 0.0]),
                embedding(1, vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].row, RowId(0));
        assert_eq!(results[0].label, "Fuel");
        assert_eq!(results[1].label, "Groceries");
    }

    #[test]
    fn test_last_category_included_in_probability() {
        let classifier = identity_classifier();
        let result = &classifier
            .classify(&[embedding(0, vec![0.0, 0.0, 1.0])])
            .unwrap()[0];

        assert_eq!(result.label, "Transfers");
        assert_eq!(result.probabilities.len(), 3);
        let max = result.probabilities.iter().copied().fold(0.0, f32::max);
        assert_eq!(result.probability, max);
        assert_eq!(result.probability, result.probabilities[2]);
    }

    #[test]
    fn test_probability_bounds() {
        let classifier = identity_classifier();
        let results = classifier
            .classify(&[
                embedding(0, vec![0.3, -0.2, 0.9]),
                embedding(1, vec![0.0, 0.0, 0.0]),
            ])
            .unwrap();
        for r in &results {
            assert!((0.0..=1.0).contains(&r.probability));
            assert!(r.probabilities.contains(&r.probability));
        }
        // Uniform distribution on a zero vector
        assert!((results[1].probability - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_input_width_mismatch() {
        let classifier = identity_classifier();
        let err = classifier
            .classify(&[embedding(4, vec![1.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
        assert!(err.to_string().contains("row 4"));
    }

    #[test]
    fn test_category_count_mismatch() {
        let err = CategoryClassifier::from_parts(
            ClassifierArtifact {
                input_dim: 2,
                weights: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                bias: vec![0.0, 0.0],
            },
            vec!["Only".into()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_weight_row_width_mismatch() {
        let err = CategoryClassifier::from_parts(
            ClassifierArtifact {
                input_dim: 2,
                weights: vec![vec![1.0, 0.0], vec![0.0]],
                bias: vec![0.0, 0.0],
            },
            vec!["A".into(), "B".into()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("weight row 1"));
    }

    #[test]
    fn test_empty_label_reports_uncategorized() {
        let classifier = CategoryClassifier::from_parts(
            ClassifierArtifact {
                input_dim: 1,
                weights: vec![vec![1.0], vec![-1.0]],
                bias: vec![0.0, 0.0],
            },
            vec!["".into(), "Other".into()],
        )
        .unwrap();
        let result = &classifier.classify(&[embedding(0, vec![1.0])]).unwrap()[0];
        assert_eq!(result.label, UNCATEGORIZED);
    }

    #[test]
    fn test_input_tensor_shape() {
        let tensor = InputTensor::from_embeddings(
            &[embedding(0, vec![1.0, 2.0]), embedding(1, vec![3.0, 4.0])],
            2,
        )
        .unwrap();
        assert_eq!(tensor.shape(), (2, 2));
        assert_eq!(tensor.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        let categories_path = dir.path().join("categories.json");
        fs::write(
            &model_path,
            r#"{"input_dim": 2, "weights": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0, 0.0]}"#,
        )
        .unwrap();
        fs::write(&categories_path, r#"["Groceries", "Fuel"]"#).unwrap();

        let classifier = CategoryClassifier::load(&model_path, &categories_path).unwrap();
        assert_eq!(classifier.input_dim(), 2);
        assert_eq!(classifier.categories(), &["Groceries", "Fuel"]);
        assert_eq!(classifier.fingerprint().len(), 64);
    }

    #[test]
    fn test_load_missing_file_is_model_error() {
        let err = CategoryClassifier::load(Path::new("/nope/model.json"), Path::new("/nope/c.json"))
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert!(!err.is_client_error());
    }
}
