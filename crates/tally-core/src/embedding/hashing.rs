//! Local feature-hashing embedder
//!
//! Deterministic, dependency-free stand-in for a sentence-embedding model.
//! Each lowercase alphanumeric token is hashed into a sparse signed vector,
//! token vectors are mean-pooled and the result is L2-normalized. Useful
//! offline, in tests, and with classifiers trained on the same features.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::{l2_normalize, mean_pool, Embedder};

/// Default width, matching all-MiniLM-L6-v2
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Buckets each token writes into
const HASHES_PER_TOKEN: usize = 4;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("valid regex"))
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a single text synchronously
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<Vec<f32>> = token_pattern()
            .find_iter(&lowered)
            .map(|m| self.token_vector(m.as_str()))
            .collect();

        let mut pooled = mean_pool(&tokens, self.dimensions);
        l2_normalize(&mut pooled);
        pooled
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        let digest = Sha256::digest(token.as_bytes());
        let mut vector = vec![0.0f32; self.dimensions];
        for chunk in digest.chunks_exact(4).take(HASHES_PER_TOKEN) {
            let bits = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let bucket = (bits >> 1) as usize % self.dimensions;
            let sign = if bits & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        "hashing"
    }

    fn host(&self) -> &str {
        "local://hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(
            embedder.embed_one("COUNTDOWN 4835 EFTPOS"),
            embedder.embed_one("COUNTDOWN 4835 EFTPOS")
        );
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(
            embedder.embed_one("Countdown, EFTPOS"),
            embedder.embed_one("COUNTDOWN  eftpos")
        );
    }

    #[test]
    fn test_unit_length() {
        let embedder = HashingEmbedder::new(128);
        let v = embedder.embed_one("Z ENERGY FUEL");
        assert_eq!(v.len(), 128);
        assert!((norm(&v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed_one("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_tokens_are_similar() {
        let embedder = HashingEmbedder::new(384);
        let a = embedder.embed_one("COUNTDOWN PONSONBY EFTPOS");
        let b = embedder.embed_one("COUNTDOWN NEWMARKET EFTPOS");
        let c = embedder.embed_one("SPOTIFY SUBSCRIPTION");
        let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(p, q)| p * q).sum::<f32>();
        assert!(dot(&a, &b) > dot(&a, &c));
    }

    #[tokio::test]
    async fn test_embed_batch_order() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["A".to_string(), "B".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors[0], embedder.embed_one("A"));
        assert_eq!(vectors[1], embedder.embed_one("B"));
    }
}
