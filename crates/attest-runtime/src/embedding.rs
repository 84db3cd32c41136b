//! Embedding collaborator.
//!
//! The extractor embeds every claim in one call. Implementations must return
//! exactly one vector per input, in input order, all of [`Embedder::dimension`].

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Errors from embedding backends.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Expected {expected} vectors, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Expected dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts in one request.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Dimensionality of every returned vector.
    fn dimension(&self) -> usize;
}

/// Check a backend's output against the request it answered.
pub fn check_batch(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    Ok(())
}

/// Offline embedder built from hashed word features.
///
/// Each lowercased word is hashed into one signed bucket and the result is
/// L2-normalized, so texts sharing vocabulary score high under cosine
/// similarity. Output is deterministic for a given build.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed a single text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();

            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity; zero when either vector is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_vector_per_text_in_order() {
        let embedder = HashEmbedder::new(64);
        let texts = vec![
            "Water boils at 100C".to_string(),
            "".to_string(),
            "Ice melts at 0C".to_string(),
        ];
        let vectors = embedder.embed(&texts).await.unwrap();

        assert!(check_batch(&vectors, 3, 64).is_ok());
        assert_eq!(vectors[0], embedder.embed_one("Water boils at 100C"));
        assert!(vectors[1].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::default();
        let claim = embedder.embed_one("The boletus forms mycorrhiza with pine trees");
        let related = embedder.embed_one("Boletus forms mycorrhiza with pine and spruce trees");
        let unrelated = embedder.embed_one("Quarterly revenue grew in the retail segment");

        assert!(cosine_similarity(&claim, &related) > cosine_similarity(&claim, &unrelated));
        assert!((cosine_similarity(&claim, &claim) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_check_batch_rejects_bad_shapes() {
        let vectors = vec![vec![0.0; 4], vec![0.0; 3]];
        assert!(matches!(
            check_batch(&vectors, 3, 4),
            Err(EmbeddingError::CountMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            check_batch(&vectors, 2, 4),
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
