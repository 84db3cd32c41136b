//! Evidence similarity search.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use attest_core::Citation;

use crate::embedding::{cosine_similarity, Embedder, EmbeddingError};

/// Errors from the evidence store.
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("Evidence search failed: {0}")]
    Search(String),

    #[error("Evidence lookup failed for '{id}': {message}")]
    Lookup { id: String, message: String },

    #[error("Embedding failed while indexing: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f64,
    pub source: String,
}

impl From<&SearchHit> for Citation {
    fn from(hit: &SearchHit) -> Self {
        Citation {
            id: hit.chunk_id.clone(),
            score: hit.score,
            source: hit.source.clone(),
        }
    }
}

/// A stored evidence chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub chunk_id: String,
    pub text: String,
    pub source: String,
}

impl EvidenceChunk {
    pub fn new(chunk_id: impl Into<String>, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            text: text.into(),
            source: source.into(),
        }
    }
}

/// Read-only evidence store shared by concurrent runs.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Search for every query vector in one round trip.
    ///
    /// Returns one ranked hit list per query, best first, at most `top_k` long.
    async fn search_batch(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<Vec<SearchHit>>, EvidenceError>;

    /// Fetch a chunk by id.
    async fn get_by_id(&self, chunk_id: &str) -> Result<Option<EvidenceChunk>, EvidenceError>;
}

struct IndexedChunk {
    chunk: EvidenceChunk,
    vector: Vec<f32>,
}

/// In-memory store with brute-force cosine search.
///
/// Hits are ranked by descending score; equal scores keep insertion order.
#[derive(Default)]
pub struct InMemoryEvidenceStore {
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chunk with a precomputed vector. An existing id is replaced.
    pub fn insert(&self, chunk: EvidenceChunk, vector: Vec<f32>) {
        let mut chunks = self.chunks.write();
        match chunks.iter_mut().find(|c| c.chunk.chunk_id == chunk.chunk_id) {
            Some(existing) => {
                existing.chunk = chunk;
                existing.vector = vector;
            }
            None => chunks.push(IndexedChunk { chunk, vector }),
        }
    }

    /// Embed and insert chunks in one embedding call.
    pub async fn index(&self, embedder: &dyn Embedder, chunks: Vec<EvidenceChunk>) -> Result<usize, EvidenceError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        crate::embedding::check_batch(&vectors, texts.len(), embedder.dimension())?;

        let count = chunks.len();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            self.insert(chunk, vector);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Rank stored chunks against `query`. A stored vector of another
    /// dimension is an error rather than a zero score.
    fn search_one(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, EvidenceError> {
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read();
        if let Some(c) = chunks.iter().find(|c| c.vector.len() != query.len()) {
            return Err(EvidenceError::Search(format!(
                "query has dimension {} but chunk '{}' has dimension {}",
                query.len(),
                c.chunk.chunk_id,
                c.vector.len()
            )));
        }

        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .map(|c| SearchHit {
                chunk_id: c.chunk.chunk_id.clone(),
                score: cosine_similarity(query, &c.vector),
                source: c.chunk.source.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn search_batch(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<Vec<SearchHit>>, EvidenceError> {
        queries.iter().map(|q| self.search_one(q, top_k)).collect()
    }

    async fn get_by_id(&self, chunk_id: &str) -> Result<Option<EvidenceChunk>, EvidenceError> {
        Ok(self
            .chunks
            .read()
            .iter()
            .find(|c| c.chunk.chunk_id == chunk_id)
            .map(|c| c.chunk.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    fn store_with(vectors: &[(&str, Vec<f32>)]) -> InMemoryEvidenceStore {
        let store = InMemoryEvidenceStore::new();
        for (id, vector) in vectors {
            store.insert(EvidenceChunk::new(*id, format!("text {id}"), "doc.pdf"), vector.clone());
        }
        store
    }

    #[tokio::test]
    async fn test_search_ranks_by_score() {
        let store = store_with(&[
            ("far", vec![0.0, 1.0]),
            ("near", vec![1.0, 0.1]),
            ("exact", vec![1.0, 0.0]),
        ]);

        let results = store.search_batch(&[vec![1.0, 0.0]], 2).await.unwrap();
        let ids: Vec<&str> = results[0].iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = store_with(&[("first", vec![1.0, 0.0]), ("second", vec![2.0, 0.0])]);

        let results = store.search_batch(&[vec![3.0, 0.0]], 2).await.unwrap();
        assert_eq!(results[0][0].chunk_id, "first");
        assert_eq!(results[0][1].chunk_id, "second");
    }

    #[tokio::test]
    async fn test_one_result_list_per_query() {
        let store = store_with(&[("a", vec![1.0, 0.0])]);

        let results = store
            .search_batch(&[vec![1.0, 0.0], vec![], vec![0.0, 1.0]], 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[1].is_empty());
        assert_eq!(results[2].len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_a_search_error() {
        let store = store_with(&[("tax", vec![0.5; 1536])]);

        match store.search_batch(&[vec![1.0; 256]], 3).await {
            Err(EvidenceError::Search(msg)) => {
                assert!(msg.contains("256"));
                assert!(msg.contains("'tax'"));
            }
            other => panic!("expected search error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_index_and_lookup() {
        let embedder = HashEmbedder::new(32);
        let store = InMemoryEvidenceStore::new();
        let indexed = store
            .index(&embedder, vec![
                EvidenceChunk::new("c1", "Boletus edulis forms mycorrhiza.", "fungi.pdf"),
                EvidenceChunk::new("c2", "Chanterelles grow in moss.", "fungi.pdf"),
            ])
            .await
            .unwrap();

        assert_eq!(indexed, 2);
        assert_eq!(
            store.get_by_id("c2").await.unwrap().map(|c| c.text),
            Some("Chanterelles grow in moss.".to_string())
        );
        assert!(store.get_by_id("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_hit_to_citation() {
        let hit = SearchHit {
            chunk_id: "c9".to_string(),
            score: 0.82,
            source: "handbook.pdf".to_string(),
        };
        let citation = Citation::from(&hit);
        assert_eq!(citation.id, "c9");
        assert_eq!(citation.source, "handbook.pdf");
    }
}
