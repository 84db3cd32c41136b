//! Scripted collaborators for exercising degradation paths.
//!
//! Available under `cfg(test)` and the `mock` feature.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::embedding::{Embedder, EmbeddingError};
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, ResponseFormat,
    Role, TokenUsage,
};
use crate::stores::{EvidenceChunk, EvidenceError, EvidenceStore, SearchHit};

/// A request observed by [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl RecordedCall {
    /// Content of the last user message.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Provider that replays queued replies in order.
///
/// Once the queue is empty every call fails with `NotConfigured`.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply with nominal token usage.
    pub fn push_text(&self, content: impl Into<String>) -> &Self {
        let content = content.into();
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: (content.len() / 4) as u32,
        };
        self.replies.lock().push_back(Ok(CompletionResponse {
            content,
            logprobs: Vec::new(),
            usage,
            model: "scripted".to_string(),
        }));
        self
    }

    /// Queue a failed call.
    pub fn push_error(&self, error: ProviderError) -> &Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.lock().push(RecordedCall {
            messages,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            response_format: config.response_format.clone(),
        });

        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".to_string())))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Embedder wrapper counting batch calls.
pub struct CountingEmbedder<E> {
    inner: E,
    calls: AtomicUsize,
    fail: bool,
}

impl<E: Embedder> CountingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    /// Wrapper whose every call fails.
    pub fn failing(inner: E) -> Self {
        Self {
            fail: true,
            ..Self::new(inner)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CountingEmbedder<E> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::Request("embedding service unavailable".to_string()));
        }
        self.inner.embed(texts).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Evidence store wrapper counting calls and failing lookups for chosen ids.
pub struct CountingEvidenceStore {
    inner: Arc<dyn EvidenceStore>,
    failing_ids: HashSet<String>,
    search_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl CountingEvidenceStore {
    pub fn new(inner: Arc<dyn EvidenceStore>) -> Self {
        Self {
            inner,
            failing_ids: HashSet::new(),
            search_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    /// Make lookups of `chunk_id` fail.
    pub fn fail_lookup(mut self, chunk_id: impl Into<String>) -> Self {
        self.failing_ids.insert(chunk_id.into());
        self
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceStore for CountingEvidenceStore {
    async fn search_batch(
        &self,
        queries: &[Vec<f32>],
        top_k: usize,
    ) -> Result<Vec<Vec<SearchHit>>, EvidenceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.search_batch(queries, top_k).await
    }

    async fn get_by_id(&self, chunk_id: &str) -> Result<Option<EvidenceChunk>, EvidenceError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.contains(chunk_id) {
            return Err(EvidenceError::Lookup {
                id: chunk_id.to_string(),
                message: "connection reset".to_string(),
            });
        }
        self.inner.get_by_id(chunk_id).await
    }
}
