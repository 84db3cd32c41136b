//! Claim extraction: answer text to cited claims.
//!
//! One completion call, one batch embedding call and one batch search call
//! per answer. Every collaborator failure degrades locally and is recorded
//! as a `warning` metric under the `claim_extraction` stage.

use serde_json::json;
use std::sync::Arc;

use attest_core::{parse_claims, Citation, Claim, RunState, Stage};

use crate::embedding::Embedder;
use crate::prompts::claim_extraction_prompt;
use crate::providers::{CompletionConfig, LlmProvider};
use crate::stores::{EvidenceStore, SearchHit};
use crate::usage::{complete_tracked, UsageTracker};

/// Extracts atomic claims from an answer and cites their nearest evidence.
pub struct ClaimExtractor {
    provider: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn EvidenceStore>,
    config: CompletionConfig,
    usage: Arc<UsageTracker>,
}

impl ClaimExtractor {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn EvidenceStore>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            provider,
            embedder,
            store,
            config,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    pub fn with_usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Extract claims from `answer` into a fresh run state.
    pub async fn extract_answer(&self, answer: impl Into<String>, top_k: usize) -> RunState {
        let mut state = RunState::for_answer(answer);
        self.extract(&mut state, top_k).await;
        state
    }

    /// Extract claims from `state.answer` into `state.claims`.
    ///
    /// Each claim is cited with the best of its `top_k` nearest chunks, or
    /// left uncited when the search found nothing for it.
    pub async fn extract(&self, state: &mut RunState, top_k: usize) {
        self.extract_tracked(state, top_k, &self.usage).await;
    }

    pub(crate) async fn extract_tracked(&self, state: &mut RunState, top_k: usize, usage: &UsageTracker) {
        let prompt = claim_extraction_prompt(&state.answer);

        let response = match complete_tracked(self.provider.as_ref(), usage, prompt, &self.config).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Claim extraction call failed; continuing with no claims");
                state.claims = Vec::new();
                state.log_metric(
                    Stage::ClaimExtraction,
                    [
                        ("claim_count", json!(0)),
                        ("warning", json!(format!("Claim extraction failed: {e}"))),
                    ],
                );
                return;
            }
        };

        let texts = parse_claims(&response.content);
        if texts.is_empty() {
            tracing::warn!(response_len = response.content.len(), "No claims parsed from extraction response");
            state.claims = Vec::new();
            state.log_metric(
                Stage::ClaimExtraction,
                [("claim_count", json!(0)), ("warning", json!("No claims parsed"))],
            );
            return;
        }

        let lookup = self.nearest_evidence(&texts, top_k.max(1)).await;
        let claims = match lookup {
            Ok(hits) => attach_citations(texts, &hits),
            Err(message) => {
                tracing::warn!(claims = texts.len(), error = %message, "Citation lookup failed; claims left uncited");
                state.log_metric(Stage::ClaimExtraction, [("warning", json!(message))]);
                texts.into_iter().map(Claim::new).collect()
            }
        };

        let count = claims.len();
        let cited = claims.iter().filter(|c| c.citation.is_some()).count();
        tracing::info!(claims = count, cited, "Claim extraction complete");

        state.claims = claims;
        state.log_metric(
            Stage::ClaimExtraction,
            [
                ("claim_count", json!(count)),
                ("num_citations_found", json!(cited)),
            ],
        );
    }

    /// Embed every claim in one call and search for all of them in one call.
    async fn nearest_evidence(&self, texts: &[String], top_k: usize) -> Result<Vec<Vec<SearchHit>>, String> {
        let vectors = self
            .embedder
            .embed(texts)
            .await
            .map_err(|e| format!("Claim embedding failed: {e}"))?;

        self.store
            .search_batch(&vectors, top_k)
            .await
            .map_err(|e| format!("Evidence search failed: {e}"))
    }
}

/// Pair each claim with the first hit of its result list.
///
/// Result lists are taken in the collaborator's order; a claim whose list is
/// empty or missing stays uncited.
fn attach_citations(texts: Vec<String>, hits: &[Vec<SearchHit>]) -> Vec<Claim> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            match hits.get(i).and_then(|list| list.first()).map(Citation::from) {
                Some(citation) => Claim::cited(text, citation),
                None => Claim::new(text),
            }
        })
        .collect()
}
