//! Pipeline orchestrator for claim verification.
//!
//! The pipeline sequences the nodes over one [`RunState`] per run:
//! - Claim extraction (completion, embedding, evidence search)
//! - Evidence checking (provenance, tiered entailment)
//! - Root cause classification, when requested
//!
//! Nodes never share a run state. Independent runs may execute concurrently
//! on one pipeline; collaborators are shared read-only.

use std::sync::Arc;

use attest_core::{RunState, Stage, Verdict};

use crate::cache::ProvenanceCache;
use crate::checker::{EvidenceChecker, TierChain};
use crate::config::RuntimeConfig;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::extractor::ClaimExtractor;
use crate::providers::LlmProvider;
use crate::root_cause::RootCauseNode;
use crate::stores::{EvidenceStore, ResultStore};
use crate::usage::{LlmUsage, UsageTracker};

/// Claim verification pipeline.
pub struct Pipeline {
    extractor: ClaimExtractor,
    checker: EvidenceChecker,
    root_cause: RootCauseNode,
    config: RuntimeConfig,

    /// Usage across every run of this pipeline
    usage: Arc<UsageTracker>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Extract and verify claims for `answer`.
    pub async fn run(&self, answer: impl Into<String>) -> RunState {
        let mut state = RunState::for_answer(answer);
        self.run_state(&mut state).await;
        state
    }

    /// Extract and verify claims for a prepared state.
    ///
    /// Upstream stage metrics already on the state (ingestion, retrieval,
    /// generation) are kept for classification.
    pub async fn run_state(&self, state: &mut RunState) {
        let run_usage = UsageTracker::new();

        self.extractor
            .extract_tracked(state, self.config.top_k, &run_usage)
            .await;
        self.checker.verify_tracked(state, &run_usage).await;

        let usage = run_usage.snapshot();
        self.usage.absorb(&usage);
        if let Err(e) = state.log_serialized(Stage::Pipeline, &usage) {
            tracing::warn!(error = %e, "Failed to record usage metrics");
        }

        tracing::info!(
            claims = state.claims.len(),
            llm_calls = usage.llm_calls,
            failed_calls = usage.failed_calls,
            total_tokens = usage.total_tokens(),
            "Pipeline run complete"
        );
    }

    /// Extract, verify, then classify the run from its own metrics.
    pub async fn run_and_classify(
        &self,
        answer: impl Into<String>,
    ) -> Result<(RunState, Verdict), PipelineError> {
        let mut state = self.run(answer).await;
        let verdict = self.root_cause.run(Some(&mut state), None).await?;
        Ok((state, verdict))
    }

    /// Classify a live state, a stored record, or both.
    pub async fn classify(
        &self,
        state: Option<&mut RunState>,
        record_id: Option<i64>,
    ) -> Result<Verdict, PipelineError> {
        self.root_cause.run(state, record_id).await
    }

    /// Classify a stored record on its own.
    pub async fn classify_record(&self, record_id: i64) -> Result<Verdict, PipelineError> {
        self.root_cause.run(None, Some(record_id)).await
    }

    /// Usage accumulated over every run so far.
    pub fn usage(&self) -> LlmUsage {
        self.usage.snapshot()
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn Embedder>>,
    evidence: Option<Arc<dyn EvidenceStore>>,
    results: Option<Arc<dyn ResultStore>>,
    config: RuntimeConfig,
    chain: TierChain,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            embedder: None,
            evidence: None,
            results: None,
            config: RuntimeConfig::default(),
            chain: TierChain::default_chain(),
        }
    }

    /// Set the completion provider.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the embedder used for claims. Must match the evidence store's vectors.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn evidence_store(mut self, store: Arc<dyn EvidenceStore>) -> Self {
        self.evidence = Some(store);
        self
    }

    /// Set the store used for record-mode classification.
    pub fn result_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.results = Some(store);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the entailment tier order.
    pub fn tier_chain(mut self, chain: TierChain) -> Self {
        self.chain = chain;
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let provider = self
            .provider
            .ok_or_else(|| PipelineError::NotConfigured("No completion provider set".to_string()))?;
        let evidence = self
            .evidence
            .ok_or_else(|| PipelineError::NotConfigured("No evidence store set".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| PipelineError::NotConfigured("No embedder set".to_string()))?;

        let usage = Arc::new(UsageTracker::new());
        let config = self.config;

        let extractor = ClaimExtractor::new(
            provider.clone(),
            embedder,
            evidence.clone(),
            config.extraction_completion(),
        )
        .with_usage(usage.clone());

        let mut checker = EvidenceChecker::new(provider, evidence, config.entailment_completion())
            .with_chain(self.chain)
            .with_usage(usage.clone());
        if config.cache.enabled {
            checker = checker.with_cache(ProvenanceCache::from_config(&config.cache));
        }

        let root_cause = match self.results {
            Some(results) => RootCauseNode::new().with_result_store(results),
            None => RootCauseNode::new(),
        };

        Ok(Pipeline {
            extractor,
            checker,
            root_cause,
            config,
            usage,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
