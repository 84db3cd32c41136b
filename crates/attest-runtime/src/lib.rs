//! # attest-runtime
//!
//! Async claim verification over remote collaborators.
//!
//! The deterministic model and the root cause classifier live in
//! `attest-core`. This crate wires them to the services a verification run
//! needs: a completion provider, an embedder, an evidence store and,
//! for record-mode classification, a persisted result store.
//!
//! Collaborator failures never abort a run. Extraction degrades to an empty
//! claim set, entailment degrades through a chain of tiers and finally to
//! neutral labels, and every degradation is logged and recorded as a stage
//! metric.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use attest_runtime::{InMemoryEvidenceStore, OpenAiEmbedder, OpenAiProvider, Pipeline};
//!
//! let pipeline = Pipeline::builder()
//!     .provider(Arc::new(OpenAiProvider::from_env()?))
//!     .embedder(Arc::new(OpenAiEmbedder::from_env()?))
//!     .evidence_store(Arc::new(InMemoryEvidenceStore::new()))
//!     .build()?;
//!
//! let (state, verdict) = pipeline.run_and_classify(answer).await?;
//! println!("{} ({:.2})", verdict.label, verdict.confidence);
//! ```

pub mod cache;
pub mod checker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod root_cause;
pub mod stores;
pub mod usage;

#[cfg(any(test, feature = "mock"))]
pub mod testing;

pub use cache::ProvenanceCache;
pub use checker::{CheckOutcome, CheckPath, EvidenceChecker, Provenance, Tier, TierChain};
pub use config::{CacheConfig, ConfigError, ModelSettings, RuntimeConfig};
pub use embedding::{Embedder, EmbeddingError, HashEmbedder};
pub use error::PipelineError;
pub use extractor::ClaimExtractor;
pub use orchestrator::{Pipeline, PipelineBuilder};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderRegistry, ResponseFormat, Role, TokenUsage,
};
pub use root_cause::RootCauseNode;
pub use stores::{
    EvidenceChunk, EvidenceError, EvidenceStore, InMemoryEvidenceStore, InMemoryResultStore,
    ResultStore, SearchHit, StoreError,
};
pub use usage::{LlmUsage, UsageTracker};

#[cfg(feature = "openai")]
pub use providers::{OpenAiEmbedder, OpenAiProvider};

#[cfg(feature = "sqlite")]
pub use stores::SqliteResultStore;
