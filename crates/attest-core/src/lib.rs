//! # attest-core
//!
//! Deterministic model for claim verification and compliance scoring.
//!
//! This crate holds everything in attest that does not talk to a remote
//! service:
//! - The claim and verdict data model
//! - The per-run [`RunState`] with additive stage metrics
//! - The claim parser for raw completion text
//! - Structured response schemas for entailment output
//! - The root cause classifier that turns stage metrics into a [`Verdict`]
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same metrics always produce the same verdict
//! 2. **No remote calls**: Collaborators live in `attest-runtime`
//! 3. **Never panics on model output**: Parsing degrades to empty results
//!
//! ## Example
//!
//! ```rust,ignore
//! use attest_core::{classify, MetricsInput};
//!
//! let input = MetricsInput::from_json(&serde_json::json!({
//!     "retrieval": { "distinct_source_count": 3, "lexical_overlap": 0.4 },
//!     "compliance": { "verification": {
//!         "entailment_ratio": 0.9, "contradiction_ratio": 0.0, "avg_confidence": 0.9
//!     }}
//! }));
//! let verdict = classify(&input);
//! println!("{}: {:?}", verdict.label, verdict.root_causes);
//! ```

pub mod classifier;
pub mod metrics;
pub mod parser;
pub mod record;
pub mod schema;
pub mod state;
pub mod types;

pub use classifier::{classify, MetricsInput, QualitySignals, RootCauseCheck, ROOT_CAUSE_CHECKS};
pub use metrics::VerificationMetrics;
pub use parser::parse_claims;
pub use record::PersistedRecord;
pub use schema::{decode_batch_response, decode_single_response, SchemaError};
pub use state::{RunState, Stage, StageMetrics};
pub use types::{
    Citation, Claim, Entailment, EntailmentLabel, Verdict, VerdictLabel, VerifiedClaim,
};

use thiserror::Error;

/// Errors raised by the deterministic core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Metric serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
