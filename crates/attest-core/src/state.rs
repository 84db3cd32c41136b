//! Per-run pipeline state.
//!
//! A [`RunState`] is created at pipeline start, mutated by each node in
//! sequence, and dropped (or handed to a persistence layer) at the end.
//! Stage metrics are additive: logging a metric merges keys into the
//! stage's existing map and never replaces the map wholesale.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::metrics::VerificationMetrics;
use crate::types::{Claim, Verdict, VerifiedClaim};
use crate::CoreError;

/// Pipeline stages that own a metric map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Retrieval,
    Generation,
    ClaimExtraction,
    Verification,
    RootCause,
    Pipeline,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::ClaimExtraction => "claim_extraction",
            Stage::Verification => "verification",
            Stage::RootCause => "root_cause",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric map for one stage. Ordered for stable serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageMetrics(BTreeMap<String, Value>);

impl StageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary JSON value. Anything but an object is empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge keys from `other`, overwriting only the keys it carries.
    pub fn merge(&mut self, other: StageMetrics) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect::<Map<String, Value>>())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StageMetrics {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Mutable state shared by the nodes of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    /// The generated answer under verification
    pub answer: String,

    /// Extracted claims with their citations
    pub claims: Vec<Claim>,

    /// Claims after entailment labeling
    pub verified_claims: Vec<VerifiedClaim>,

    /// Externally supplied compliance score, if any
    pub compliance_score: Option<f64>,

    /// Verdict from the root cause classifier
    pub verdict: Option<Verdict>,

    pub ingestion: StageMetrics,
    pub retrieval: StageMetrics,
    pub generation: StageMetrics,
    pub claim_extraction: StageMetrics,
    pub verification: StageMetrics,
    pub root_cause: StageMetrics,
    pub pipeline: StageMetrics,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run for the given answer.
    pub fn for_answer(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Default::default()
        }
    }

    /// Metrics recorded for a stage.
    pub fn stage(&self, stage: Stage) -> &StageMetrics {
        match stage {
            Stage::Ingestion => &self.ingestion,
            Stage::Retrieval => &self.retrieval,
            Stage::Generation => &self.generation,
            Stage::ClaimExtraction => &self.claim_extraction,
            Stage::Verification => &self.verification,
            Stage::RootCause => &self.root_cause,
            Stage::Pipeline => &self.pipeline,
        }
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageMetrics {
        match stage {
            Stage::Ingestion => &mut self.ingestion,
            Stage::Retrieval => &mut self.retrieval,
            Stage::Generation => &mut self.generation,
            Stage::ClaimExtraction => &mut self.claim_extraction,
            Stage::Verification => &mut self.verification,
            Stage::RootCause => &mut self.root_cause,
            Stage::Pipeline => &mut self.pipeline,
        }
    }

    /// Merge metric entries into a stage.
    pub fn log_metric<I, K>(&mut self, stage: Stage, entries: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.stage_mut(stage).merge(entries.into_iter().collect());
    }

    /// Serialize a struct and merge its fields into a stage.
    pub fn log_serialized<T: Serialize>(&mut self, stage: Stage, metrics: &T) -> Result<(), CoreError> {
        match serde_json::to_value(metrics)? {
            Value::Object(map) => {
                self.log_metric(stage, map);
            }
            other => {
                tracing::warn!(stage = %stage, value = %other, "Ignoring non-object metric");
            }
        }
        Ok(())
    }

    /// Verification metrics as currently recorded (zeros when absent).
    pub fn verification_metrics(&self) -> VerificationMetrics {
        VerificationMetrics {
            entailment_ratio: self.verification.get_f64("entailment_ratio").unwrap_or(0.0),
            contradiction_ratio: self.verification.get_f64("contradiction_ratio").unwrap_or(0.0),
            avg_confidence: self.verification.get_f64("avg_confidence").unwrap_or(0.0),
        }
    }

    /// The compliance blob the classifier reads in live mode.
    pub fn compliance_metrics(&self) -> Value {
        let mut compliance = Map::new();
        compliance.insert("claim_extraction".to_string(), self.claim_extraction.to_value());
        compliance.insert("verification".to_string(), self.verification.to_value());
        if let Some(score) = self.compliance_score {
            compliance.insert("compliance_score".to_string(), Value::from(score));
        }
        Value::Object(compliance)
    }

    /// The compliance blob a persistence layer stores for this run.
    ///
    /// A missing compliance score is derived as
    /// `round(entailment_ratio * avg_confidence, 3)`.
    pub fn compliance_summary(&self) -> Value {
        let score = self.compliance_score.unwrap_or_else(|| {
            let metrics = self.verification_metrics();
            round_to(metrics.entailment_ratio * metrics.avg_confidence, 3)
        });

        serde_json::json!({
            "claim_extraction": self.claim_extraction.to_value(),
            "verification": self.verification.to_value(),
            "num_claims": self.claims.len(),
            "num_verified_claims": self.verified_claims.len(),
            "compliance_score": score,
        })
    }
}

/// Round to a fixed number of decimals.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
