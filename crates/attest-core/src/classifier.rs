//! Root cause classifier: aggregates stage metrics into a compliance verdict.
//!
//! The classifier applies fixed, non-configurable threshold checks:
//! 1. Every triggered check appends one explanation and a confidence penalty
//! 2. Penalties are cumulative and independent of check order
//! 3. Confidence below 0.4 yields INCONCLUSIVE regardless of score
//! 4. Otherwise the compliance score is bucketed at 0.85 / 0.60 / 0.30
//!
//! Classification is a pure function of its metrics input.

use chrono::Utc;
use serde_json::{json, Value};

use crate::record::PersistedRecord;
use crate::state::{round_to, RunState, StageMetrics};
use crate::types::{Verdict, VerdictLabel};

/// Root cause reported when no check fires.
pub const NO_ISSUES: &str = "No significant issues detected.";

/// Confidence below which the verdict is inconclusive (hundredths).
const INCONCLUSIVE_BELOW: u32 = 40;

/// Score thresholds, highest first.
const SCORE_BUCKETS: [(f64, VerdictLabel); 3] = [
    (0.85, VerdictLabel::FullyCompliant),
    (0.60, VerdictLabel::PartiallyCompliant),
    (0.30, VerdictLabel::NonCompliant),
];

/// Stage metrics gathered for one classification call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsInput {
    pub ingestion: StageMetrics,
    pub retrieval: StageMetrics,
    pub generation: StageMetrics,

    /// `{claim_extraction, verification, compliance_score?}`
    pub compliance: StageMetrics,

    pub answer: String,
}

impl MetricsInput {
    /// Gather metrics from a just-completed run.
    pub fn from_state(state: &RunState) -> Self {
        Self {
            ingestion: state.ingestion.clone(),
            retrieval: state.retrieval.clone(),
            generation: state.generation.clone(),
            compliance: StageMetrics::from_value(state.compliance_metrics()),
            answer: state.answer.clone(),
        }
    }

    /// Gather metrics from a persisted record.
    pub fn from_record(record: &PersistedRecord) -> Self {
        Self {
            ingestion: record.ingestion(),
            retrieval: record.retrieval(),
            generation: record.generation(),
            compliance: record.compliance(),
            answer: record.answer_text().to_string(),
        }
    }

    /// Gather metrics from a `{ingestion, retrieval, generation, compliance}` object.
    pub fn from_json(value: &Value) -> Self {
        let stage = |key: &str| {
            value
                .get(key)
                .cloned()
                .map(StageMetrics::from_value)
                .unwrap_or_default()
        };

        Self {
            ingestion: stage("ingestion"),
            retrieval: stage("retrieval"),
            generation: stage("generation"),
            compliance: stage("compliance"),
            answer: value
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// The four input blobs, as recorded under the `pipeline` stage.
    pub fn snapshot(&self) -> Value {
        json!({
            "ingestion": self.ingestion.to_value(),
            "retrieval": self.retrieval.to_value(),
            "generation": self.generation.to_value(),
            "compliance": self.compliance.to_value(),
        })
    }
}

/// Quality signals read out of the stage metrics, with neutral defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitySignals {
    pub parsing_success_rate: f64,
    pub embedding_fidelity: f64,
    pub topk_gap: f64,
    pub distinct_source_count: f64,
    pub lexical_overlap: f64,
    pub hallucination_warnings: bool,
    pub entailment_ratio: f64,
    pub contradiction_ratio: f64,
    pub avg_confidence: f64,
    pub compliance_score: Option<f64>,
}

impl QualitySignals {
    pub fn from_input(input: &MetricsInput) -> Self {
        let verification = input
            .compliance
            .get("verification")
            .cloned()
            .map(StageMetrics::from_value)
            .unwrap_or_default();

        let hallucination_warnings = input
            .generation
            .get("preliminary_hallucination_warnings")
            .or_else(|| input.generation.get("preliminary_hallucinations_warnings"))
            .map(is_truthy)
            .unwrap_or(false);

        Self {
            parsing_success_rate: input.ingestion.get_f64("parsing_success_rate").unwrap_or(1.0),
            embedding_fidelity: input.ingestion.get_f64("embedding_fidelity").unwrap_or(1.0),
            topk_gap: input.retrieval.get_f64("topk_gap").unwrap_or(0.0),
            distinct_source_count: input.retrieval.get_f64("distinct_source_count").unwrap_or(1.0),
            lexical_overlap: input.retrieval.get_f64("lexical_overlap").unwrap_or(0.0),
            hallucination_warnings,
            entailment_ratio: verification.get_f64("entailment_ratio").unwrap_or(0.0),
            contradiction_ratio: verification.get_f64("contradiction_ratio").unwrap_or(0.0),
            avg_confidence: verification.get_f64("avg_confidence").unwrap_or(0.0),
            compliance_score: input.compliance.get_f64("compliance_score"),
        }
    }
}

/// Non-empty collections, non-zero numbers, `true` and non-empty strings count.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// One threshold check of the heuristic.
pub struct RootCauseCheck {
    /// Explanation appended when the check fires
    pub cause: &'static str,

    /// Confidence penalty in hundredths
    pub penalty_pct: u32,

    /// Whether the check fires for these signals
    pub fires: fn(&QualitySignals) -> bool,
}

impl RootCauseCheck {
    pub fn penalty(&self) -> f64 {
        f64::from(self.penalty_pct) / 100.0
    }
}

/// The fixed check table, in reporting order.
pub static ROOT_CAUSE_CHECKS: [RootCauseCheck; 8] = [
    RootCauseCheck {
        cause: "Poor parsing success; document ingestion incomplete.",
        penalty_pct: 10,
        fires: |s| s.parsing_success_rate < 0.9,
    },
    RootCauseCheck {
        cause: "Low embedding fidelity; retrieval relevance may be reduced.",
        penalty_pct: 15,
        fires: |s| s.embedding_fidelity < 0.7,
    },
    RootCauseCheck {
        cause: "Retrieval narrow or unbalanced; low source diversity.",
        penalty_pct: 15,
        fires: |s| s.distinct_source_count < 2.0 || s.lexical_overlap < 0.15,
    },
    RootCauseCheck {
        cause: "Retrieval instability (high top-k gap).",
        penalty_pct: 5,
        fires: |s| s.topk_gap > 0.05,
    },
    RootCauseCheck {
        cause: "Potential hallucinations detected in generation step.",
        penalty_pct: 10,
        fires: |s| s.hallucination_warnings,
    },
    RootCauseCheck {
        cause: "Low entailment ratio between answer and sources.",
        penalty_pct: 20,
        fires: |s| s.entailment_ratio < 0.5,
    },
    RootCauseCheck {
        cause: "Contradictory evidence in verified claims.",
        penalty_pct: 20,
        fires: |s| s.contradiction_ratio > 0.3,
    },
    RootCauseCheck {
        cause: "Low model confidence in factual verification.",
        penalty_pct: 10,
        fires: |s| s.avg_confidence < 0.6,
    },
];

/// Classify stage metrics into a verdict.
pub fn classify(input: &MetricsInput) -> Verdict {
    let signals = QualitySignals::from_input(input);

    let fired: Vec<&RootCauseCheck> = ROOT_CAUSE_CHECKS
        .iter()
        .filter(|check| (check.fires)(&signals))
        .collect();

    let total_penalty: u32 = fired.iter().map(|check| check.penalty_pct).sum();
    let confidence_pct = 100u32.saturating_sub(total_penalty);

    let score = signals
        .compliance_score
        .unwrap_or((signals.entailment_ratio + signals.avg_confidence) / 2.0);

    let label = if confidence_pct < INCONCLUSIVE_BELOW {
        VerdictLabel::Inconclusive
    } else {
        bucket_score(score)
    };

    let mut root_causes: Vec<String> = fired.iter().map(|check| check.cause.to_string()).collect();
    if root_causes.is_empty() {
        root_causes.push(NO_ISSUES.to_string());
    }

    Verdict {
        label,
        root_causes,
        confidence: round_to(f64::from(confidence_pct) / 100.0, 2),
        compliance_score: round_to(score, 3),
        classified_at: Utc::now(),
    }
}

fn bucket_score(score: f64) -> VerdictLabel {
    SCORE_BUCKETS
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, label)| *label)
        .unwrap_or(VerdictLabel::SeverelyNonCompliant)
}
