//! Core data model for claims, entailment results and verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nearest evidence chunk attached to a claim at extraction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Evidence chunk identifier
    pub id: String,

    /// Similarity score reported by the search collaborator
    pub score: f64,

    /// Source document of the chunk
    pub source: String,
}

/// An atomic, independently checkable statement taken from an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub text: String,

    #[serde(default)]
    pub citation: Option<Citation>,
}

impl Claim {
    /// Create an uncited claim.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citation: None,
        }
    }

    /// Create a claim citing the given chunk.
    pub fn cited(text: impl Into<String>, citation: Citation) -> Self {
        Self {
            text: text.into(),
            citation: Some(citation),
        }
    }

    /// The cited chunk id, if any.
    pub fn citation_id(&self) -> Option<&str> {
        self.citation.as_ref().map(|c| c.id.as_str())
    }
}

/// Relationship between a claim and its evidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntailmentLabel {
    /// The evidence supports the claim
    Entailment,

    /// The evidence refutes the claim
    Contradiction,

    /// The evidence is unrelated or insufficient
    #[default]
    Neutral,
}

impl EntailmentLabel {
    pub const ALL: [EntailmentLabel; 3] = [
        EntailmentLabel::Entailment,
        EntailmentLabel::Contradiction,
        EntailmentLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntailmentLabel::Entailment => "entailment",
            EntailmentLabel::Contradiction => "contradiction",
            EntailmentLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EntailmentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entailment judgement: label plus confidence in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Entailment {
    pub label: EntailmentLabel,
    pub confidence: f64,
}

impl Entailment {
    /// Create a judgement, clamping confidence into [0, 1].
    ///
    /// NaN confidence is treated as 0.0.
    pub fn new(label: EntailmentLabel, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { label, confidence }
    }

    /// The degraded result used whenever a judgement could not be obtained.
    pub fn neutral_default() -> Self {
        Self {
            label: EntailmentLabel::Neutral,
            confidence: 0.0,
        }
    }
}

impl Default for Entailment {
    fn default() -> Self {
        Self::neutral_default()
    }
}

/// A claim after the evidence checker has labeled it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerifiedClaim {
    #[serde(flatten)]
    pub claim: Claim,

    pub entailment: EntailmentLabel,

    pub confidence: f64,
}

impl VerifiedClaim {
    pub fn new(claim: Claim, result: Entailment) -> Self {
        let result = Entailment::new(result.label, result.confidence);
        Self {
            claim,
            entailment: result.label,
            confidence: result.confidence,
        }
    }

    pub fn text(&self) -> &str {
        &self.claim.text
    }
}

/// Compliance verdict buckets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerdictLabel {
    #[serde(rename = "Fully Compliant")]
    FullyCompliant,

    #[serde(rename = "Partially Compliant")]
    PartiallyCompliant,

    #[serde(rename = "Non-Compliant")]
    NonCompliant,

    #[serde(rename = "Severely Non-Compliant")]
    SeverelyNonCompliant,

    #[serde(rename = "Inconclusive")]
    Inconclusive,
}

impl VerdictLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictLabel::FullyCompliant => "Fully Compliant",
            VerdictLabel::PartiallyCompliant => "Partially Compliant",
            VerdictLabel::NonCompliant => "Non-Compliant",
            VerdictLabel::SeverelyNonCompliant => "Severely Non-Compliant",
            VerdictLabel::Inconclusive => "Inconclusive",
        }
    }
}

impl fmt::Display for VerdictLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one root cause classification. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub label: VerdictLabel,

    /// Explanations in check order, never empty
    pub root_causes: Vec<String>,

    /// Confidence in the diagnosis, in [0, 1]
    pub confidence: f64,

    pub compliance_score: f64,

    pub classified_at: DateTime<Utc>,
}
