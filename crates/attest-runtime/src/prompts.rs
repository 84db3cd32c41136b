//! Prompt builders for extraction and entailment calls.
//!
//! Batch prompts refer to each distinct evidence text by a short symbolic
//! label (`Evidence A`, `Evidence B`, ...) so a chunk cited by several claims
//! is sent once. Labeling lives here and nowhere else: the evidence checker
//! only deals in chunk ids.

use std::collections::HashMap;
use std::fmt::Write as _;

use attest_core::Claim;

use crate::checker::Provenance;

/// System message sent with every call.
pub const SYSTEM_PROMPT: &str = "You are a factual compliance analysis assistant.";

const EXTRACTION_PROMPT: &str = r#"
You extract factual claims from answers.

Read the answer below and list every independent, verifiable factual claim.

- One claim per array element; each claim states exactly one fact.
- Do NOT merge several facts into one claim.
- Output a JSON array whose elements are objects with a single field:
  "text": "<claim>"

Example output:
[
  { "text": "Water boils at 100 C at sea level." },
  { "text": "Ice melts at 0 C." }
]

Answer to analyze:
"""{answer}"""
"#;

const LABEL_GUIDE: &str = r#"
Classify the relationship between evidence (premise) and claim (hypothesis):
- "entailment": the evidence supports the claim
- "contradiction": the evidence refutes the claim
- "neutral": the evidence is unrelated or insufficient

Each judgement is an object:
- label: one of ["entailment", "contradiction", "neutral"]
- confidence: a number between 0 and 1

Examples:

Evidence: "Water freezes at 0 C under normal conditions."
Claim: "Water becomes solid at 0 C."
Output: {"label": "entailment", "confidence": 0.97}

Evidence: "The Earth revolves around the Sun."
Claim: "The Sun revolves around the Earth."
Output: {"label": "contradiction", "confidence": 1.0}

Evidence: "The Moon has craters."
Claim: "The Moon is made of cheese."
Output: {"label": "neutral", "confidence": 0.99}
"#;

/// Label for the `index`-th distinct evidence text: A..Z, AA..AZ, BA, ...
pub fn evidence_label(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    let suffix: String = letters.into_iter().rev().collect();
    format!("Evidence {suffix}")
}

/// Assigns evidence labels in first-appearance order.
#[derive(Debug, Default, Clone)]
pub struct EvidenceLabeler {
    by_id: HashMap<String, usize>,
    order: Vec<String>,
}

impl EvidenceLabeler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label for `chunk_id`, assigning the next one on first sight.
    pub fn assign(&mut self, chunk_id: &str) -> String {
        if let Some(index) = self.by_id.get(chunk_id) {
            return evidence_label(*index);
        }

        let index = self.order.len();
        self.order.push(chunk_id.to_string());
        self.by_id.insert(chunk_id.to_string(), index);
        evidence_label(index)
    }

    pub fn label(&self, chunk_id: &str) -> Option<String> {
        self.by_id.get(chunk_id).map(|i| evidence_label(*i))
    }

    /// Labeled chunk ids in label order.
    pub fn chunk_ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Prompt asking for claims in `answer`.
pub fn claim_extraction_prompt(answer: &str) -> String {
    EXTRACTION_PROMPT.replace("{answer}", answer)
}

/// Prompt for a single premise/hypothesis pair.
pub fn entailment_prompt(premise: &str, hypothesis: &str) -> String {
    format!(
        "{LABEL_GUIDE}\nReturn one object following the schema above.\n\nEvidence: \"\"\"{premise}\"\"\"\nClaim: \"\"\"{hypothesis}\"\"\"\n"
    )
}

/// Prompt for a batch of claims against their cited evidence.
///
/// Only evidence with resolved text gets a label. Claims without one are
/// marked "no evidence". The reply must be `{"claims": [...]}` with one
/// judgement per claim, in claim order.
pub fn batch_entailment_prompt(claims: &[Claim], provenance: &Provenance) -> String {
    let mut labeler = EvidenceLabeler::new();
    let refs: Vec<Option<String>> = claims
        .iter()
        .map(|claim| {
            claim
                .citation_id()
                .filter(|id| !provenance.text(id).is_empty())
                .map(|id| labeler.assign(id))
        })
        .collect();

    let mut evidence = String::new();
    for (index, chunk_id) in labeler.chunk_ids().iter().enumerate() {
        let _ = writeln!(
            evidence,
            "{}: \"\"\"{}\"\"\"",
            evidence_label(index),
            provenance.text(chunk_id)
        );
    }

    let mut listed = String::new();
    for (i, (claim, evidence_ref)) in claims.iter().zip(&refs).enumerate() {
        let _ = writeln!(
            listed,
            "{}. Claim: \"\"\"{}\"\"\" (uses {})",
            i + 1,
            claim.text,
            evidence_ref.as_deref().unwrap_or("no evidence")
        );
    }

    format!(
        "{LABEL_GUIDE}\nBelow are EVIDENCE texts labeled by letter, followed by {count} CLAIMS. \
         Each claim names the evidence it relates to.\n\n\
         ### EVIDENCE TEXTS ###\n{evidence}\n\
         ### CLAIMS ###\n{listed}\n\
         Return {{\"claims\": [...]}} with exactly {count} judgements, one per claim, in claim order.\n",
        count = claims.len()
    )
}
