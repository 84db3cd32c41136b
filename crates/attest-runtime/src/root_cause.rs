//! Root cause node: runs the classifier over a live run or a stored record.

use serde_json::json;
use std::sync::Arc;

use attest_core::{classify, MetricsInput, RunState, Stage, Verdict};

use crate::error::PipelineError;
use crate::stores::ResultStore;

/// Classifies a run into a verdict with root causes.
///
/// # Input sources
/// - Live: the stage metrics of a supplied [`RunState`]
/// - Record: the four metric blobs and answer of a persisted record
///
/// When both are supplied the record is the metrics source and the state
/// receives the results.
#[derive(Default)]
pub struct RootCauseNode {
    results: Option<Arc<dyn ResultStore>>,
}

impl RootCauseNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result_store(mut self, results: Arc<dyn ResultStore>) -> Self {
        self.results = Some(results);
        self
    }

    /// Classify and, when a state is supplied, write the verdict into it.
    pub async fn run(
        &self,
        state: Option<&mut RunState>,
        record_id: Option<i64>,
    ) -> Result<Verdict, PipelineError> {
        let input = match (record_id, state.as_deref()) {
            (Some(id), _) => self.load_record(id).await?,
            (None, Some(state)) => MetricsInput::from_state(state),
            (None, None) => return Err(PipelineError::MissingClassifierInput),
        };

        let verdict = classify(&input);

        tracing::info!(
            label = %verdict.label,
            confidence = verdict.confidence,
            compliance_score = verdict.compliance_score,
            causes = verdict.root_causes.len(),
            record_id = ?record_id,
            "Root cause classification complete"
        );

        if let Some(state) = state {
            record_verdict(state, &input, &verdict);
        }
        Ok(verdict)
    }

    /// Load a stored record as classifier input.
    ///
    /// A missing record classifies as empty metrics; a store failure is an error.
    pub async fn load_record(&self, record_id: i64) -> Result<MetricsInput, PipelineError> {
        let results = self
            .results
            .as_ref()
            .ok_or(PipelineError::ResultStoreNotConfigured)?;

        match results.fetch_record(record_id).await? {
            Some(record) => Ok(MetricsInput::from_record(&record)),
            None => {
                tracing::warn!(record_id, "No result record found; classifying empty metrics");
                Ok(MetricsInput::default())
            }
        }
    }
}

fn record_verdict(state: &mut RunState, input: &MetricsInput, verdict: &Verdict) {
    if !input.answer.is_empty() {
        state.answer = input.answer.clone();
    }

    state.log_metric(
        Stage::RootCause,
        [
            ("verdict", json!(verdict.label.as_str())),
            ("root_causes", json!(verdict.root_causes)),
            ("confidence", json!(verdict.confidence)),
            ("compliance_score", json!(verdict.compliance_score)),
            ("classified_at", json!(verdict.classified_at.to_rfc3339())),
        ],
    );
    state.log_metric(
        Stage::Pipeline,
        [
            ("ingestion", input.ingestion.to_value()),
            ("retrieval", input.retrieval.to_value()),
            ("generation", input.generation.to_value()),
            ("compliance", input.compliance.to_value()),
        ],
    );
    state.verdict = Some(verdict.clone());
}
