//! Persisted result records.
//!
//! A record holds the serialized metric blobs written by the surrounding
//! pipeline. Blobs are decoded leniently: absent or malformed blobs become
//! empty metric maps and never raise.

use serde::{Deserialize, Serialize};

use crate::state::StageMetrics;

/// One row of the persisted result store, with blobs still serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: i64,

    #[serde(default)]
    pub metrics_ingestion: Option<String>,

    #[serde(default)]
    pub metrics_retrieval: Option<String>,

    #[serde(default)]
    pub metrics_generation: Option<String>,

    #[serde(default)]
    pub metrics_compliance: Option<String>,

    #[serde(default)]
    pub answer: Option<String>,
}

impl PersistedRecord {
    pub fn ingestion(&self) -> StageMetrics {
        load_blob(self.metrics_ingestion.as_deref())
    }

    pub fn retrieval(&self) -> StageMetrics {
        load_blob(self.metrics_retrieval.as_deref())
    }

    pub fn generation(&self) -> StageMetrics {
        load_blob(self.metrics_generation.as_deref())
    }

    pub fn compliance(&self) -> StageMetrics {
        load_blob(self.metrics_compliance.as_deref())
    }

    pub fn answer_text(&self) -> &str {
        self.answer.as_deref().unwrap_or("")
    }
}

/// Decode a metric blob, falling back to an empty map.
pub fn load_blob(blob: Option<&str>) -> StageMetrics {
    let Some(raw) = blob.filter(|b| !b.trim().is_empty()) else {
        return StageMetrics::new();
    };

    match serde_json::from_str(raw) {
        Ok(value) => StageMetrics::from_value(value),
        Err(e) => {
            tracing::debug!(error = %e, "Discarding malformed metric blob");
            StageMetrics::new()
        }
    }
}
