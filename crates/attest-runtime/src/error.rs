//! Errors surfaced at the pipeline boundary.
//!
//! Collaborator failures inside extraction and verification are absorbed by
//! the nodes themselves. Only caller mistakes and store/config problems
//! reach this type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::stores::StoreError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The classifier needs a run state or a record id.
    #[error("Root cause classification needs a run state or a record id")]
    MissingClassifierInput,

    #[error("No result store configured for record lookups")]
    ResultStoreNotConfigured,

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline not configured: {0}")]
    NotConfigured(String),
}
