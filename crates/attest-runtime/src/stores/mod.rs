//! Read-only storage collaborators: evidence search and persisted results.

pub mod evidence;
pub mod results;

pub use evidence::{EvidenceChunk, EvidenceError, EvidenceStore, InMemoryEvidenceStore, SearchHit};
pub use results::{InMemoryResultStore, ResultStore, StoreError};

#[cfg(feature = "sqlite")]
pub use results::SqliteResultStore;
