//! Error types for the indexing core.

use searchsync_types::ConfigError;
use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur while resolving, routing or indexing documents.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration or field-resolution bug; never retried
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote index call failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The source record is gone and no snapshot could stand in for it
    #[error("Record not found: {class} #{id}")]
    RecordNotFound { class: String, id: u64 },

    /// Batch size must be positive
    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    /// A lifecycle hook failed
    #[error("Hook error: {0}")]
    Hook(String),

    /// Record store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Dependency fan-out recursed past the configured depth
    #[error("Dependency recursion exceeded depth {limit} while processing {identifier}")]
    DependencyDepthExceeded { limit: usize, identifier: String },

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

impl IndexingError {
    /// Whether this error signals a configuration bug rather than a runtime failure.
    pub fn is_config(&self) -> bool {
        matches!(self, IndexingError::Config(_))
    }
}
