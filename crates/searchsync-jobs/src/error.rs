//! Error types for the jobs crate.

use searchsync_indexing::IndexingError;
use thiserror::Error;

/// Errors that can occur while running or queueing jobs.
#[derive(Debug, Error)]
pub enum JobError {
    /// Failure inside the indexing core
    #[error(transparent)]
    Indexing(#[from] IndexingError),

    /// A bounded loop did not converge within its attempt budget
    #[error("Index '{index}' still holds {remaining} documents after {attempted} attempts")]
    Exhausted {
        index: String,
        attempted: usize,
        remaining: u64,
    },

    /// Job queue storage failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Persisted job state could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No fetch creator applies to a class
    #[error("No fetcher available for class: {0}")]
    UnknownFetcher(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialization(err.to_string())
    }
}

impl JobError {
    /// Whether running the same step again could succeed.
    ///
    /// Configuration bugs, exhausted budgets and missing fetchers are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Indexing(e) => !e.is_config(),
            JobError::Queue(_) => true,
            JobError::Exhausted { .. }
            | JobError::Serialization(_)
            | JobError::UnknownFetcher(_)
            | JobError::JobNotFound(_) => false,
        }
    }
}
