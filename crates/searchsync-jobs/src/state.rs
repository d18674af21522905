//! Persisted job state.
//!
//! Everything a job needs to resume in another process is captured in a
//! [`JobState`]: the common step counters plus a kind-specific payload.
//! The layout is versioned JSON.

use std::fmt;

use chrono::{DateTime, Utc};
use searchsync_indexing::{ChunkResult, DocumentRef};
use searchsync_types::IndexMethod;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::JobError;

/// Current version of the persisted layout.
pub const JOB_STATE_VERSION: u32 = 1;

fn default_version() -> u32 {
    JOB_STATE_VERSION
}

/// Kind-specific part of a job's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Add or remove a list of documents
    Index {
        method: IndexMethod,
        process_dependencies: bool,
        /// Documents not yet processed, in order
        documents: Vec<DocumentRef>,
    },
    /// Delete one record's document, then re-add its dependents
    RemoveRecord {
        document: DocumentRef,
        dependents: Vec<DocumentRef>,
        /// Whether the dependents were computed (they are captured once)
        #[serde(default)]
        dependents_resolved: bool,
        /// Whether the delete step has run
        #[serde(default)]
        removed: bool,
    },
    /// Full sweep over every searchable base class
    Reindex {
        classes: Vec<String>,
        /// Class currently being swept
        fetcher_index: usize,
        /// Next page offset within that class
        fetch_offset: usize,
    },
    /// Remove every document from one index, batch by batch
    ClearIndex {
        index: String,
        /// Attempt budget; computed from the document count when unset
        #[serde(default)]
        max_attempts: Option<usize>,
        #[serde(default)]
        attempts_made: usize,
    },
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::Index { .. } => "index",
            JobPayload::RemoveRecord { .. } => "remove_record",
            JobPayload::Reindex { .. } => "reindex",
            JobPayload::ClearIndex { .. } => "clear_index",
        }
    }
}

/// Common step counters of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHeader {
    pub id: String,
    pub batch_size: usize,
    pub current_step: usize,
    pub total_steps: usize,
    pub created_at: DateTime<Utc>,
}

impl JobHeader {
    /// Fresh header with a new ULID.
    pub fn new(batch_size: usize) -> Self {
        Self {
            id: Ulid::new().to_string(),
            batch_size,
            current_step: 0,
            total_steps: 0,
            created_at: Utc::now(),
        }
    }
}

/// Serializable snapshot of a job between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub header: JobHeader,
    pub payload: JobPayload,
    pub complete: bool,
}

impl JobState {
    pub fn new(header: JobHeader, payload: JobPayload, complete: bool) -> Self {
        Self {
            version: JOB_STATE_VERSION,
            header,
            payload,
            complete,
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, JobError> {
        serde_json::to_vec(self).map_err(JobError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, JobError> {
        let state: JobState = serde_json::from_slice(bytes)?;
        if state.version > JOB_STATE_VERSION {
            return Err(JobError::Serialization(format!(
                "job state version {} is newer than supported version {}",
                state.version, JOB_STATE_VERSION
            )));
        }
        Ok(state)
    }
}

/// Progress of one clear-index step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearReport {
    pub before: u64,
    pub removed: usize,
    pub after: u64,
}

/// What one `process` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// 1-based step number just completed
    pub step: usize,
    pub total_steps: usize,
    pub counts: ChunkResult,
    pub clear: Option<ClearReport>,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {}/{}: ", self.step, self.total_steps)?;
        match &self.clear {
            Some(clear) => write!(
                f,
                "{} documents before, {} removed, {} after",
                clear.before, clear.removed, clear.after
            ),
            None => write!(
                f,
                "{} added, {} removed, {} skipped, {} dependents",
                self.counts.added, self.counts.removed, self.counts.skipped, self.counts.dependents
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reindex_state() -> JobState {
        let mut header = JobHeader::new(50);
        header.current_step = 3;
        header.total_steps = 9;
        JobState::new(
            header,
            JobPayload::Reindex {
                classes: vec!["Page".into(), "File".into()],
                fetcher_index: 1,
                fetch_offset: 100,
            },
            false,
        )
    }

    #[test]
    fn test_state_bytes_round_trip() {
        let state = reindex_state();
        let bytes = state.to_bytes().unwrap();
        let decoded = JobState::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_payload_json_layout() {
        let json = serde_json::to_value(reindex_state()).unwrap();
        assert_eq!(json["payload"]["kind"], "reindex");
        assert_eq!(json["payload"]["fetch_offset"], 100);
        assert_eq!(json["header"]["current_step"], 3);
        assert_eq!(json["version"], JOB_STATE_VERSION);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut state = reindex_state();
        state.version = JOB_STATE_VERSION + 1;
        let bytes = serde_json::to_vec(&state).unwrap();
        assert!(matches!(
            JobState::from_bytes(&bytes),
            Err(JobError::Serialization(_))
        ));
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobHeader::new(10).id, JobHeader::new(10).id);
    }

    #[test]
    fn test_step_report_display() {
        let report = StepReport {
            step: 1,
            total_steps: 4,
            clear: Some(ClearReport {
                before: 20,
                removed: 6,
                after: 14,
            }),
            ..StepReport::default()
        };
        assert_eq!(
            report.to_string(),
            "Step 1/4: 20 documents before, 6 removed, 14 after"
        );
    }
}
