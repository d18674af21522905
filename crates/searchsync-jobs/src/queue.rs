//! Job queue contract and an in-memory queue with optional file persistence.
//!
//! The queue stores [`JobState`] between steps. A worker takes the oldest
//! queued job, runs one step and writes the new state back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::JobError;
use crate::state::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for its next step
    Queued,
    Completed,
    Failed,
}

/// A job as held by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub state: JobState,
    pub status: QueueStatus,
    /// Failed attempts at the current step
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(state: JobState) -> Self {
        let status = if state.complete {
            QueueStatus::Completed
        } else {
            QueueStatus::Queued
        };
        Self {
            state,
            status,
            attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        self.state.id()
    }
}

/// Storage for queued jobs.
pub trait JobQueue: Send + Sync {
    /// Add a job; returns its id.
    fn enqueue(&self, state: JobState) -> Result<String, JobError>;

    /// Oldest job still queued.
    fn next_ready(&self) -> Result<Option<QueuedJob>, JobError>;

    /// Replace a job's entry.
    fn update(&self, job: QueuedJob) -> Result<(), JobError>;

    fn get(&self, id: &str) -> Result<Option<QueuedJob>, JobError>;

    /// Every job in enqueue order.
    fn list(&self) -> Result<Vec<QueuedJob>, JobError>;
}

/// FIFO queue held in memory, optionally mirrored to a JSON file after
/// every change.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<IndexMap<String, QueuedJob>>,
    path: Option<PathBuf>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue persisted at `path`, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let path = path.as_ref().to_path_buf();
        let mut jobs = IndexMap::new();
        if path.exists() {
            let bytes = fs::read(&path).map_err(|e| JobError::Queue(e.to_string()))?;
            let stored: Vec<QueuedJob> = serde_json::from_slice(&bytes)?;
            for job in stored {
                jobs.insert(job.id().to_string(), job);
            }
            debug!(path = %path.display(), jobs = jobs.len(), "Loaded job queue");
        }
        Ok(Self {
            jobs: Mutex::new(jobs),
            path: Some(path),
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    fn persist(&self, jobs: &IndexMap<String, QueuedJob>) -> Result<(), JobError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries: Vec<&QueuedJob> = jobs.values().collect();
        let bytes = serde_json::to_vec_pretty(&entries)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| JobError::Queue(e.to_string()))?;
        fs::rename(&tmp, path).map_err(|e| JobError::Queue(e.to_string()))?;
        Ok(())
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, state: JobState) -> Result<String, JobError> {
        let mut jobs = self.jobs.lock();
        let id = state.id().to_string();
        if jobs.contains_key(&id) {
            return Err(JobError::Queue(format!("job {} is already queued", id)));
        }
        jobs.insert(id.clone(), QueuedJob::new(state));
        self.persist(&jobs)?;
        debug!(job = %id, "Enqueued job");
        Ok(id)
    }

    fn next_ready(&self) -> Result<Option<QueuedJob>, JobError> {
        Ok(self
            .jobs
            .lock()
            .values()
            .find(|j| j.status == QueueStatus::Queued)
            .cloned())
    }

    fn update(&self, mut job: QueuedJob) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock();
        let Some(entry) = jobs.get_mut(job.id()) else {
            return Err(JobError::JobNotFound(job.id().to_string()));
        };
        job.updated_at = Utc::now();
        *entry = job;
        self.persist(&jobs)
    }

    fn get(&self, id: &str) -> Result<Option<QueuedJob>, JobError> {
        Ok(self.jobs.lock().get(id).cloned())
    }

    fn list(&self) -> Result<Vec<QueuedJob>, JobError> {
        Ok(self.jobs.lock().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{JobHeader, JobPayload};
    use tempfile::TempDir;

    fn clear_state(index: &str) -> JobState {
        JobState::new(
            JobHeader::new(10),
            JobPayload::ClearIndex {
                index: index.to_string(),
                max_attempts: None,
                attempts_made: 0,
            },
            false,
        )
    }

    #[test]
    fn test_fifo_order() {
        let queue = MemoryJobQueue::new();
        let first = queue.enqueue(clear_state("a")).unwrap();
        let second = queue.enqueue(clear_state("b")).unwrap();

        assert_eq!(queue.next_ready().unwrap().unwrap().id(), first);

        let mut job = queue.get(&first).unwrap().unwrap();
        job.status = QueueStatus::Completed;
        queue.update(job).unwrap();
        assert_eq!(queue.next_ready().unwrap().unwrap().id(), second);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let queue = MemoryJobQueue::new();
        let state = clear_state("a");
        queue.enqueue(state.clone()).unwrap();
        assert!(matches!(queue.enqueue(state), Err(JobError::Queue(_))));
    }

    #[test]
    fn test_update_unknown_job() {
        let queue = MemoryJobQueue::new();
        let job = QueuedJob::new(clear_state("a"));
        assert!(matches!(queue.update(job), Err(JobError::JobNotFound(_))));
    }

    #[test]
    fn test_completed_state_is_not_ready() {
        let queue = MemoryJobQueue::new();
        let mut state = clear_state("a");
        state.complete = true;
        queue.enqueue(state).unwrap();
        assert!(queue.next_ready().unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.json");

        let id = {
            let queue = MemoryJobQueue::open(&path).unwrap();
            let id = queue.enqueue(clear_state("main")).unwrap();
            let mut job = queue.get(&id).unwrap().unwrap();
            job.attempts = 2;
            job.last_error = Some("timeout".to_string());
            queue.update(job).unwrap();
            id
        };

        let reopened = MemoryJobQueue::open(&path).unwrap();
        let job = reopened.get(&id).unwrap().unwrap();
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("timeout"));
        assert_eq!(job.status, QueueStatus::Queued);
        assert_eq!(job.state.payload.kind(), "clear_index");
    }
}
