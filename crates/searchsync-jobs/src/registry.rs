//! Job registry for tracking job progress and execution status.
//!
//! The `JobRegistry` is a thread-safe view of every job a runner or worker
//! has touched: steps completed, attempts, and the last outcome.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Outcome of the last step of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    /// The step succeeded
    Success,
    /// The step failed and will be attempted again
    Retrying(String),
    /// The job failed for good
    Failed(String),
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub title: String,
    /// Payload kind, e.g. `reindex`
    pub kind: String,
    pub current_step: usize,
    pub total_steps: usize,
    /// Failed attempts at the current step
    pub attempts: u32,
    /// When the last step started
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the last step in milliseconds
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// Total failed steps, retried or not
    pub error_count: u64,
    pub is_running: bool,
    pub is_complete: bool,
}

impl JobStatus {
    pub fn new(job_id: String, title: String, kind: String) -> Self {
        Self {
            job_id,
            title,
            kind,
            current_step: 0,
            total_steps: 0,
            attempts: 0,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            error_count: 0,
            is_running: false,
            is_complete: false,
        }
    }

    /// Whether the job ended in failure.
    pub fn is_failed(&self) -> bool {
        matches!(self.last_result, Some(JobResult::Failed(_)))
    }
}

/// Registry of job statuses, in registration order.
///
/// # Example
///
/// ```
/// use searchsync_jobs::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("01J0", "Reindex 2 classes", "reindex");
///
/// registry.record_start("01J0");
/// assert!(registry.is_running("01J0"));
///
/// registry.record_step("01J0", 1, 5, JobResult::Success, 120);
/// assert!(!registry.is_running("01J0"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<IndexMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. An existing entry with the same id is kept.
    pub fn register(&self, job_id: &str, title: &str, kind: &str) {
        self.jobs
            .write()
            .entry(job_id.to_string())
            .or_insert_with(|| {
                JobStatus::new(job_id.to_string(), title.to_string(), kind.to_string())
            });
    }

    /// Record that a step has started.
    pub fn record_start(&self, job_id: &str) {
        if let Some(status) = self.jobs.write().get_mut(job_id) {
            status.is_running = true;
            status.last_run = Some(Utc::now());
        }
    }

    /// Record the outcome of a step.
    ///
    /// Success resets the attempt counter; a retry increments it.
    pub fn record_step(
        &self,
        job_id: &str,
        current_step: usize,
        total_steps: usize,
        result: JobResult,
        duration_ms: u64,
    ) {
        if let Some(status) = self.jobs.write().get_mut(job_id) {
            status.is_running = false;
            status.current_step = current_step;
            status.total_steps = total_steps;
            status.last_duration_ms = Some(duration_ms);
            match &result {
                JobResult::Success => status.attempts = 0,
                JobResult::Retrying(_) | JobResult::Failed(_) => {
                    status.attempts += 1;
                    status.error_count += 1;
                }
            }
            status.last_result = Some(result);
        }
    }

    /// Record that the job finished all its steps.
    pub fn record_complete(&self, job_id: &str) {
        if let Some(status) = self.jobs.write().get_mut(job_id) {
            status.is_running = false;
            status.is_complete = true;
        }
    }

    /// Returns `None` if the job is not registered.
    pub fn get_status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.read().get(job_id).cloned()
    }

    pub fn get_all_status(&self) -> Vec<JobStatus> {
        self.jobs.read().values().cloned().collect()
    }

    /// Returns `false` if the job is not registered.
    pub fn is_running(&self, job_id: &str) -> bool {
        self.jobs
            .read()
            .get(job_id)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn is_registered(&self, job_id: &str) -> bool {
        self.jobs.read().contains_key(job_id)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }
}
