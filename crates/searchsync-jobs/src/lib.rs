//! # searchsync-jobs
//!
//! Resumable indexing jobs for searchsync.
//!
//! Every job exposes `setup` / `process` / `is_complete` and persists its
//! progress as a [`JobState`], so a long run can be stepped inline by the
//! [`SyncRunner`] or one step at a time by a [`QueueWorker`] across
//! process restarts.
//!
//! ## Jobs
//!
//! - [`IndexJob`]: add or remove an explicit list of documents
//! - [`RemoveRecordJob`]: delete a record's document, refresh its dependents
//! - [`ReindexJob`]: resumable sweep over every searchable class
//! - [`ClearIndexJob`]: bounded removal of every document in an index
//!
//! [`BatchProcessor`] decides between inline and queued execution.

pub mod error;
pub mod job;
pub mod jobs;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod state;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::JobError;
pub use job::{restore_job, Job};
pub use jobs::{
    ClearIndexJob, IndexJob, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback,
    ReindexJob, ReindexProgress, RemoveRecordJob,
};
pub use processor::{BatchProcessor, Dispatch};
pub use queue::{JobQueue, MemoryJobQueue, QueueStatus, QueuedJob};
pub use registry::{JobRegistry, JobResult, JobStatus};
pub use runner::{RunSummary, SyncRunner};
pub use state::{ClearReport, JobHeader, JobPayload, JobState, StepReport, JOB_STATE_VERSION};
pub use worker::{QueueWorker, WorkerConfig, WorkerStep};
