//! Sync-or-queued dispatch of indexing work.

use std::sync::Arc;

use searchsync_indexing::{DocHandle, SyncContext};
use searchsync_types::IndexMethod;
use tracing::info;

use crate::error::JobError;
use crate::job::Job;
use crate::jobs::{ClearIndexJob, IndexJob, ReindexJob, RemoveRecordJob};
use crate::queue::JobQueue;
use crate::runner::{RunSummary, SyncRunner};

/// How a job was dispatched.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Run inline to completion
    Ran(RunSummary),
    /// Handed to the queue under this id
    Queued(String),
}

impl Dispatch {
    pub fn is_queued(&self) -> bool {
        matches!(self, Dispatch::Queued(_))
    }
}

/// Entry point for application code that wants documents indexed.
///
/// Jobs run inline when `use_sync_jobs` is set or no queue is attached;
/// otherwise their initial state is enqueued for a worker.
pub struct BatchProcessor {
    ctx: Arc<SyncContext>,
    queue: Option<Arc<dyn JobQueue>>,
    runner: SyncRunner,
}

impl BatchProcessor {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            queue: None,
            runner: SyncRunner::new(),
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_runner(mut self, runner: SyncRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn runs_inline(&self) -> bool {
        self.ctx.settings().use_sync_jobs || self.queue.is_none()
    }

    /// Run or enqueue any job.
    pub fn dispatch(&self, mut job: Box<dyn Job>) -> Result<Dispatch, JobError> {
        match &self.queue {
            Some(queue) if !self.ctx.settings().use_sync_jobs => {
                let id = queue.enqueue(job.state())?;
                info!(job = %id, title = %job.title(), "Queued job");
                Ok(Dispatch::Queued(id))
            }
            _ => Ok(Dispatch::Ran(self.runner.run(job.as_mut())?)),
        }
    }

    /// Add documents, re-evaluating their indexability.
    pub fn add_documents(&self, documents: Vec<DocHandle>) -> Result<Dispatch, JobError> {
        self.index(documents, IndexMethod::Add)
    }

    /// Remove documents unconditionally.
    pub fn remove_documents(&self, documents: Vec<DocHandle>) -> Result<Dispatch, JobError> {
        self.index(documents, IndexMethod::Delete)
    }

    fn index(&self, documents: Vec<DocHandle>, method: IndexMethod) -> Result<Dispatch, JobError> {
        let job = IndexJob::new(self.ctx.clone(), documents, method)?;
        self.dispatch(Box::new(job))
    }

    /// Remove a record that is about to be deleted, then refresh its dependents.
    pub fn remove_record(&self, document: DocHandle) -> Result<Dispatch, JobError> {
        let job = RemoveRecordJob::new(self.ctx.clone(), document)?;
        self.dispatch(Box::new(job))
    }

    pub fn reindex(&self) -> Result<Dispatch, JobError> {
        self.dispatch(Box::new(ReindexJob::new(self.ctx.clone())))
    }

    pub fn clear_index(&self, index: &str) -> Result<Dispatch, JobError> {
        self.dispatch(Box::new(ClearIndexJob::new(self.ctx.clone(), index)))
    }
}
