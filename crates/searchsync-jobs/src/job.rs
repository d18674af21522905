//! The resumable job contract.

use std::sync::Arc;

use searchsync_indexing::{DocHandle, DocumentRef, IndexingError, SyncContext};
use searchsync_types::IndexMethod;
use tracing::warn;

use crate::error::JobError;
use crate::jobs::{ClearIndexJob, IndexJob, ReindexJob, RemoveRecordJob};
use crate::state::{JobPayload, JobState, StepReport};

/// A unit of work driven one step at a time by a runner or queue worker.
///
/// `setup` is called once per process before the first `process` and must be
/// idempotent: a job restored from [`JobState`] is set up again before it
/// resumes. Callers own a job exclusively and never step it concurrently.
pub trait Job: Send {
    fn id(&self) -> &str;

    /// Human-readable description for logs and the registry.
    fn title(&self) -> String;

    fn setup(&mut self) -> Result<(), JobError>;

    /// Run the next step. A step that fails leaves the job unchanged.
    fn process(&mut self) -> Result<StepReport, JobError>;

    fn is_complete(&self) -> bool;

    fn current_step(&self) -> usize;

    fn total_steps(&self) -> usize;

    /// Snapshot for persistence between steps.
    fn state(&self) -> JobState;
}

/// Rebuild a job from its persisted state.
pub fn restore_job(ctx: Arc<SyncContext>, state: &JobState) -> Result<Box<dyn Job>, JobError> {
    let job: Box<dyn Job> = match &state.payload {
        JobPayload::Index { .. } => Box::new(IndexJob::from_state(ctx, state)?),
        JobPayload::RemoveRecord { .. } => Box::new(RemoveRecordJob::from_state(ctx, state)?),
        JobPayload::Reindex { .. } => Box::new(ReindexJob::from_state(ctx, state)?),
        JobPayload::ClearIndex { .. } => Box::new(ClearIndexJob::from_state(ctx, state)?),
    };
    Ok(job)
}

/// Resolve references to the documents they name, in order.
///
/// Under [`IndexMethod::Add`] every reference must still resolve; a missing
/// record fails with `RecordNotFound`. Under [`IndexMethod::Delete`] a
/// missing record resolves to a stand-in carrying its identity, so removal
/// still reaches the backend.
pub(crate) fn resolve_refs(
    ctx: &Arc<SyncContext>,
    references: &[DocumentRef],
    method: IndexMethod,
) -> Result<Vec<DocHandle>, JobError> {
    references
        .iter()
        .map(|reference| {
            let handle = match method {
                IndexMethod::Add => ctx.resolve_ref(reference)?,
                IndexMethod::Delete => ctx.resolve_for_removal(reference)?,
            };
            Ok(handle)
        })
        .collect()
}

/// Resolve discovered dependents, skipping records deleted since discovery.
///
/// A vanished dependent has nothing left to refresh; its own removal is
/// responsible for the index.
pub(crate) fn resolve_dependents(
    ctx: &Arc<SyncContext>,
    references: &[DocumentRef],
) -> Result<Vec<DocHandle>, JobError> {
    let mut resolved = Vec::with_capacity(references.len());
    for reference in references {
        match ctx.resolve_ref(reference) {
            Ok(handle) => resolved.push(handle),
            Err(IndexingError::RecordNotFound { class, id }) => {
                warn!(class = %class, id, "Dependent record no longer exists, skipping");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(resolved)
}
