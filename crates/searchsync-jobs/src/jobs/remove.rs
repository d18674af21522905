//! Delete one record's document, then refresh the documents embedding it.

use std::sync::Arc;

use chrono::Utc;
use searchsync_indexing::{ChunkResult, DocHandle, DocumentRef, Indexer, SyncContext};
use searchsync_types::IndexMethod;
use tracing::debug;

use crate::error::JobError;
use crate::job::{resolve_dependents, Job};
use crate::state::{JobHeader, JobPayload, JobState, StepReport};

/// Removal of a record that may already be gone from the store.
///
/// The document is resolved through a snapshot taken when the job was
/// created. If neither the record nor a snapshot survives, it is removed by
/// identity. Step one removes it; each following step re-adds one batch of
/// the documents that depended on it.
pub struct RemoveRecordJob {
    ctx: Arc<SyncContext>,
    header: JobHeader,
    document: DocumentRef,
    handle: Option<DocHandle>,
    dependents: Vec<DocumentRef>,
    dependents_resolved: bool,
    removed: bool,
    complete: bool,
}

fn dependents_of(document: &DocHandle) -> Result<Vec<DocumentRef>, JobError> {
    let Some(tracker) = document.as_dependency_tracker() else {
        return Ok(Vec::new());
    };
    let own = document.identifier();
    Ok(tracker
        .dependent_documents()?
        .into_iter()
        .filter(|d| d.identifier() != own)
        .map(|d| d.to_ref())
        .collect())
}

impl RemoveRecordJob {
    /// Job for a record that still exists. Dependents are captured now,
    /// while its relations can still be followed.
    pub fn new(ctx: Arc<SyncContext>, document: DocHandle) -> Result<Self, JobError> {
        let reference = document
            .to_ref()
            .with_snapshot_at(Utc::now())
            .with_origin(document.as_ref());
        let dependents = dependents_of(&document)?;
        let mut job = Self {
            header: JobHeader::new(ctx.settings().batch_size),
            ctx,
            document: reference,
            handle: Some(document),
            dependents,
            dependents_resolved: true,
            removed: false,
            complete: false,
        };
        job.plan();
        Ok(job)
    }

    /// Job for a reference only. Dependents are computed at setup from
    /// whatever the reference resolves to.
    pub fn from_ref(ctx: Arc<SyncContext>, reference: DocumentRef) -> Self {
        Self {
            header: JobHeader::new(ctx.settings().batch_size),
            ctx,
            document: reference,
            handle: None,
            dependents: Vec::new(),
            dependents_resolved: false,
            removed: false,
            complete: false,
        }
    }

    pub fn from_state(ctx: Arc<SyncContext>, state: &JobState) -> Result<Self, JobError> {
        let JobPayload::RemoveRecord {
            document,
            dependents,
            dependents_resolved,
            removed,
        } = &state.payload
        else {
            return Err(JobError::Serialization(format!(
                "expected a remove_record payload, found '{}'",
                state.payload.kind()
            )));
        };
        Ok(Self {
            ctx,
            header: state.header.clone(),
            document: document.clone(),
            handle: None,
            dependents: dependents.clone(),
            dependents_resolved: *dependents_resolved,
            removed: *removed,
            complete: state.complete,
        })
    }

    /// Dependents not yet re-added.
    pub fn dependents(&self) -> &[DocumentRef] {
        &self.dependents
    }

    fn plan(&mut self) {
        let remove_step = usize::from(!self.removed);
        self.header.total_steps = self.header.current_step
            + remove_step
            + self.dependents.len().div_ceil(self.header.batch_size);
    }

    fn resolve_document(&mut self) -> Result<DocHandle, JobError> {
        if let Some(handle) = &self.handle {
            return Ok(handle.clone());
        }
        let handle = self.ctx.resolve_for_removal(&self.document)?;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    fn remove_step(&mut self) -> Result<ChunkResult, JobError> {
        let document = self.resolve_document()?;
        let mut indexer = Indexer::new(
            self.ctx.clone(),
            vec![document],
            IndexMethod::Delete,
            self.header.batch_size,
        )?
        .with_process_dependencies(false);
        Ok(indexer.drain()?)
    }

    fn dependents_step(&mut self) -> Result<ChunkResult, JobError> {
        let take = self.header.batch_size.min(self.dependents.len());
        let batch = self.dependents[..take].to_vec();
        let handles = resolve_dependents(&self.ctx, &batch)?;
        let mut indexer = Indexer::new(
            self.ctx.clone(),
            handles,
            IndexMethod::Add,
            self.header.batch_size,
        )?;
        let mut counts = indexer.drain()?;
        counts.dependents += take;
        self.dependents.drain(..take);
        Ok(counts)
    }
}

impl Job for RemoveRecordJob {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn title(&self) -> String {
        format!("Remove {} #{}", self.document.base_class, self.document.id)
    }

    fn setup(&mut self) -> Result<(), JobError> {
        if self.dependents_resolved {
            return Ok(());
        }
        let document = self.resolve_document()?;
        self.dependents = dependents_of(&document)?;
        self.dependents_resolved = true;
        self.plan();
        debug!(
            job = %self.header.id,
            dependents = self.dependents.len(),
            "Computed dependents of removed record"
        );
        Ok(())
    }

    fn process(&mut self) -> Result<StepReport, JobError> {
        if self.complete {
            return Ok(StepReport {
                step: self.header.current_step,
                total_steps: self.header.total_steps,
                ..StepReport::default()
            });
        }

        self.setup()?;
        let counts = if self.removed {
            self.dependents_step()?
        } else {
            let counts = self.remove_step()?;
            self.removed = true;
            counts
        };
        self.header.current_step += 1;
        self.header.total_steps = self.header.total_steps.max(self.header.current_step);
        self.complete = self.dependents.is_empty();
        Ok(StepReport {
            step: self.header.current_step,
            total_steps: self.header.total_steps,
            counts,
            clear: None,
        })
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn current_step(&self) -> usize {
        self.header.current_step
    }

    fn total_steps(&self) -> usize {
        self.header.total_steps
    }

    fn state(&self) -> JobState {
        JobState::new(
            self.header.clone(),
            JobPayload::RemoveRecord {
                document: self.document.clone(),
                dependents: self.dependents.clone(),
                dependents_resolved: self.dependents_resolved,
                removed: self.removed,
            },
            self.complete,
        )
    }
}
