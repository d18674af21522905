//! Add or remove an explicit list of documents, one chunk per step.

use std::sync::Arc;

use chrono::Utc;
use searchsync_indexing::{ChunkResult, DocHandle, DocumentRef, Indexer, SyncContext};
use searchsync_types::IndexMethod;
use tracing::debug;

use crate::error::JobError;
use crate::job::{resolve_refs, Job};
use crate::state::{JobHeader, JobPayload, JobState, StepReport};

/// Resumable batch add/remove over a list of documents.
///
/// Persists the references of the documents not yet processed. On resume
/// they are resolved again. An add fails if one of its records vanished in
/// between; a delete still removes such records by identity, so delete
/// references also carry a snapshot time and the document's routing.
pub struct IndexJob {
    ctx: Arc<SyncContext>,
    header: JobHeader,
    method: IndexMethod,
    process_dependencies: bool,
    pending: Vec<DocumentRef>,
    indexer: Option<Indexer>,
    complete: bool,
}

impl IndexJob {
    /// Job over live documents, chunked by the configured batch size.
    pub fn new(
        ctx: Arc<SyncContext>,
        documents: Vec<DocHandle>,
        method: IndexMethod,
    ) -> Result<Self, JobError> {
        let batch_size = ctx.settings().batch_size;
        let pending = match method {
            IndexMethod::Add => documents.iter().map(|d| d.to_ref()).collect(),
            IndexMethod::Delete => {
                let now = Utc::now();
                documents
                    .iter()
                    .map(|d| d.to_ref().with_snapshot_at(now).with_origin(d.as_ref()))
                    .collect()
            }
        };
        let indexer = Indexer::new(ctx.clone(), documents, method, batch_size)?;

        let mut header = JobHeader::new(batch_size);
        header.total_steps = indexer.chunk_count();
        Ok(Self {
            complete: indexer.is_complete(),
            ctx,
            header,
            method,
            process_dependencies: true,
            pending,
            indexer: Some(indexer),
        })
    }

    /// Override the batch size. Only meaningful before the first step.
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, JobError> {
        if let Some(indexer) = self.indexer.as_mut() {
            indexer.set_batch_size(batch_size)?;
            self.header.total_steps = self.header.current_step + indexer.chunk_count();
        }
        self.header.batch_size = batch_size;
        Ok(self)
    }

    pub fn with_process_dependencies(mut self, enabled: bool) -> Self {
        self.process_dependencies = enabled;
        self.indexer = self
            .indexer
            .take()
            .map(|i| i.with_process_dependencies(enabled));
        self
    }

    pub fn from_state(ctx: Arc<SyncContext>, state: &JobState) -> Result<Self, JobError> {
        let JobPayload::Index {
            method,
            process_dependencies,
            documents,
        } = &state.payload
        else {
            return Err(JobError::Serialization(format!(
                "expected an index payload, found '{}'",
                state.payload.kind()
            )));
        };
        Ok(Self {
            ctx,
            header: state.header.clone(),
            method: *method,
            process_dependencies: *process_dependencies,
            pending: documents.clone(),
            indexer: None,
            complete: state.complete,
        })
    }

    pub fn method(&self) -> IndexMethod {
        self.method
    }

    /// References of the documents not yet processed.
    pub fn pending(&self) -> &[DocumentRef] {
        &self.pending
    }

    fn ensure_indexer(&mut self) -> Result<&mut Indexer, JobError> {
        if let Some(indexer) = self.indexer.take() {
            return Ok(self.indexer.insert(indexer));
        }

        let handles = resolve_refs(&self.ctx, &self.pending, self.method)?;
        let indexer = Indexer::new(self.ctx.clone(), handles, self.method, self.header.batch_size)?
            .with_process_dependencies(self.process_dependencies);

        debug!(
            job = %self.header.id,
            documents = self.pending.len(),
            method = %self.method,
            "Restored index job"
        );
        self.header.total_steps = self.header.current_step + indexer.chunk_count();
        Ok(self.indexer.insert(indexer))
    }

    fn report(&self, counts: ChunkResult) -> StepReport {
        StepReport {
            step: self.header.current_step,
            total_steps: self.header.total_steps,
            counts,
            clear: None,
        }
    }
}

impl Job for IndexJob {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn title(&self) -> String {
        format!("Index documents ({})", self.method)
    }

    fn setup(&mut self) -> Result<(), JobError> {
        if !self.complete {
            self.ensure_indexer()?;
        }
        Ok(())
    }

    fn process(&mut self) -> Result<StepReport, JobError> {
        if self.complete {
            return Ok(self.report(ChunkResult::new()));
        }

        let indexer = self.ensure_indexer()?;
        let counts = indexer.tick()?;
        let remaining: usize = indexer.chunks().map(<[DocHandle]>::len).sum();
        let complete = indexer.is_complete();

        let consumed = self.pending.len().saturating_sub(remaining);
        self.pending.drain(..consumed);
        self.header.current_step += 1;
        self.header.total_steps = self.header.total_steps.max(self.header.current_step);
        self.complete = complete;
        Ok(self.report(counts))
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
            JobPayload::Index {
                method: self.method,
                process_dependencies: self.process_dependencies,
                documents: self.pending.clone(),
            },
            self.complete,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::restore_job;
    use crate::testing::fixture;
    use searchsync_indexing::{IndexingError, RecordData};

    #[test]
    fn test_steps_match_chunks() {
        let f = fixture();
        let mut job = IndexJob::new(f.ctx.clone(), f.pages(20), IndexMethod::Add).unwrap();
        job.setup().unwrap();
        assert_eq!(job.total_steps(), 4);

        for step in 1..=3 {
            let report = job.process().unwrap();
            assert_eq!(report.step, step);
            assert!(!job.is_complete());
        }
        assert_eq!(job.pending().len(), 2);

        let report = job.process().unwrap();
        assert_eq!(report.counts.added, 2);
        assert!(job.is_complete());
        assert!(job.pending().is_empty());
        assert_eq!(f.indexed(), 20);
    }

    #[test]
    fn test_resume_from_persisted_state() {
        let f = fixture();
        let mut job = IndexJob::new(f.ctx.clone(), f.pages(20), IndexMethod::Add).unwrap();
        job.process().unwrap();
        job.process().unwrap();

        let bytes = job.state().to_bytes().unwrap();
        let state = JobState::from_bytes(&bytes).unwrap();
        let mut resumed = restore_job(f.ctx.clone(), &state).unwrap();
        resumed.setup().unwrap();
        assert_eq!(resumed.current_step(), 2);
        assert_eq!(resumed.total_steps(), 4);

        while !resumed.is_complete() {
            resumed.process().unwrap();
        }
        assert_eq!(resumed.current_step(), 4);
        assert_eq!(f.indexed(), 20);
    }

    #[test]
    fn test_resume_fails_when_added_record_vanished() {
        let f = fixture();
        let mut job = IndexJob::new(f.ctx.clone(), f.pages(12), IndexMethod::Add).unwrap();
        job.process().unwrap();
        let state = job.state();

        f.store.delete("Page", 9);
        let mut resumed = IndexJob::from_state(f.ctx.clone(), &state).unwrap();
        let err = resumed.process().unwrap_err();
        assert!(matches!(
            err,
            JobError::Indexing(IndexingError::RecordNotFound { ref class, id: 9 }) if class == "Page"
        ));
        assert!(!resumed.is_complete());
        assert_eq!(resumed.pending().len(), 6);
        assert_eq!(f.indexed(), 6);
    }

    #[test]
    fn test_resumed_delete_removes_vanished_records() {
        let f = fixture();
        let docs = f.pages(8);
        let mut add = IndexJob::new(f.ctx.clone(), docs.clone(), IndexMethod::Add).unwrap();
        while !add.is_complete() {
            add.process().unwrap();
        }

        let delete = IndexJob::new(f.ctx.clone(), docs[..2].to_vec(), IndexMethod::Delete).unwrap();
        assert!(delete.pending().iter().all(|r| r.snapshot_at.is_some()));
        assert_eq!(delete.pending()[0].source_class.as_deref(), Some("Page"));
        let state = JobState::from_bytes(&delete.state().to_bytes().unwrap()).unwrap();
        f.store.delete("Page", 1);
        f.store.delete("Page", 2);

        let mut resumed = restore_job(f.ctx.clone(), &state).unwrap();
        resumed.setup().unwrap();
        let report = resumed.process().unwrap();
        assert_eq!(report.counts.removed, 2);
        assert_eq!((report.step, report.total_steps), (1, 1));
        assert!(resumed.is_complete());
        assert_eq!(f.indexed(), 6);
        assert!(f.backend.document("main", "page_1").is_none());
    }

    #[test]
    fn test_delete_without_snapshot_removes_by_identity() {
        let f = fixture();
        f.store.write(RecordData::new("Tag", 4).with_field("Title", "Old"));
        let mut add = IndexJob::new(f.ctx.clone(), vec![f.doc("Tag", 4)], IndexMethod::Add).unwrap();
        add.process().unwrap();
        assert_eq!(f.indexed(), 1);

        // A reference with no snapshot and no live record left behind.
        let mut state = IndexJob::new(f.ctx.clone(), Vec::new(), IndexMethod::Delete)
            .unwrap()
            .state();
        state.complete = false;
        state.payload = JobPayload::Index {
            method: IndexMethod::Delete,
            process_dependencies: false,
            documents: vec![DocumentRef::new("Tag", 4)],
        };
        f.store.delete("Tag", 4);

        let mut resumed = IndexJob::from_state(f.ctx.clone(), &state).unwrap();
        let report = resumed.process().unwrap();
        assert_eq!(report.counts.removed, 1);
        assert!(resumed.is_complete());
        assert_eq!(f.indexed(), 0);
    }

    #[test]
    fn test_step_never_exceeds_total() {
        let f = fixture();
        let mut state = IndexJob::new(f.ctx.clone(), Vec::new(), IndexMethod::Add)
            .unwrap()
            .state();
        state.complete = false;

        let mut resumed = IndexJob::from_state(f.ctx.clone(), &state).unwrap();
        let report = resumed.process().unwrap();
        assert!(resumed.is_complete());
        assert_eq!(report.step, 1);
        assert_eq!(report.total_steps, 1);
    }

    #[test]
    fn test_failed_step_is_replayed() {
        let f = fixture();
        let mut job = IndexJob::new(f.ctx.clone(), f.pages(8), IndexMethod::Add).unwrap();
        f.backend.fail_next(1);

        assert!(job.process().is_err());
        assert_eq!(job.current_step(), 0);
        assert_eq!(job.pending().len(), 8);

        job.process().unwrap();
        job.process().unwrap();
        assert!(job.is_complete());
        assert_eq!(f.indexed(), 8);
    }

    #[test]
    fn test_delete_job_removes_documents() {
        let f = fixture();
        let docs = f.pages(7);
        let mut add = IndexJob::new(f.ctx.clone(), docs.clone(), IndexMethod::Add).unwrap();
        while !add.is_complete() {
            add.process().unwrap();
        }

        let mut delete = IndexJob::new(f.ctx.clone(), docs[..3].to_vec(), IndexMethod::Delete)
            .unwrap()
            .with_process_dependencies(false);
        let report = delete.process().unwrap();
        assert_eq!(report.counts.removed, 3);
        assert!(delete.is_complete());
        assert_eq!(f.indexed(), 4);
        assert!(f.backend.document("main", &docs[0].identifier()).is_none());
    }

    #[test]
    fn test_tag_change_reindexes_dependent_pages() {
        let f = fixture();
        f.store.write(RecordData::new("Tag", 1).with_field("Title", "Rust"));
        f.store.write(
            RecordData::new("Page", 1)
                .with_field("Title", "Intro")
                .with_many("Tags", &[1]),
        );

        let mut job =
            IndexJob::new(f.ctx.clone(), vec![f.doc("Tag", 1)], IndexMethod::Add).unwrap();
        let report = job.process().unwrap();
        assert_eq!(report.counts.dependents, 1);

        let page = f.backend.document("main", "page_1").unwrap();
        assert_eq!(page["tag_titles"], serde_json::json!(["Rust"]));
    }

    #[test]
    fn test_empty_job_is_complete() {
        let f = fixture();
        let mut job = IndexJob::new(f.ctx.clone(), Vec::new(), IndexMethod::Add).unwrap();
        assert!(job.is_complete());
        assert_eq!(job.total_steps(), 0);
        let report = job.process().unwrap();
        assert_eq!(report.counts.total(), 0);
    }

    #[test]
    fn test_with_batch_size() {
        let f = fixture();
        let job = IndexJob::new(f.ctx.clone(), f.pages(20), IndexMethod::Add)
            .unwrap()
            .with_batch_size(10)
            .unwrap();
        assert_eq!(job.total_steps(), 2);
        assert_eq!(job.state().header.batch_size, 10);
    }
}
