//! Bounded removal of every document in one index.

use std::sync::Arc;

use searchsync_indexing::{BackendError, ChunkResult, IndexService, IndexingError, SyncContext};
use searchsync_types::WireDocument;
use serde_json::Value;
use tracing::info;

use crate::error::JobError;
use crate::job::Job;
use crate::state::{ClearReport, JobHeader, JobPayload, JobState, StepReport};

/// Removes one batch of documents per step until the index is empty.
///
/// Without an explicit budget the job allows `ceil(count / batch) + 1`
/// attempts, counted when it is first set up. A step that would exceed the
/// budget fails with [`JobError::Exhausted`].
pub struct ClearIndexJob {
    ctx: Arc<SyncContext>,
    service: IndexService,
    header: JobHeader,
    index: String,
    max_attempts: Option<usize>,
    attempts_made: usize,
    complete: bool,
}

impl ClearIndexJob {
    pub fn new(ctx: Arc<SyncContext>, index: impl Into<String>) -> Self {
        Self {
            service: IndexService::new(ctx.clone()),
            header: JobHeader::new(ctx.settings().batch_size),
            ctx,
            index: index.into(),
            max_attempts: None,
            attempts_made: 0,
            complete: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self.header.total_steps = max_attempts;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, JobError> {
        if batch_size == 0 {
            return Err(IndexingError::InvalidBatchSize(batch_size).into());
        }
        self.header.batch_size = batch_size;
        Ok(self)
    }

    pub fn from_state(ctx: Arc<SyncContext>, state: &JobState) -> Result<Self, JobError> {
        let JobPayload::ClearIndex {
            index,
            max_attempts,
            attempts_made,
        } = &state.payload
        else {
            return Err(JobError::Serialization(format!(
                "expected a clear_index payload, found '{}'",
                state.payload.kind()
            )));
        };
        Ok(Self {
            service: IndexService::new(ctx.clone()),
            ctx,
            header: state.header.clone(),
            index: index.clone(),
            max_attempts: *max_attempts,
            attempts_made: *attempts_made,
            complete: state.complete,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    fn identifiers(&self, page: &[WireDocument]) -> Result<Vec<String>, JobError> {
        let id_field = &self.ctx.settings().id_field;
        page.iter()
            .map(|doc| match doc.get(id_field) {
                Some(Value::String(id)) => Ok(id.clone()),
                Some(Value::Null) | None => Err(IndexingError::from(BackendError::MissingField {
                    index: self.index.clone(),
                    field: id_field.clone(),
                })
                .into()),
                Some(other) => Ok(other.to_string()),
            })
            .collect()
    }
}

impl Job for ClearIndexJob {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn title(&self) -> String {
        format!("Clear index '{}'", self.index)
    }

    fn setup(&mut self) -> Result<(), JobError> {
        if self.max_attempts.is_none() {
            let count = self.service.count(&self.index)? as usize;
            let budget = count.div_ceil(self.header.batch_size) + 1;
            self.max_attempts = Some(budget);
            self.header.total_steps = budget;
        }
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

        let before = self.service.count(&self.index)?;
        if before > 0 {
            let budget = self.max_attempts.unwrap_or(0);
            if self.attempts_made >= budget {
                return Err(JobError::Exhausted {
                    index: self.index.clone(),
                    attempted: self.attempts_made,
                    remaining: before,
                });
            }
        }

        let removed = if before == 0 {
            0
        } else {
            let page = self.service.list(&self.index, 0, self.header.batch_size)?;
            let ids = self.identifiers(&page)?;
            self.attempts_made += 1;
            self.service.remove_ids(&self.index, &ids)?
        };
        let after = self.service.count(&self.index)?;

        self.header.current_step += 1;
        self.complete = after == 0;
        info!(
            index = %self.index,
            step = self.header.current_step,
            before,
            removed,
            after,
            "Cleared batch"
        );
        Ok(StepReport {
            step: self.header.current_step,
            total_steps: self.header.total_steps,
            counts: ChunkResult::new(),
            clear: Some(ClearReport {
                before,
                removed,
                after,
            }),
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
            JobPayload::ClearIndex {
                index: self.index.clone(),
                max_attempts: self.max_attempts,
                attempts_made: self.attempts_made,
            },
            self.complete,
        )
    }
}
