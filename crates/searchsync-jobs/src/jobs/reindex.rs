//! Full reindex sweep over every searchable base class.
//!
//! The sweep persists a `(class index, page offset)` cursor so that it can
//! resume mid-class after an interruption. Each step fetches one page and
//! re-adds it; documents that are no longer indexable are routed to remove
//! by the indexer. Dependents are not followed: the sweep reaches them on
//! its own.

use std::sync::Arc;

use searchsync_indexing::{
    ChunkResult, DocumentFetcher, IndexService, Indexer, IndexingError, SyncContext,
};
use searchsync_types::IndexMethod;
use tracing::{debug, info};

use crate::error::JobError;
use crate::job::Job;
use crate::state::{JobHeader, JobPayload, JobState, StepReport};

/// Progress of a reindex sweep.
#[derive(Debug, Clone, Default)]
pub struct ReindexProgress {
    /// Class of the page just processed
    pub class: String,
    pub classes_done: usize,
    pub classes_total: usize,
    /// Documents fetched so far in this process
    pub documents_fetched: u64,
    /// Accumulated indexer counts
    pub counts: ChunkResult,
}

/// Receives reindex progress after every step.
pub trait ProgressCallback: Send {
    fn on_progress(&self, progress: &ReindexProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &ReindexProgress) {}
}

/// Logs progress at info level whenever a class finishes.
pub struct LoggingProgressCallback;

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &ReindexProgress) {
        info!(
            class = %progress.class,
            classes_done = progress.classes_done,
            classes_total = progress.classes_total,
            fetched = progress.documents_fetched,
            added = progress.counts.added,
            removed = progress.counts.removed,
            "Reindex progress"
        );
    }
}

pub struct ReindexJob {
    ctx: Arc<SyncContext>,
    header: JobHeader,
    classes: Vec<String>,
    fetcher_index: usize,
    fetch_offset: usize,
    set_up: bool,
    complete: bool,
    progress: ReindexProgress,
    callback: Box<dyn ProgressCallback>,
}

impl ReindexJob {
    /// Sweep over every searchable base class of the configuration.
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let classes = ctx.configuration().searchable_base_classes();
        Self::with_cursor(ctx, JobHeader::new(0), classes, 0, 0, false)
    }

    pub fn from_state(ctx: Arc<SyncContext>, state: &JobState) -> Result<Self, JobError> {
        let JobPayload::Reindex {
            classes,
            fetcher_index,
            fetch_offset,
        } = &state.payload
        else {
            return Err(JobError::Serialization(format!(
                "expected a reindex payload, found '{}'",
                state.payload.kind()
            )));
        };
        Ok(Self::with_cursor(
            ctx,
            state.header.clone(),
            classes.clone(),
            *fetcher_index,
            *fetch_offset,
            state.complete,
        ))
    }

    fn with_cursor(
        ctx: Arc<SyncContext>,
        mut header: JobHeader,
        classes: Vec<String>,
        fetcher_index: usize,
        fetch_offset: usize,
        complete: bool,
    ) -> Self {
        if header.batch_size == 0 {
            header.batch_size = ctx.settings().batch_size;
        }
        let progress = ReindexProgress {
            classes_done: fetcher_index,
            classes_total: classes.len(),
            ..ReindexProgress::default()
        };
        Self {
            ctx,
            header,
            classes,
            fetcher_index,
            fetch_offset,
            set_up: false,
            complete,
            progress,
            callback: Box::new(NoOpProgressCallback),
        }
    }

    /// Restrict the sweep to these classes.
    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.progress.classes_total = classes.len();
        self.classes = classes;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, JobError> {
        if batch_size == 0 {
            return Err(IndexingError::InvalidBatchSize(batch_size).into());
        }
        self.header.batch_size = batch_size;
        Ok(self)
    }

    pub fn with_progress(mut self, callback: Box<dyn ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// `(class index, page offset)` of the next step.
    pub fn cursor(&self) -> (usize, usize) {
        (self.fetcher_index, self.fetch_offset)
    }

    pub fn progress(&self) -> &ReindexProgress {
        &self.progress
    }

    fn fetcher(&self, class: &str) -> Result<Box<dyn DocumentFetcher>, JobError> {
        self.ctx
            .fetcher_for(class)
            .ok_or_else(|| JobError::UnknownFetcher(class.to_string()))
    }

    fn advance(&mut self, fetched: usize) {
        if fetched < self.header.batch_size {
            self.fetcher_index += 1;
            self.fetch_offset = 0;
            self.progress.classes_done = self.fetcher_index;
        } else {
            self.fetch_offset += fetched;
        }
    }
}

impl Job for ReindexJob {
    fn id(&self) -> &str {
        &self.header.id
    }

    fn title(&self) -> String {
        format!("Reindex {} classes", self.classes.len())
    }

    /// Check every class has a fetcher and plan the step count on first run.
    ///
    /// A class takes `count / batch + 1` steps: the last page is always
    /// short, possibly empty.
    fn setup(&mut self) -> Result<(), JobError> {
        if self.set_up {
            return Ok(());
        }

        let fresh = self.header.current_step == 0 && self.header.total_steps == 0;
        let mut total_steps = 0;
        for class in &self.classes {
            let fetcher = self.fetcher(class)?;
            if fresh {
                let count = fetcher.total_documents()? as usize;
                total_steps += count / self.header.batch_size + 1;
            }
        }

        if fresh {
            IndexService::new(self.ctx.clone()).configure()?;
            self.header.total_steps = total_steps;
            info!(
                job = %self.header.id,
                classes = self.classes.len(),
                steps = total_steps,
                "Planned reindex"
            );
        }
        if self.fetcher_index >= self.classes.len() {
            self.complete = true;
        }
        self.set_up = true;
        Ok(())
    }

    fn process(&mut self) -> Result<StepReport, JobError> {
        self.setup()?;
        if self.complete {
            return Ok(StepReport {
                step: self.header.current_step,
                total_steps: self.header.total_steps,
                ..StepReport::default()
            });
        }

        let class = self.classes[self.fetcher_index].clone();
        let fetcher = self.fetcher(&class)?;
        let page = fetcher.fetch(self.header.batch_size, self.fetch_offset)?;
        let fetched = page.len();

        let counts = if page.is_empty() {
            ChunkResult::new()
        } else {
            Indexer::new(
                self.ctx.clone(),
                page,
                IndexMethod::Add,
                self.header.batch_size,
            )?
            .with_process_dependencies(false)
            .drain()?
        };
        debug!(
            class = %class,
            offset = self.fetch_offset,
            fetched,
            "Reindexed page"
        );

        self.advance(fetched);
        self.header.current_step += 1;
        self.complete = self.fetcher_index >= self.classes.len();
        if !self.complete && self.header.total_steps <= self.header.current_step {
            // The class grew during the sweep.
            self.header.total_steps = self.header.current_step + 1;
        }

        self.progress.class = class;
        self.progress.documents_fetched += fetched as u64;
        self.progress.counts.merge(&counts);
        self.callback.on_progress(&self.progress);

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
            JobPayload::Reindex {
                classes: self.classes.clone(),
                fetcher_index: self.fetcher_index,
                fetch_offset: self.fetch_offset,
            },
            self.complete,
        )
    }
}
