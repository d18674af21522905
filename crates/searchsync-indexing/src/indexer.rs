//! The batch/dependency engine.
//!
//! An [`Indexer`] partitions its documents into fixed-size chunks and
//! processes exactly one chunk per [`Indexer::tick`]. Between ticks the run
//! can be persisted (see [`Indexer::remaining_documents`]) and resumed in
//! another process.
//!
//! ```text
//! Pending --tick--> Running --tick (last chunk)--> Complete
//! ```
//!
//! After each chunk, dependents of the processed documents are re-added by
//! a child indexer that is drained before `tick` returns.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use searchsync_types::IndexMethod;
use tracing::{debug, info};

use crate::context::SyncContext;
use crate::document::{DocHandle, Document, HookStage};
use crate::error::IndexingError;
use crate::service::IndexService;

/// Lifecycle of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    Pending,
    Running,
    Complete,
}

/// Counts from one or more processed chunks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    /// Documents sent to the backend for adding
    pub added: usize,
    /// Documents sent to the backend for removal
    pub removed: usize,
    /// Documents skipped (class not indexed, or already seen this run)
    pub skipped: usize,
    /// Documents skipped for exceeding the size limit
    pub oversized: usize,
    /// Dependent documents scheduled for re-indexing
    pub dependents: usize,
}

impl ChunkResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: &ChunkResult) {
        self.added += other.added;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.oversized += other.oversized;
        self.dependents += other.dependents;
    }

    /// Documents handled in any way.
    pub fn total(&self) -> usize {
        self.added + self.removed + self.skipped + self.oversized
    }
}

type VisitedSet = Arc<Mutex<HashSet<String>>>;

/// Resumable indexing run over a list of documents.
///
/// Not safe to tick concurrently; callers own the run exclusively.
pub struct Indexer {
    ctx: Arc<SyncContext>,
    service: IndexService,
    documents: Vec<DocHandle>,
    method: IndexMethod,
    batch_size: usize,
    process_dependencies: bool,
    chunks: VecDeque<Vec<DocHandle>>,
    total_chunks: usize,
    depth: usize,
    visited: Option<VisitedSet>,
}

impl Indexer {
    /// Create a run. Dependency processing is on by default.
    pub fn new(
        ctx: Arc<SyncContext>,
        documents: Vec<DocHandle>,
        method: IndexMethod,
        batch_size: usize,
    ) -> Result<Self, IndexingError> {
        if batch_size == 0 {
            return Err(IndexingError::InvalidBatchSize(batch_size));
        }
        let visited = ctx
            .settings()
            .dependency_cycle_guard
            .then(|| Arc::new(Mutex::new(HashSet::new())));
        let mut indexer = Self {
            service: IndexService::new(ctx.clone()),
            ctx,
            documents,
            method,
            batch_size,
            process_dependencies: true,
            chunks: VecDeque::new(),
            total_chunks: 0,
            depth: 0,
            visited,
        };
        indexer.rechunk();
        Ok(indexer)
    }

    pub fn with_process_dependencies(mut self, enabled: bool) -> Self {
        self.process_dependencies = enabled;
        self
    }

    fn child(&self, documents: Vec<DocHandle>) -> Self {
        let mut child = Self {
            ctx: self.ctx.clone(),
            service: IndexService::new(self.ctx.clone()),
            documents,
            method: IndexMethod::Add,
            batch_size: self.batch_size,
            process_dependencies: true,
            chunks: VecDeque::new(),
            total_chunks: 0,
            depth: self.depth + 1,
            visited: self.visited.clone(),
        };
        child.rechunk();
        child
    }

    fn rechunk(&mut self) {
        self.chunks = self
            .documents
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();
        self.total_chunks = self.chunks.len();
    }

    /// Replace the documents and restart chunking from the beginning.
    pub fn set_documents(&mut self, documents: Vec<DocHandle>) {
        self.documents = documents;
        self.rechunk();
    }

    /// Change the batch size and restart chunking from the beginning.
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), IndexingError> {
        if batch_size == 0 {
            return Err(IndexingError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        self.rechunk();
        Ok(())
    }

    pub fn method(&self) -> IndexMethod {
        self.method
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn process_dependencies(&self) -> bool {
        self.process_dependencies
    }

    pub fn documents(&self) -> &[DocHandle] {
        &self.documents
    }

    /// Number of chunks the documents were partitioned into.
    pub fn chunk_count(&self) -> usize {
        self.total_chunks
    }

    pub fn remaining_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn processed_chunks(&self) -> usize {
        self.total_chunks - self.chunks.len()
    }

    /// The unprocessed chunks, in order.
    pub fn chunks(&self) -> impl Iterator<Item = &[DocHandle]> {
        self.chunks.iter().map(Vec::as_slice)
    }

    /// Documents not yet processed, in order.
    pub fn remaining_documents(&self) -> Vec<DocHandle> {
        self.chunks.iter().flatten().cloned().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn state(&self) -> IndexerState {
        if self.is_complete() {
            IndexerState::Complete
        } else if self.processed_chunks() == 0 {
            IndexerState::Pending
        } else {
            IndexerState::Running
        }
    }

    /// Process the next chunk, including its dependency fan-out.
    ///
    /// The chunk is only consumed once it has been fully processed, so a
    /// failed tick can be retried. Documents the failed tick marked as
    /// visited are released again. Ticking a complete run does nothing.
    pub fn tick(&mut self) -> Result<ChunkResult, IndexingError> {
        let Some(chunk) = self.chunks.front().cloned() else {
            return Ok(ChunkResult::new());
        };

        let mut marked = Vec::new();
        let result = match self.process_chunk(&chunk, &mut marked) {
            Ok(result) => result,
            Err(e) => {
                self.release_visited(&marked);
                return Err(e);
            }
        };

        self.chunks.pop_front();
        if self.depth == 0 {
            info!(
                method = %self.method,
                chunk = self.processed_chunks(),
                of = self.total_chunks,
                added = result.added,
                removed = result.removed,
                skipped = result.skipped,
                dependents = result.dependents,
                "Processed chunk"
            );
        }
        Ok(result)
    }

    /// Tick until complete.
    pub fn drain(&mut self) -> Result<ChunkResult, IndexingError> {
        let mut total = ChunkResult::new();
        while !self.is_complete() {
            total.merge(&self.tick()?);
        }
        Ok(total)
    }

    fn process_chunk(
        &self,
        chunk: &[DocHandle],
        marked: &mut Vec<String>,
    ) -> Result<ChunkResult, IndexingError> {
        let (mut result, processed) = match self.method {
            IndexMethod::Delete => self.remove_chunk(chunk, marked)?,
            IndexMethod::Add => self.add_chunk(chunk, marked)?,
        };

        if self.process_dependencies {
            for document in &processed {
                let fan_out = self.process_dependents(document)?;
                result.merge(&fan_out);
            }
        }
        Ok(result)
    }

    /// Claim `document` for this run. Newly claimed ids are collected in
    /// `marked` so a failed tick can release them.
    fn mark_visited(&self, document: &DocHandle, marked: &mut Vec<String>) -> bool {
        let Some(visited) = &self.visited else {
            return true;
        };
        let id = document.identifier();
        if visited.lock().insert(id.clone()) {
            marked.push(id);
            true
        } else {
            false
        }
    }

    fn release_visited(&self, marked: &[String]) {
        if let Some(visited) = &self.visited {
            let mut visited = visited.lock();
            for id in marked {
                visited.remove(id);
            }
        }
    }

    fn remove_chunk(
        &self,
        chunk: &[DocHandle],
        marked: &mut Vec<String>,
    ) -> Result<(ChunkResult, Vec<DocHandle>), IndexingError> {
        let hooks = self.ctx.hooks();
        for document in chunk {
            self.mark_visited(document, marked);
            hooks.before_remove(document.as_ref())?;
            if let Some(handler) = document.as_remove_handler() {
                handler.on_remove(HookStage::Before)?;
            }
        }

        let outcome = self.service.remove_documents(chunk)?;

        for document in chunk {
            hooks.after_remove(document.as_ref())?;
            if let Some(handler) = document.as_remove_handler() {
                handler.on_remove(HookStage::After)?;
            }
        }

        let result = ChunkResult {
            removed: outcome.sent,
            skipped: chunk.len() - outcome.sent,
            ..ChunkResult::default()
        };
        Ok((result, chunk.to_vec()))
    }

    fn add_chunk(
        &self,
        chunk: &[DocHandle],
        marked: &mut Vec<String>,
    ) -> Result<(ChunkResult, Vec<DocHandle>), IndexingError> {
        let configuration = self.ctx.configuration();
        let hooks = self.ctx.hooks();
        let mut result = ChunkResult::new();
        let mut to_update = Vec::new();
        let mut to_remove = Vec::new();

        for document in chunk {
            if !configuration.is_class_indexed(document.source_class()) {
                debug!(document = %document.identifier(), "Class not indexed, skipping");
                result.skipped += 1;
                continue;
            }
            if !self.mark_visited(document, marked) {
                debug!(document = %document.identifier(), "Already processed in this run, skipping");
                result.skipped += 1;
                continue;
            }

            if document.should_index() {
                hooks.before_add(document.as_ref())?;
                if let Some(handler) = document.as_add_handler() {
                    handler.on_add(HookStage::Before)?;
                }
                to_update.push(document.clone());
            } else {
                debug!(document = %document.identifier(), "Not indexable, routing to remove");
                hooks.before_remove(document.as_ref())?;
                if let Some(handler) = document.as_remove_handler() {
                    handler.on_remove(HookStage::Before)?;
                }
                to_remove.push(document.clone());
            }
        }

        if !to_update.is_empty() {
            let outcome = self.service.add_documents(&to_update)?;
            result.added += outcome.sent;
            result.oversized += outcome.oversized;
        }
        if !to_remove.is_empty() {
            let outcome = self.service.remove_documents(&to_remove)?;
            result.removed += outcome.sent;
        }

        for document in &to_update {
            hooks.after_add(document.as_ref())?;
            if let Some(handler) = document.as_add_handler() {
                handler.on_add(HookStage::After)?;
            }
        }
        for document in &to_remove {
            hooks.after_remove(document.as_ref())?;
            if let Some(handler) = document.as_remove_handler() {
                handler.on_remove(HookStage::After)?;
            }
        }

        let processed = to_update.into_iter().chain(to_remove).collect();
        Ok((result, processed))
    }

    /// Re-add the dependents of one processed document, recursively.
    fn process_dependents(&self, document: &DocHandle) -> Result<ChunkResult, IndexingError> {
        let Some(tracker) = document.as_dependency_tracker() else {
            return Ok(ChunkResult::new());
        };
        let own = document.identifier();
        let dependents: Vec<DocHandle> = tracker
            .dependent_documents()?
            .into_iter()
            .filter(|d| d.identifier() != own)
            .collect();
        if dependents.is_empty() {
            return Ok(ChunkResult::new());
        }

        if let Some(limit) = self.ctx.settings().max_dependency_depth {
            if self.depth + 1 > limit {
                return Err(IndexingError::DependencyDepthExceeded {
                    limit,
                    identifier: own,
                });
            }
        }

        debug!(
            document = %own,
            count = dependents.len(),
            depth = self.depth + 1,
            "Re-indexing dependents"
        );
        let count = dependents.len();
        let mut child = self.child(dependents);
        let mut result = child.drain()?;
        result.dependents += count;
        Ok(result)
    }
}
