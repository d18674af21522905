//! Fetchers: paged document sources per record class.
//!
//! A [`FetchCreator`] decides whether it can serve a class and builds a
//! [`DocumentFetcher`] bound to it. Creators are consulted in registration
//! order and the first match wins. [`ChunkedDocuments`] turns a fetcher into
//! a lazy one-shot sequence over the whole class.

use std::collections::VecDeque;
use std::sync::Arc;

use searchsync_types::WireDocument;
use serde_json::Value;

use crate::context::SyncContext;
use crate::document::DocHandle;
use crate::error::IndexingError;
use crate::record_document::META_ID;

/// Paged access to the documents of one class.
pub trait DocumentFetcher: Send {
    /// Class this fetcher is bound to.
    fn class(&self) -> &str;

    /// One page of documents in stable order.
    fn fetch(&self, limit: usize, offset: usize) -> Result<Vec<DocHandle>, IndexingError>;

    fn total_documents(&self) -> Result<u64, IndexingError>;

    /// Rebuild a document from the identity carried in a wire record.
    ///
    /// `Ok(None)` when the identity is missing or the record no longer exists.
    fn create_document(&self, wire: &WireDocument) -> Result<Option<DocHandle>, IndexingError>;
}

/// Strategy that builds fetchers for the classes it applies to.
pub trait FetchCreator: Send + Sync {
    fn applies_to(&self, ctx: &SyncContext, class: &str) -> bool;

    fn create_fetcher(&self, ctx: &Arc<SyncContext>, class: &str) -> Box<dyn DocumentFetcher>;
}

/// Creators in insertion order.
#[derive(Default, Clone)]
pub struct FetchCreatorRegistry {
    creators: Vec<Arc<dyn FetchCreator>>,
}

impl FetchCreatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, creator: Arc<dyn FetchCreator>) {
        self.creators.push(creator);
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }

    /// Fetcher from the first creator that applies to `class`.
    pub fn fetcher_for(
        &self,
        ctx: &Arc<SyncContext>,
        class: &str,
    ) -> Option<Box<dyn DocumentFetcher>> {
        self.creators
            .iter()
            .find(|c| c.applies_to(ctx, class))
            .map(|c| c.create_fetcher(ctx, class))
    }
}

/// Lazy, finite, one-shot sequence over every document of a fetcher.
///
/// Pages of `chunk_size` are fetched on demand; a short page ends the
/// sequence. A fetch error is yielded once and ends the sequence too.
pub struct ChunkedDocuments {
    fetcher: Box<dyn DocumentFetcher>,
    chunk_size: usize,
    page: usize,
    buffer: VecDeque<DocHandle>,
    exhausted: bool,
}

impl ChunkedDocuments {
    pub fn new(fetcher: Box<dyn DocumentFetcher>, chunk_size: usize) -> Self {
        Self {
            fetcher,
            chunk_size: chunk_size.max(1),
            page: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.page
    }
}

impl Iterator for ChunkedDocuments {
    type Item = Result<DocHandle, IndexingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(doc) = self.buffer.pop_front() {
            return Some(Ok(doc));
        }
        if self.exhausted {
            return None;
        }

        let offset = self.chunk_size * self.page;
        self.page += 1;
        match self.fetcher.fetch(self.chunk_size, offset) {
            Ok(page) => {
                if page.len() < self.chunk_size {
                    self.exhausted = true;
                }
                self.buffer.extend(page);
                self.buffer.pop_front().map(Ok)
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// Fetcher over records of one class in the context's record store.
pub struct RecordFetcher {
    ctx: Arc<SyncContext>,
    class: String,
}

impl RecordFetcher {
    pub fn new(ctx: Arc<SyncContext>, class: impl Into<String>) -> Self {
        Self {
            ctx,
            class: class.into(),
        }
    }
}

impl DocumentFetcher for RecordFetcher {
    fn class(&self) -> &str {
        &self.class
    }

    fn fetch(&self, limit: usize, offset: usize) -> Result<Vec<DocHandle>, IndexingError> {
        Ok(self
            .ctx
            .store()
            .fetch_page(&self.class, limit, offset)?
            .into_iter()
            .map(|record| self.ctx.document(record))
            .collect())
    }

    fn total_documents(&self) -> Result<u64, IndexingError> {
        self.ctx.store().count(&self.class)
    }

    fn create_document(&self, wire: &WireDocument) -> Result<Option<DocHandle>, IndexingError> {
        let id = match wire.get(META_ID) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        let Some(id) = id else {
            return Ok(None);
        };
        Ok(self
            .ctx
            .store()
            .fetch_by_id(&self.class, id)?
            .map(|record| self.ctx.document(record)))
    }
}

/// Serves every class the data model knows.
pub struct RecordFetchCreator;

impl FetchCreator for RecordFetchCreator {
    fn applies_to(&self, ctx: &SyncContext, class: &str) -> bool {
        ctx.model().contains(class)
    }

    fn create_fetcher(&self, ctx: &Arc<SyncContext>, class: &str) -> Box<dyn DocumentFetcher> {
        Box::new(RecordFetcher::new(ctx.clone(), class))
    }
}
