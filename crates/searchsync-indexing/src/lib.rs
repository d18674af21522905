//! Indexing core for searchsync.
//!
//! This crate keeps a record store and one or more search indexes
//! eventually consistent.
//!
//! ## Key Components
//!
//! - [`IndexConfiguration`]: which indexes and fields apply to a class or document
//! - [`Document`]: capability traits for indexable projections of records
//! - [`RecordDocument`]: the record-backed document with path resolution and dependents
//! - [`DocumentBuilder`]: documents to and from the flat wire representation
//! - [`FetchCreatorRegistry`] / [`ChunkedDocuments`]: paged traversal of a class
//! - [`IndexService`]: per-index routing of add/remove calls
//! - [`Indexer`]: the resumable, chunked, dependency-aware batch engine
//! - [`SearchBackend`]: the remote index contract
//! - [`SyncContext`]: the explicit context every component receives
//!
//! ## Example
//!
//! ```ignore
//! use searchsync_indexing::{Indexer, SyncContext};
//! use searchsync_types::IndexMethod;
//!
//! let ctx = SyncContext::builder(settings, model)
//!     .with_store(store)
//!     .with_backend(backend)
//!     .build()?;
//!
//! let docs = records.into_iter().map(|r| ctx.document(r)).collect();
//! let mut indexer = Indexer::new(ctx.clone(), docs, IndexMethod::Add, 100)?;
//! while !indexer.is_complete() {
//!     indexer.tick()?;
//! }
//! ```

pub mod backend;
pub mod builder;
pub mod configuration;
pub mod context;
pub mod document;
pub mod error;
pub mod fetcher;
pub mod hooks;
pub mod indexer;
pub mod model;
pub mod path;
pub mod record;
pub mod record_document;
pub mod service;
pub mod store;

pub use backend::{
    BackendCall, BackendError, BatchOutcome, InMemoryBackend, NullBackend, SchemaMap,
    SearchBackend,
};
pub use builder::DocumentBuilder;
pub use configuration::{IndexConfiguration, IndexFilter, IndexSelection, PartitionFilter};
pub use context::{SyncContext, SyncContextBuilder};
pub use document::{
    identifier_prefix, record_identifier, AddHandler, DeletedDocument, DependencyTracker,
    DocHandle, Document, DocumentRef, HookStage, Identifiable, Indexable, MetaProvider,
    RemoveHandler, Serializable,
};
pub use error::IndexingError;
pub use fetcher::{
    ChunkedDocuments, DocumentFetcher, FetchCreator, FetchCreatorRegistry, RecordFetchCreator,
    RecordFetcher,
};
pub use hooks::{Hooks, LifecycleHook};
pub use indexer::{ChunkResult, Indexer, IndexerState};
pub use model::{ClassDef, DataModel, RelationDef, RelationKind};
pub use path::{dependency_shape, resolve_path, DependencyShape, DependencySource, Resolution};
pub use record::{PublishState, Record, RecordRef, RecordStore, RelationList, Resolved};
pub use record_document::{strip_markup, RecordDocument, META_BASE_CLASS, META_ID, PAGE_CONTENT_FIELD};
pub use service::{IndexService, ServiceOutcome, DEFAULT_FIELD_TYPE};
pub use store::{MemoryRecord, MemoryStore, RecordData, StoreFixture};
