//! End-to-end test infrastructure for searchsync.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering the record-store-to-backend pipeline: configuration, the
//! indexer, the document builder and the job layer.

use std::path::PathBuf;
use std::sync::Arc;

use searchsync_indexing::{
    ClassDef, DataModel, DocHandle, InMemoryBackend, MemoryStore, RecordData,
    RecordStore, SyncContext,
};
use searchsync_jobs::MemoryJobQueue;
use searchsync_types::{parse_index_definitions, Settings};

/// Index definitions shared by most scenarios.
///
/// Pages export their own title plus values read through two relations,
/// so tags and related pages both have dependents.
pub const INDEXES: &str = r#"
[main.include_classes.Page.fields]
title = { property = "Title" }
tag_titles = { property = "Tags.Title" }
related_title = { property = "Related.Title" }

[main.include_classes.Tag.fields]
title = { property = "Title" }
"#;

/// Page (with tags and a related page), Tag, and the unindexed Member.
pub fn model() -> DataModel {
    DataModel::new()
        .with_class(
            "Page",
            ClassDef::new()
                .many_many("Tags", "Tag")
                .has_one("Related", "Page"),
        )
        .with_class("Tag", ClassDef::new())
        .with_class("Member", ClassDef::new())
}

/// Settings used by [`TestHarness::new`]: batches of six.
pub fn default_settings() -> Settings {
    Settings {
        batch_size: 6,
        ..Settings::default()
    }
}

/// Shared test harness for E2E tests.
///
/// Owns a fresh record store, an in-memory backend and the context wiring
/// them together. Every test builds its own harness; nothing is shared.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub store: MemoryStore,
    pub backend: Arc<InMemoryBackend>,
    pub ctx: Arc<SyncContext>,
    /// Location of the persisted job queue
    pub queue_path: PathBuf,
}

impl TestHarness {
    /// Harness over [`INDEXES`] with [`default_settings`].
    pub fn new() -> Self {
        Self::with_settings(default_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::with_indexes(settings, INDEXES)
    }

    /// Harness with custom index definitions (TOML).
    pub fn with_indexes(settings: Settings, indexes: &str) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let queue_path = temp_dir.path().join("queue.json");

        let store = MemoryStore::new(Arc::new(model()));
        let backend = Arc::new(InMemoryBackend::new(settings.id_field.clone()));
        let definitions = parse_index_definitions(indexes).expect("Invalid test index definitions");
        let ctx = SyncContext::builder(settings, model())
            .with_definitions(definitions)
            .with_store(Arc::new(store.clone()))
            .with_backend(backend.clone())
            .build()
            .expect("Failed to build sync context");

        Self {
            _temp_dir: temp_dir,
            store,
            backend,
            ctx,
            queue_path,
        }
    }

    /// Write pages `1..=n` titled "Page {id}" and return their documents in id order.
    pub fn write_pages(&self, n: u64) -> Vec<DocHandle> {
        for id in 1..=n {
            self.store
                .write(RecordData::new("Page", id).with_field("Title", format!("Page {id}")));
        }
        self.documents("Page", n as usize)
    }

    pub fn write_tag(&self, id: u64, title: &str) -> DocHandle {
        self.store
            .write(RecordData::new("Tag", id).with_field("Title", title));
        self.doc("Tag", id)
    }

    /// The first `limit` live documents of `class`.
    pub fn documents(&self, class: &str, limit: usize) -> Vec<DocHandle> {
        self.store
            .fetch_page(class, limit, 0)
            .expect("Failed to fetch records")
            .into_iter()
            .map(|record| self.ctx.document(record))
            .collect()
    }

    /// Document for a live record.
    pub fn doc(&self, class: &str, id: u64) -> DocHandle {
        let record = self
            .store
            .fetch_by_id(class, id)
            .expect("Failed to fetch record")
            .unwrap_or_else(|| panic!("No {class} #{id} in the store"));
        self.ctx.document(record)
    }

    /// Identifiers held by `index`, in insertion order.
    pub fn indexed_ids(&self, index: &str) -> Vec<String> {
        self.backend.ids(index)
    }

    /// Open (or reopen) the file-backed job queue, as a new worker process would.
    pub fn open_queue(&self) -> Arc<MemoryJobQueue> {
        Arc::new(MemoryJobQueue::open(&self.queue_path).expect("Failed to open job queue"))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifiers of `documents`, in order.
pub fn identifiers(documents: &[DocHandle]) -> Vec<String> {
    documents.iter().map(|d| d.identifier()).collect()
}
