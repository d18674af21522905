//! Shared fixtures for unit tests.

use std::sync::Arc;

use searchsync_indexing::{
    ClassDef, DataModel, DocHandle, InMemoryBackend, MemoryStore, RecordData, RecordStore,
    SyncContext,
};
use searchsync_types::{parse_index_definitions, Settings};

pub(crate) const INDEXES: &str = r#"
[main.include_classes.Page.fields]
title = { property = "Title" }
tag_titles = { property = "Tags.Title" }

[main.include_classes.Tag.fields]
title = { property = "Title" }
"#;

pub(crate) struct Fixture {
    pub store: MemoryStore,
    pub backend: Arc<InMemoryBackend>,
    pub ctx: Arc<SyncContext>,
}

pub(crate) fn model() -> DataModel {
    DataModel::new()
        .with_class("Page", ClassDef::new().many_many("Tags", "Tag"))
        .with_class("Tag", ClassDef::new())
}

pub(crate) fn fixture_with(settings: Settings) -> Fixture {
    let store = MemoryStore::new(Arc::new(model()));
    let backend = Arc::new(InMemoryBackend::new("id"));
    let ctx = SyncContext::builder(settings, model())
        .with_definitions(parse_index_definitions(INDEXES).unwrap())
        .with_store(Arc::new(store.clone()))
        .with_backend(backend.clone())
        .build()
        .unwrap();
    Fixture {
        store,
        backend,
        ctx,
    }
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(Settings {
        batch_size: 6,
        ..Settings::default()
    })
}

impl Fixture {
    /// Write pages 1..=n and return their documents.
    pub fn pages(&self, n: u64) -> Vec<DocHandle> {
        for id in 1..=n {
            self.store
                .write(RecordData::new("Page", id).with_field("Title", format!("Page {id}")));
        }
        self.store
            .fetch_page("Page", n as usize, 0)
            .unwrap()
            .into_iter()
            .map(|r| self.ctx.document(r))
            .collect()
    }

    pub fn doc(&self, class: &str, id: u64) -> DocHandle {
        self.ctx
            .document(self.store.fetch_by_id(class, id).unwrap().unwrap())
    }

    pub fn indexed(&self) -> usize {
        self.backend.ids("main").len()
    }
}
