//! Explicit runtime context shared by every component of a sync run.
//!
//! Instead of a process-wide singleton, settings, the index configuration,
//! the record store, the backend and the extension points are bundled into
//! one [`SyncContext`] and passed around as `Arc<SyncContext>`.

use std::sync::Arc;

use searchsync_types::{IndexDefinitions, Settings};
use tracing::debug;

use crate::backend::{NullBackend, SearchBackend};
use crate::configuration::{IndexConfiguration, IndexFilter, PartitionFilter};
use crate::document::{DeletedDocument, DocHandle, DocumentRef};
use crate::error::IndexingError;
use crate::fetcher::{DocumentFetcher, FetchCreator, FetchCreatorRegistry, RecordFetchCreator};
use crate::hooks::{Hooks, LifecycleHook};
use crate::model::DataModel;
use crate::record::{RecordRef, RecordStore};
use crate::record_document::RecordDocument;
use crate::store::MemoryStore;

/// Everything a document, indexer or job needs at runtime.
pub struct SyncContext {
    settings: Settings,
    configuration: IndexConfiguration,
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn SearchBackend>,
    hooks: Hooks,
    fetchers: FetchCreatorRegistry,
}

impl SyncContext {
    pub fn builder(settings: Settings, model: DataModel) -> SyncContextBuilder {
        SyncContextBuilder::new(settings, model)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn configuration(&self) -> &IndexConfiguration {
        &self.configuration
    }

    pub fn model(&self) -> &DataModel {
        self.configuration.model()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn fetchers(&self) -> &FetchCreatorRegistry {
        &self.fetchers
    }

    /// Wrap a record as a document.
    pub fn document(self: &Arc<Self>, record: RecordRef) -> DocHandle {
        Arc::new(RecordDocument::new(self.clone(), record))
    }

    /// Fetcher for `class` from the first creator that applies.
    pub fn fetcher_for(self: &Arc<Self>, class: &str) -> Option<Box<dyn DocumentFetcher>> {
        self.fetchers.fetcher_for(self, class)
    }

    /// Rebuild a document from its serialized reference.
    ///
    /// An explicit snapshot time is tried first. Otherwise the live record is
    /// used, falling back to the latest snapshot for versioned classes when
    /// the reference allows it.
    pub fn resolve_ref(self: &Arc<Self>, reference: &DocumentRef) -> Result<DocHandle, IndexingError> {
        let class = reference.base_class.as_str();
        let id = reference.id;

        if let Some(at) = reference.snapshot_at {
            if let Some(record) = self.store.fetch_snapshot(class, id, Some(at))? {
                return Ok(self.document(record));
            }
        }

        if let Some(record) = self.store.fetch_by_id(class, id)? {
            return Ok(self.document(record));
        }

        if reference.fallback_to_latest_snapshot && self.model().is_versioned(class) {
            if let Some(record) = self.store.fetch_snapshot(class, id, None)? {
                debug!(class, id, "Resolved document from latest snapshot");
                return Ok(self.document(record));
            }
        }

        Err(IndexingError::RecordNotFound {
            class: class.to_string(),
            id,
        })
    }

    /// Resolve a document that is about to be removed.
    ///
    /// Removal must not depend on the record still existing, so a reference
    /// that no longer resolves yields a [`DeletedDocument`] carrying its
    /// identity and routing.
    pub fn resolve_for_removal(
        self: &Arc<Self>,
        reference: &DocumentRef,
    ) -> Result<DocHandle, IndexingError> {
        match self.resolve_ref(reference) {
            Err(IndexingError::RecordNotFound { class, id }) => {
                debug!(class = %class, id, "Record is gone, removing by reference");
                Ok(Arc::new(DeletedDocument::new(reference.clone())))
            }
            other => other,
        }
    }
}

/// Builder for [`SyncContext`].
///
/// Defaults: an empty [`MemoryStore`] over the model, the [`NullBackend`],
/// the [`PartitionFilter`] and the record fetch creator as the last fallback.
pub struct SyncContextBuilder {
    settings: Settings,
    model: Arc<DataModel>,
    definitions: Option<IndexDefinitions>,
    store: Option<Arc<dyn RecordStore>>,
    backend: Option<Arc<dyn SearchBackend>>,
    hooks: Hooks,
    filters: Vec<Box<dyn IndexFilter>>,
    fetch_creators: Vec<Arc<dyn FetchCreator>>,
}

impl SyncContextBuilder {
    pub fn new(settings: Settings, model: DataModel) -> Self {
        Self {
            settings,
            model: Arc::new(model),
            definitions: None,
            store: None,
            backend: None,
            hooks: Hooks::new(),
            filters: vec![Box::new(PartitionFilter)],
            fetch_creators: Vec::new(),
        }
    }

    /// Use these definitions instead of loading `settings.indexes_file`.
    pub fn with_definitions(mut self, definitions: IndexDefinitions) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn IndexFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Register a fetch creator ahead of the built-in record fetcher.
    pub fn with_fetch_creator(mut self, creator: Arc<dyn FetchCreator>) -> Self {
        self.fetch_creators.push(creator);
        self
    }

    pub fn build(self) -> Result<Arc<SyncContext>, IndexingError> {
        self.settings.validate()?;
        let definitions = match self.definitions {
            Some(d) => d,
            None => self.settings.index_definitions()?,
        };

        let mut configuration = IndexConfiguration::new(self.model.clone(), definitions);
        for filter in self.filters {
            configuration = configuration.with_filter(filter);
        }
        configuration.validate_identifiers()?;

        let mut fetchers = FetchCreatorRegistry::new();
        for creator in self.fetch_creators {
            fetchers.register(creator);
        }
        fetchers.register(Arc::new(RecordFetchCreator));

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(self.model.clone())));
        let backend = self.backend.unwrap_or_else(|| Arc::new(NullBackend));

        debug!(
            indexes = configuration.index_names().len(),
            backend = backend.name(),
            hooks = self.hooks.len(),
            "Sync context built"
        );

        Ok(Arc::new(SyncContext {
            settings: self.settings,
            configuration,
            store,
            backend,
            hooks: self.hooks,
            fetchers,
        }))
    }
}
