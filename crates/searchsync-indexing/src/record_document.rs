//! The record-backed document variant.
//!
//! Wraps one source record and derives everything else from the context:
//! indexability, exported fields, reconstruction metadata and dependents.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use searchsync_types::{is_scalar, ConfigError, Field, WireDocument};
use serde_json::Value;
use tracing::debug;

use crate::context::SyncContext;
use crate::document::{
    record_identifier, DependencyTracker, DocHandle, Document, DocumentRef, Identifiable,
    Indexable, MetaProvider, Serializable,
};
use crate::error::IndexingError;
use crate::fetcher::ChunkedDocuments;
use crate::path::{dependency_shape, resolve_path};
use crate::record::{PublishState, RecordRef, Resolved};

/// Meta field holding the record's base class.
pub const META_BASE_CLASS: &str = "record_base_class";
/// Meta field holding the record's primary key.
pub const META_ID: &str = "record_id";
/// Field carrying crawled page content.
pub const PAGE_CONTENT_FIELD: &str = "page_content";

pub struct RecordDocument {
    ctx: Arc<SyncContext>,
    record: RecordRef,
    base_class: String,
}

impl fmt::Debug for RecordDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordDocument")
            .field("class", &self.record.class_name())
            .field("id", &self.record.id())
            .finish()
    }
}

impl RecordDocument {
    pub fn new(ctx: Arc<SyncContext>, record: RecordRef) -> Self {
        let base_class = ctx.model().base_class(record.class_name());
        Self {
            ctx,
            record,
            base_class,
        }
    }

    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    pub fn base_class(&self) -> &str {
        &self.base_class
    }

    /// Check a resolved value and turn it into a wire value.
    fn export_value(&self, field: &Field, resolved: Resolved) -> Result<Value, ConfigError> {
        let name = field.search_field_name().to_string();
        let class = self.record.class_name().to_string();
        match resolved {
            Resolved::Value(Value::Object(_)) => Err(ConfigError::AssociativeValue { field: name, class }),
            Resolved::Value(Value::Array(items)) => {
                if items.iter().all(is_scalar) {
                    Ok(Value::Array(items))
                } else {
                    Err(ConfigError::NonScalarList { field: name, class })
                }
            }
            Resolved::Value(value) => Ok(value),
            Resolved::Opaque(type_name) => Err(ConfigError::UnsupportedValue {
                field: name,
                class,
                type_name,
            }),
            Resolved::One { .. } | Resolved::Many(_) => Err(ConfigError::RawRelation {
                field: name,
                class,
                relation: field.property_path().to_string(),
            }),
        }
    }

    /// Candidate documents of other searchable classes that read a value
    /// from this record.
    fn scan_dependents(&self) -> Result<Vec<DocHandle>, IndexingError> {
        let model = self.ctx.model();
        let configuration = self.ctx.configuration();
        let own_class = self.record.class_name();
        let own_id = self.record.id();
        let mut found: IndexMap<String, DocHandle> = IndexMap::new();

        for candidate in configuration.searchable_classes() {
            let mut paths = Vec::new();
            for field in configuration.fields_for_class(&candidate)? {
                let path = field.property_path();
                if let Some(shape) = dependency_shape(model, &candidate, path)? {
                    if model.is_a(own_class, &shape.target) {
                        paths.push(path.to_string());
                    }
                }
            }
            if paths.is_empty() {
                continue;
            }

            let Some(fetcher) = self.ctx.fetcher_for(&candidate) else {
                continue;
            };
            for doc in ChunkedDocuments::new(fetcher, self.ctx.settings().batch_size) {
                let doc = doc?;
                let Some(record) = doc.source_record() else {
                    continue;
                };
                for path in &paths {
                    let resolution = resolve_path(record, path)?;
                    let hit = resolution
                        .dependency
                        .map(|dep| dep.references(model, own_class, own_id))
                        .unwrap_or(false);
                    if hit {
                        found.entry(doc.identifier()).or_insert_with(|| doc.clone());
                        break;
                    }
                }
            }
        }

        Ok(found.into_values().collect())
    }
}

impl Identifiable for RecordDocument {
    fn identifier(&self) -> String {
        record_identifier(&self.base_class, self.record.id())
    }

    fn source_class(&self) -> &str {
        self.record.class_name()
    }
}

impl Indexable for RecordDocument {
    /// Visible, not hidden from search, published, indexing enabled, covered
    /// by an index and not vetoed; checked in that order.
    fn should_index(&self) -> bool {
        if !self.record.is_visible_to_anonymous() {
            return false;
        }
        if self.record.show_in_search() == Some(false) {
            return false;
        }
        if self.record.publish_state() == Some(PublishState::Draft) {
            return false;
        }
        if !self.ctx.settings().enabled {
            return false;
        }
        if self.ctx.configuration().indexes_for_document(self).is_empty() {
            return false;
        }
        self.ctx.hooks().can_index(self)
    }

    fn to_array(&self) -> Result<WireDocument, IndexingError> {
        let settings = self.ctx.settings();
        let mut wire = WireDocument::new();

        if settings.crawl_page_content {
            if let Some(content) = self.record.page_content() {
                let content = if settings.include_page_html {
                    content
                } else {
                    strip_markup(&content)
                };
                wire.insert(PAGE_CONTENT_FIELD.to_string(), Value::String(content));
            }
        }

        for field in self.ctx.configuration().fields_for_class(self.source_class())? {
            let resolution = resolve_path(&self.record, field.property_path())?;
            let value = self.export_value(&field, resolution.value)?;
            wire.insert(field.search_field_name().to_string(), value);
        }
        Ok(wire)
    }
}

impl Serializable for RecordDocument {
    fn to_ref(&self) -> DocumentRef {
        let reference = DocumentRef::new(self.base_class.clone(), self.record.id());
        if self.ctx.model().is_versioned(&self.base_class) {
            reference.with_fallback()
        } else {
            reference
        }
    }
}

impl MetaProvider for RecordDocument {
    fn provide_meta(&self) -> WireDocument {
        let mut meta = WireDocument::new();
        meta.insert(META_BASE_CLASS.to_string(), Value::from(self.base_class.clone()));
        meta.insert(META_ID.to_string(), Value::from(self.record.id()));
        meta
    }
}

impl DependencyTracker for RecordDocument {
    fn dependent_documents(&self) -> Result<Vec<DocHandle>, IndexingError> {
        let mut dependents = if self.ctx.settings().auto_dependency_tracking {
            self.scan_dependents()?
        } else {
            Vec::new()
        };
        self.ctx.hooks().update_dependent_documents(self, &mut dependents);
        debug!(
            document = %self.identifier(),
            count = dependents.len(),
            "Dependent documents resolved"
        );
        Ok(dependents)
    }
}

impl Document for RecordDocument {
    fn as_dependency_tracker(&self) -> Option<&dyn DependencyTracker> {
        Some(self)
    }

    fn as_meta_provider(&self) -> Option<&dyn MetaProvider> {
        Some(self)
    }

    fn partition_key(&self) -> Option<String> {
        self.record.partition_key()
    }

    fn source_record(&self) -> Option<&RecordRef> {
        Some(&self.record)
    }
}

/// Drop markup tags, decode the common entities and collapse whitespace.
pub fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
