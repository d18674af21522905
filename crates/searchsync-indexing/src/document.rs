//! Document capability traits.
//!
//! A document is a transient projection of one source record. Every document
//! is [`Identifiable`], [`Indexable`] and [`Serializable`]; the optional
//! capabilities are discovered through the `as_*` queries on [`Document`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use searchsync_types::WireDocument;
use serde::{Deserialize, Serialize};

use crate::error::IndexingError;
use crate::record::RecordRef;

/// Shared handle to a document.
pub type DocHandle = Arc<dyn Document>;

/// Stable identity of a document.
pub trait Identifiable {
    /// Backend document id, derived from source class and primary key.
    fn identifier(&self) -> String;

    /// Class discriminator used for reconstruction.
    fn source_class(&self) -> &str;
}

pub trait Indexable {
    /// Whether the document belongs in the index right now.
    fn should_index(&self) -> bool;

    /// Resolved exported fields.
    fn to_array(&self) -> Result<WireDocument, IndexingError>;
}

pub trait Serializable {
    /// Compact reference for cross-process transport.
    fn to_ref(&self) -> DocumentRef;
}

/// Documents that embed data from other records.
pub trait DependencyTracker {
    /// Other documents whose exported fields include data from this one.
    fn dependent_documents(&self) -> Result<Vec<DocHandle>, IndexingError>;
}

/// Documents that attach metadata outside field resolution.
pub trait MetaProvider {
    fn provide_meta(&self) -> WireDocument;
}

/// Before/after phase of a lifecycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    Before,
    After,
}

pub trait AddHandler {
    fn on_add(&self, stage: HookStage) -> Result<(), IndexingError>;
}

pub trait RemoveHandler {
    fn on_remove(&self, stage: HookStage) -> Result<(), IndexingError>;
}

/// A document with optional capabilities.
pub trait Document: Identifiable + Indexable + Serializable + Send + Sync + fmt::Debug {
    fn as_dependency_tracker(&self) -> Option<&dyn DependencyTracker> {
        None
    }

    fn as_meta_provider(&self) -> Option<&dyn MetaProvider> {
        None
    }

    fn as_add_handler(&self) -> Option<&dyn AddHandler> {
        None
    }

    fn as_remove_handler(&self) -> Option<&dyn RemoveHandler> {
        None
    }

    /// Partition used by per-index routing keys.
    fn partition_key(&self) -> Option<String> {
        None
    }

    /// The wrapped record, for documents backed by one.
    fn source_record(&self) -> Option<&RecordRef> {
        None
    }
}

/// Serialized form of a document: enough to re-fetch its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub base_class: String,
    pub id: u64,
    /// Fall back to the latest historical snapshot when the record is gone
    #[serde(default)]
    pub fallback_to_latest_snapshot: bool,
    /// Snapshot time for deletion flows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_at: Option<DateTime<Utc>>,
    /// Concrete class, when it differs from what the base class implies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_class: Option<String>,
    /// Routing partition at the time the reference was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl DocumentRef {
    pub fn new(base_class: impl Into<String>, id: u64) -> Self {
        Self {
            base_class: base_class.into(),
            id,
            fallback_to_latest_snapshot: false,
            snapshot_at: None,
            source_class: None,
            partition: None,
        }
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback_to_latest_snapshot = true;
        self
    }

    pub fn with_snapshot_at(mut self, at: DateTime<Utc>) -> Self {
        self.snapshot_at = Some(at);
        self.fallback_to_latest_snapshot = true;
        self
    }

    /// Record the routing of `document`, so it can be removed from the
    /// right indexes after its record is gone.
    pub fn with_origin(mut self, document: &dyn Document) -> Self {
        self.source_class = Some(document.source_class().to_string());
        self.partition = document.partition_key();
        self
    }

    /// Backend id of the referenced document.
    pub fn identifier(&self) -> String {
        record_identifier(&self.base_class, self.id)
    }
}

/// Stand-in for a document whose record no longer exists anywhere.
///
/// Carries only what removal needs: identity and routing. It never
/// qualifies for indexing and has no fields.
#[derive(Debug, Clone)]
pub struct DeletedDocument {
    reference: DocumentRef,
    source_class: String,
}

impl DeletedDocument {
    pub fn new(reference: DocumentRef) -> Self {
        let source_class = reference
            .source_class
            .clone()
            .unwrap_or_else(|| reference.base_class.clone());
        Self {
            reference,
            source_class,
        }
    }
}

impl Identifiable for DeletedDocument {
    fn identifier(&self) -> String {
        self.reference.identifier()
    }

    fn source_class(&self) -> &str {
        &self.source_class
    }
}

impl Indexable for DeletedDocument {
    fn should_index(&self) -> bool {
        false
    }

    fn to_array(&self) -> Result<WireDocument, IndexingError> {
        Ok(WireDocument::new())
    }
}

impl Serializable for DeletedDocument {
    fn to_ref(&self) -> DocumentRef {
        self.reference.clone()
    }
}

impl Document for DeletedDocument {
    fn partition_key(&self) -> Option<String> {
        self.reference.partition.clone()
    }
}

/// Document id for a record: [`identifier_prefix`] of the base class, then
/// the primary key.
pub fn record_identifier(base_class: &str, id: u64) -> String {
    format!("{}_{id}", identifier_prefix(base_class))
}

/// Lowercased class name with separators normalized to `_`.
///
/// Distinct classes can share a prefix (`My.Page` and `my_page`); the
/// configuration rejects such pairs among indexed classes.
pub fn identifier_prefix(base_class: &str) -> String {
    base_class
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_identifier_normalized() {
        assert_eq!(record_identifier("Page", 12), "page_12");
        assert_eq!(record_identifier("App\\Models\\BlogPost", 3), "app_models_blogpost_3");
        assert_ne!(record_identifier("Page", 1), record_identifier("File", 1));
        assert_eq!(identifier_prefix("My.Page"), identifier_prefix("my_page"));
    }

    #[test]
    fn test_document_ref_json() {
        let r = DocumentRef::new("Page", 5).with_fallback();
        let json = serde_json::to_string(&r).unwrap();
        assert!(!json.contains("snapshot_at"));
        let back: DocumentRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);

        let legacy: DocumentRef = serde_json::from_str(r#"{"base_class":"Page","id":5}"#).unwrap();
        assert!(!legacy.fallback_to_latest_snapshot);
        assert!(legacy.source_class.is_none());
    }

    #[test]
    fn test_deleted_document_keeps_routing() {
        let mut reference = DocumentRef::new("Page", 7);
        reference.source_class = Some("BlogPage".to_string());
        reference.partition = Some("site-1".to_string());
        let deleted = DeletedDocument::new(reference.clone());

        assert_eq!(deleted.identifier(), "page_7");
        assert_eq!(deleted.source_class(), "BlogPage");
        assert_eq!(deleted.partition_key().as_deref(), Some("site-1"));
        assert!(!deleted.should_index());
        assert_eq!(deleted.to_ref(), reference);

        let bare = DeletedDocument::new(DocumentRef::new("Tag", 2));
        assert_eq!(bare.source_class(), "Tag");
        assert_eq!(bare.partition_key(), None);
    }
}
