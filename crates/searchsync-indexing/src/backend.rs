//! Search backend contract.
//!
//! The remote index store is an external collaborator; the core only relies
//! on batch add/remove, id lookups, paging, counts and schema setup. Two
//! implementations ship with the crate: [`InMemoryBackend`] for tests and
//! dry runs, and [`NullBackend`] which accepts and discards everything.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use parking_lot::RwLock;
use searchsync_types::WireDocument;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors reported by a backend adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The remote call failed
    #[error("Request to index '{index}' failed: {message}")]
    Request { index: String, message: String },

    /// A document or response lacked an expected field
    #[error("Document for index '{index}' is missing field '{field}'")]
    MissingField { index: String, field: String },

    #[error("Unknown index: {0}")]
    UnknownIndex(String),
}

/// Acknowledgement of a batch call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Documents the backend accepted (added, replaced or removed)
    pub accepted: usize,
}

/// Field name to backend type, as passed to [`SearchBackend::ensure_schema`].
pub type SchemaMap = BTreeMap<String, String>;

/// Abstract remote index store.
///
/// Index names passed in are already environment-qualified.
pub trait SearchBackend: Send + Sync {
    /// Name of this backend for logging.
    fn name(&self) -> &str;

    /// Add or replace documents. Each document carries its id field.
    fn add_batch(&self, index: &str, documents: Vec<WireDocument>)
        -> Result<BatchOutcome, BackendError>;

    /// Remove documents by id. Unknown ids are ignored.
    fn remove_batch(&self, index: &str, ids: &[String]) -> Result<BatchOutcome, BackendError>;

    fn get_by_ids(&self, index: &str, ids: &[String]) -> Result<Vec<WireDocument>, BackendError>;

    /// One page of stored documents in a stable order.
    fn list(&self, index: &str, offset: usize, limit: usize)
        -> Result<Vec<WireDocument>, BackendError>;

    fn total_count(&self, index: &str) -> Result<u64, BackendError>;

    /// Create the index if needed and add any missing fields.
    fn ensure_schema(&self, index: &str, schema: &SchemaMap) -> Result<(), BackendError>;

    /// Drop every document; returns how many were removed.
    fn remove_all(&self, index: &str) -> Result<u64, BackendError>;
}

/// A recorded backend call, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Add { index: String, ids: Vec<String> },
    Remove { index: String, ids: Vec<String> },
}

#[derive(Default)]
struct MemoryIndex {
    documents: IndexMap<String, WireDocument>,
    schema: SchemaMap,
}

#[derive(Default)]
struct BackendState {
    indexes: HashMap<String, MemoryIndex>,
    calls: Vec<BackendCall>,
    failures_pending: usize,
}

/// In-process backend keyed by a configurable id field.
///
/// Documents are kept in insertion order; re-adding an id replaces the
/// document in place.
pub struct InMemoryBackend {
    id_field: String,
    state: RwLock<BackendState>,
}

impl InMemoryBackend {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            state: RwLock::new(BackendState::default()),
        }
    }

    /// Make the next `n` add/remove calls fail with a request error.
    pub fn fail_next(&self, n: usize) {
        self.state.write().failures_pending = n;
    }

    /// Every add/remove call made so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.read().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    /// Stored document by id.
    pub fn document(&self, index: &str, id: &str) -> Option<WireDocument> {
        self.state
            .read()
            .indexes
            .get(index)
            .and_then(|i| i.documents.get(id).cloned())
    }

    /// Ids stored in `index`, in insertion order.
    pub fn ids(&self, index: &str) -> Vec<String> {
        self.state
            .read()
            .indexes
            .get(index)
            .map(|i| i.documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn schema(&self, index: &str) -> Option<SchemaMap> {
        self.state.read().indexes.get(index).map(|i| i.schema.clone())
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().indexes.keys().cloned().collect();
        names.sort();
        names
    }

    fn take_failure(state: &mut BackendState, index: &str) -> Result<(), BackendError> {
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return Err(BackendError::Request {
                index: index.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn id_of(&self, index: &str, document: &WireDocument) -> Result<String, BackendError> {
        match document.get(&self.id_field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(BackendError::MissingField {
                index: index.to_string(),
                field: self.id_field.clone(),
            }),
        }
    }
}

impl SearchBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn add_batch(
        &self,
        index: &str,
        documents: Vec<WireDocument>,
    ) -> Result<BatchOutcome, BackendError> {
        let keyed = documents
            .into_iter()
            .map(|doc| Ok((self.id_of(index, &doc)?, doc)))
            .collect::<Result<Vec<_>, BackendError>>()?;

        let mut state = self.state.write();
        Self::take_failure(&mut state, index)?;
        state.calls.push(BackendCall::Add {
            index: index.to_string(),
            ids: keyed.iter().map(|(id, _)| id.clone()).collect(),
        });

        let target = state.indexes.entry(index.to_string()).or_default();
        let accepted = keyed.len();
        for (id, doc) in keyed {
            target.documents.insert(id, doc);
        }
        debug!(index, accepted, "Memory backend add");
        Ok(BatchOutcome { accepted })
    }

    fn remove_batch(&self, index: &str, ids: &[String]) -> Result<BatchOutcome, BackendError> {
        let mut state = self.state.write();
        Self::take_failure(&mut state, index)?;
        state.calls.push(BackendCall::Remove {
            index: index.to_string(),
            ids: ids.to_vec(),
        });

        let accepted = match state.indexes.get_mut(index) {
            Some(target) => ids
                .iter()
                .filter(|id| target.documents.shift_remove(*id).is_some())
                .count(),
            None => 0,
        };
        debug!(index, accepted, "Memory backend remove");
        Ok(BatchOutcome { accepted })
    }

    fn get_by_ids(&self, index: &str, ids: &[String]) -> Result<Vec<WireDocument>, BackendError> {
        let state = self.state.read();
        let target = state
            .indexes
            .get(index)
            .ok_or_else(|| BackendError::UnknownIndex(index.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| target.documents.get(id).cloned())
            .collect())
    }

    fn list(
        &self,
        index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<WireDocument>, BackendError> {
        let state = self.state.read();
        Ok(state
            .indexes
            .get(index)
            .map(|i| {
                i.documents
                    .values()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn total_count(&self, index: &str) -> Result<u64, BackendError> {
        let state = self.state.read();
        Ok(state
            .indexes
            .get(index)
            .map(|i| i.documents.len() as u64)
            .unwrap_or(0))
    }

    fn ensure_schema(&self, index: &str, schema: &SchemaMap) -> Result<(), BackendError> {
        let mut state = self.state.write();
        let target = state.indexes.entry(index.to_string()).or_default();
        for (field, field_type) in schema {
            target
                .schema
                .entry(field.clone())
                .or_insert_with(|| field_type.clone());
        }
        Ok(())
    }

    fn remove_all(&self, index: &str) -> Result<u64, BackendError> {
        let mut state = self.state.write();
        let removed = state
            .indexes
            .get_mut(index)
            .map(|i| {
                let n = i.documents.len() as u64;
                i.documents.clear();
                n
            })
            .unwrap_or(0);
        Ok(removed)
    }
}

/// Backend that accepts every call and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl SearchBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn add_batch(
        &self,
        _index: &str,
        documents: Vec<WireDocument>,
    ) -> Result<BatchOutcome, BackendError> {
        Ok(BatchOutcome {
            accepted: documents.len(),
        })
    }

    fn remove_batch(&self, _index: &str, ids: &[String]) -> Result<BatchOutcome, BackendError> {
        Ok(BatchOutcome { accepted: ids.len() })
    }

    fn get_by_ids(&self, _index: &str, _ids: &[String]) -> Result<Vec<WireDocument>, BackendError> {
        Ok(Vec::new())
    }

    fn list(
        &self,
        _index: &str,
        _offset: usize,
        _limit: usize,
    ) -> Result<Vec<WireDocument>, BackendError> {
        Ok(Vec::new())
    }

    fn total_count(&self, _index: &str) -> Result<u64, BackendError> {
        Ok(0)
    }

    fn ensure_schema(&self, _index: &str, _schema: &SchemaMap) -> Result<(), BackendError> {
        Ok(())
    }

    fn remove_all(&self, _index: &str) -> Result<u64, BackendError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, title: &str) -> WireDocument {
        let mut d = WireDocument::new();
        d.insert("id".into(), json!(id));
        d.insert("title".into(), json!(title));
        d
    }

    #[test]
    fn test_add_replaces_by_id() {
        let backend = InMemoryBackend::new("id");
        backend
            .add_batch("main", vec![doc("a_1", "one"), doc("a_2", "two")])
            .unwrap();
        backend.add_batch("main", vec![doc("a_1", "uno")]).unwrap();

        assert_eq!(backend.total_count("main").unwrap(), 2);
        assert_eq!(backend.ids("main"), vec!["a_1", "a_2"]);
        assert_eq!(backend.document("main", "a_1").unwrap()["title"], json!("uno"));
    }

    #[test]
    fn test_add_requires_id_field() {
        let backend = InMemoryBackend::new("id");
        let mut bad = WireDocument::new();
        bad.insert("title".into(), json!("x"));
        let err = backend.add_batch("main", vec![bad]).unwrap_err();
        assert!(matches!(err, BackendError::MissingField { ref field, .. } if field == "id"));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_remove_and_list() {
        let backend = InMemoryBackend::new("id");
        let docs = (0..5).map(|i| doc(&format!("a_{i}"), "t")).collect();
        backend.add_batch("main", docs).unwrap();

        let page = backend.list("main", 1, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["id"], json!("a_1"));

        let outcome = backend
            .remove_batch("main", &["a_0".into(), "missing".into()])
            .unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(backend.total_count("main").unwrap(), 4);
        assert_eq!(backend.list("main", 0, 1).unwrap()[0]["id"], json!("a_1"));
    }

    #[test]
    fn test_unknown_index() {
        let backend = InMemoryBackend::new("id");
        assert_eq!(backend.total_count("nope").unwrap(), 0);
        assert!(backend.list("nope", 0, 10).unwrap().is_empty());
        assert_eq!(
            backend.get_by_ids("nope", &["x".into()]).unwrap_err(),
            BackendError::UnknownIndex("nope".into())
        );
    }

    #[test]
    fn test_schema_keeps_existing_types() {
        let backend = InMemoryBackend::new("id");
        let mut schema = SchemaMap::new();
        schema.insert("title".into(), "text".into());
        backend.ensure_schema("main", &schema).unwrap();

        schema.insert("title".into(), "date".into());
        schema.insert("created".into(), "date".into());
        backend.ensure_schema("main", &schema).unwrap();

        let stored = backend.schema("main").unwrap();
        assert_eq!(stored["title"], "text");
        assert_eq!(stored["created"], "date");
    }

    #[test]
    fn test_injected_failures() {
        let backend = InMemoryBackend::new("id");
        backend.fail_next(1);
        assert!(backend.add_batch("main", vec![doc("a_1", "t")]).is_err());
        assert!(backend.add_batch("main", vec![doc("a_1", "t")]).is_ok());
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_remove_all() {
        let backend = InMemoryBackend::new("id");
        backend
            .add_batch("main", vec![doc("a_1", "t"), doc("a_2", "t")])
            .unwrap();
        assert_eq!(backend.remove_all("main").unwrap(), 2);
        assert_eq!(backend.total_count("main").unwrap(), 0);
        assert_eq!(NullBackend.remove_all("main").unwrap(), 0);
    }
}
