//! In-process record store.
//!
//! Backs tests and the CLI's dry-run mode. Live records are kept per base
//! class ordered by id; every write also appends a timestamped snapshot so
//! that deleted versioned records can still be reconstructed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IndexingError;
use crate::model::DataModel;
use crate::record::{PublishState, Record, RecordRef, RecordStore, RelationList, Resolved};

fn default_visible() -> bool {
    true
}

/// Stored state of one record.
///
/// Relation fields hold target ids: a number (or null) for has-one, an
/// array of numbers for has-many and many-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub class: String,
    pub id: u64,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Fields holding values the indexer cannot flatten, by type name
    #[serde(default)]
    pub opaque: BTreeMap<String, String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub show_in_search: Option<bool>,
    /// `None` for unversioned records
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl RecordData {
    pub fn new(class: impl Into<String>, id: u64) -> Self {
        Self {
            class: class.into(),
            id,
            fields: BTreeMap::new(),
            opaque: BTreeMap::new(),
            visible: true,
            show_in_search: None,
            published: None,
            partition: None,
            content: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a has-one relation to the record with `id`.
    pub fn with_has_one(self, name: impl Into<String>, id: u64) -> Self {
        self.with_field(name, id)
    }

    /// Set a to-many relation to the records with `ids`.
    pub fn with_many(self, name: impl Into<String>, ids: &[u64]) -> Self {
        self.with_field(name, Value::from(ids.to_vec()))
    }

    pub fn with_opaque(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.opaque.insert(name.into(), type_name.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_show_in_search(mut self, show: bool) -> Self {
        self.show_in_search = Some(show);
        self
    }

    pub fn published(mut self) -> Self {
        self.published = Some(true);
        self
    }

    pub fn draft(mut self) -> Self {
        self.published = Some(false);
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn lookup<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<&'a V> {
        map.get(name).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}

/// Serialized store contents: a model and its records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFixture {
    pub model: DataModel,
    #[serde(default)]
    pub records: Vec<RecordData>,
}

#[derive(Default)]
struct StoreInner {
    live: BTreeMap<String, BTreeMap<u64, RecordData>>,
    history: BTreeMap<(String, u64), Vec<(DateTime<Utc>, RecordData)>>,
}

/// In-memory [`RecordStore`].
#[derive(Clone)]
pub struct MemoryStore {
    model: Arc<DataModel>,
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new(model: Arc<DataModel>) -> Self {
        Self {
            model,
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    /// Build a store from fixture data.
    pub fn from_fixture(fixture: StoreFixture) -> Self {
        let store = Self::new(Arc::new(fixture.model));
        for record in fixture.records {
            store.write(record);
        }
        store
    }

    pub fn model(&self) -> &Arc<DataModel> {
        &self.model
    }

    /// Insert or replace a live record, recording a snapshot now.
    pub fn write(&self, record: RecordData) {
        self.write_at(record, Utc::now());
    }

    /// Insert or replace a live record, recording a snapshot at `at`.
    pub fn write_at(&self, record: RecordData, at: DateTime<Utc>) {
        let base = self.model.base_class(&record.class);
        let mut inner = self.inner.write();
        inner
            .history
            .entry((base.clone(), record.id))
            .or_default()
            .push((at, record.clone()));
        inner.live.entry(base).or_default().insert(record.id, record);
    }

    /// Remove a live record; its snapshots are kept.
    pub fn delete(&self, class: &str, id: u64) -> Option<RecordData> {
        let base = self.model.base_class(class);
        self.inner.write().live.get_mut(&base)?.remove(&id)
    }

    /// Drop every snapshot of a record, as a retention sweep would.
    pub fn purge_history(&self, class: &str, id: u64) -> usize {
        let base = self.model.base_class(class);
        self.inner
            .write()
            .history
            .remove(&(base, id))
            .map_or(0, |versions| versions.len())
    }

    /// Current stored data of a live record.
    pub fn get_data(&self, class: &str, id: u64) -> Option<RecordData> {
        let base = self.model.base_class(class);
        self.inner.read().live.get(&base)?.get(&id).cloned()
    }

    fn wrap(&self, data: RecordData) -> RecordRef {
        Arc::new(MemoryRecord {
            data,
            store: self.clone(),
        })
    }

    fn live_record(&self, class: &str, id: u64) -> Option<RecordRef> {
        let data = self.get_data(class, id)?;
        if !self.model.is_a(&data.class, class) {
            return None;
        }
        Some(self.wrap(data))
    }
}

impl RecordStore for MemoryStore {
    fn fetch_page(
        &self,
        class: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecordRef>, IndexingError> {
        let base = self.model.base_class(class);
        let page: Vec<RecordData> = {
            let inner = self.inner.read();
            match inner.live.get(&base) {
                Some(table) => table
                    .values()
                    .filter(|r| self.model.is_a(&r.class, class))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };
        Ok(page.into_iter().map(|d| self.wrap(d)).collect())
    }

    fn fetch_by_id(&self, class: &str, id: u64) -> Result<Option<RecordRef>, IndexingError> {
        Ok(self.live_record(class, id))
    }

    fn fetch_snapshot(
        &self,
        class: &str,
        id: u64,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<RecordRef>, IndexingError> {
        let base = self.model.base_class(class);
        let snapshot = {
            let inner = self.inner.read();
            inner.history.get(&(base, id)).and_then(|versions| {
                versions
                    .iter()
                    .rev()
                    .find(|(ts, _)| at.map(|at| *ts <= at).unwrap_or(true))
                    .map(|(_, data)| data.clone())
            })
        };
        Ok(snapshot
            .filter(|d| self.model.is_a(&d.class, class))
            .map(|d| self.wrap(d)))
    }

    fn count(&self, class: &str) -> Result<u64, IndexingError> {
        let base = self.model.base_class(class);
        let inner = self.inner.read();
        Ok(inner
            .live
            .get(&base)
            .map(|t| t.values().filter(|r| self.model.is_a(&r.class, class)).count() as u64)
            .unwrap_or(0))
    }
}

/// A record served by [`MemoryStore`]; relations resolve against live data.
pub struct MemoryRecord {
    data: RecordData,
    store: MemoryStore,
}

impl std::fmt::Debug for MemoryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecord")
            .field("class", &self.data.class)
            .field("id", &self.data.id)
            .finish()
    }
}

impl MemoryRecord {
    fn related_ids(value: Option<&Value>) -> Vec<u64> {
        match value {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_u64).collect(),
            Some(v) => v.as_u64().into_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Record for MemoryRecord {
    fn class_name(&self) -> &str {
        &self.data.class
    }

    fn id(&self) -> u64 {
        self.data.id
    }

    fn get(&self, name: &str) -> Option<Resolved> {
        let model = &self.store.model;
        if let Some((key, relation)) = model.relation(&self.data.class, name) {
            let ids = Self::related_ids(RecordData::lookup(&self.data.fields, key));
            let records: Vec<RecordRef> = ids
                .into_iter()
                .filter_map(|id| self.store.live_record(&relation.target, id))
                .collect();
            return Some(if relation.kind.is_to_many() {
                Resolved::Many(RelationList::new(relation.target.clone(), records))
            } else {
                Resolved::One {
                    target: relation.target.clone(),
                    record: records.into_iter().next(),
                }
            });
        }

        if let Some(type_name) = RecordData::lookup(&self.data.opaque, name) {
            return Some(Resolved::Opaque(type_name.clone()));
        }
        if let Some(value) = RecordData::lookup(&self.data.fields, name) {
            return Some(Resolved::Value(value.clone()));
        }
        if name.eq_ignore_ascii_case("id") {
            return Some(Resolved::Value(Value::from(self.data.id)));
        }
        if name.eq_ignore_ascii_case("classname") {
            return Some(Resolved::Value(Value::from(self.data.class.clone())));
        }
        None
    }

    fn is_visible_to_anonymous(&self) -> bool {
        self.data.visible
    }

    fn show_in_search(&self) -> Option<bool> {
        self.data.show_in_search
    }

    fn publish_state(&self) -> Option<PublishState> {
        self.data.published.map(|p| {
            if p {
                PublishState::Published
            } else {
                PublishState::Draft
            }
        })
    }

    fn partition_key(&self) -> Option<String> {
        self.data.partition.clone()
    }

    fn page_content(&self) -> Option<String> {
        self.data.content.clone()
    }
}
