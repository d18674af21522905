//! Record store contract.
//!
//! The record store is an external collaborator. The indexing core only
//! needs paged reads, lookups by id, historical snapshots and counts.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::IndexingError;

/// Shared handle to a record.
pub type RecordRef = Arc<dyn Record>;

/// Draft/published lifecycle state of a versioned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Draft,
    Published,
}

/// Records reached through a to-many relation.
#[derive(Debug, Clone)]
pub struct RelationList {
    /// Declared target class of the relation
    pub target: String,
    pub records: Vec<RecordRef>,
}

impl RelationList {
    pub fn new(target: impl Into<String>, records: Vec<RecordRef>) -> Self {
        Self {
            target: target.into(),
            records,
        }
    }

    pub fn ids(&self) -> Vec<u64> {
        self.records.iter().map(|r| r.id()).collect()
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.records.iter().any(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The outcome of resolving one accessor on a record.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Plain value: scalar, list, or map
    Value(Value),
    /// An object graph that cannot be flattened; carries its type name
    Opaque(String),
    /// To-one relation
    One {
        target: String,
        record: Option<RecordRef>,
    },
    /// To-many relation
    Many(RelationList),
}

/// One record in the store.
pub trait Record: Send + Sync + fmt::Debug {
    /// Concrete class of the record.
    fn class_name(&self) -> &str;

    /// Primary key, unique within the record's base class.
    fn id(&self) -> u64;

    /// Resolve a field or relation accessor by name.
    fn get(&self, name: &str) -> Option<Resolved>;

    /// Whether an unauthenticated visitor may see this record.
    fn is_visible_to_anonymous(&self) -> bool {
        true
    }

    /// Explicit "include in search" flag, if the class has one.
    fn show_in_search(&self) -> Option<bool> {
        None
    }

    /// Lifecycle state; `None` for records without drafts.
    fn publish_state(&self) -> Option<PublishState> {
        None
    }

    /// Tenant/partition the record belongs to.
    fn partition_key(&self) -> Option<String> {
        None
    }

    /// Rendered page content for full-text crawling.
    fn page_content(&self) -> Option<String> {
        None
    }
}

/// Paged, id-addressable access to records.
///
/// `fetch_page` must order results by a stable key so that advancing the
/// offset never skips or repeats a record.
pub trait RecordStore: Send + Sync {
    /// Records of `class` (including subclasses), ordered by primary key.
    fn fetch_page(
        &self,
        class: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecordRef>, IndexingError>;

    /// Live record by id.
    fn fetch_by_id(&self, class: &str, id: u64) -> Result<Option<RecordRef>, IndexingError>;

    /// Historical snapshot at `at`, or the latest snapshot when `at` is `None`.
    fn fetch_snapshot(
        &self,
        class: &str,
        id: u64,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<RecordRef>, IndexingError>;

    /// Number of records of `class` (including subclasses).
    fn count(&self, class: &str) -> Result<u64, IndexingError>;

    /// Number of records of `class` matching a predicate.
    ///
    /// The default implementation pages through the class.
    fn count_where(
        &self,
        class: &str,
        predicate: &dyn Fn(&dyn Record) -> bool,
    ) -> Result<u64, IndexingError> {
        const PAGE: usize = 500;
        let mut offset = 0;
        let mut matched = 0;
        loop {
            let page = self.fetch_page(class, PAGE, offset)?;
            matched += page.iter().filter(|r| predicate(r.as_ref())).count() as u64;
            if page.len() < PAGE {
                return Ok(matched);
            }
            offset += PAGE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Stub(u64);

    impl Record for Stub {
        fn class_name(&self) -> &str {
            "Tag"
        }
        fn id(&self) -> u64 {
            self.0
        }
        fn get(&self, _name: &str) -> Option<Resolved> {
            None
        }
    }

    #[test]
    fn test_relation_list_ids() {
        let list = RelationList::new(
            "Tag",
            vec![Arc::new(Stub(3)) as RecordRef, Arc::new(Stub(9))],
        );
        assert_eq!(list.ids(), vec![3, 9]);
        assert!(list.contains_id(9));
        assert!(!list.contains_id(4));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_record_defaults() {
        let record = Stub(1);
        assert!(record.is_visible_to_anonymous());
        assert!(record.show_in_search().is_none());
        assert!(record.publish_state().is_none());
        assert!(record.partition_key().is_none());
    }
}
