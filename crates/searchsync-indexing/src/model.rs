//! Data model: class hierarchy and relation metadata of the record store.
//!
//! The model is schema-only. It answers subtype questions for index routing
//! and tells path resolution which accessor names are relations and what
//! they point at, without touching any record.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasOne,
    HasMany,
    ManyMany,
}

impl RelationKind {
    pub fn is_to_many(&self) -> bool {
        !matches!(self, RelationKind::HasOne)
    }
}

/// A named relation from one class to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub kind: RelationKind,
    pub target: String,
}

/// One record class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Direct parent class; `None` for base classes
    #[serde(default)]
    pub parent: Option<String>,

    /// Whether historical snapshots exist for this class
    #[serde(default)]
    pub versioned: bool,

    #[serde(default)]
    pub relations: IndexMap<String, RelationDef>,
}

impl ClassDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    pub fn has_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, RelationKind::HasOne, target)
    }

    pub fn has_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, RelationKind::HasMany, target)
    }

    pub fn many_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, RelationKind::ManyMany, target)
    }

    fn relation(
        mut self,
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            name.into(),
            RelationDef {
                kind,
                target: target.into(),
            },
        );
        self
    }
}

/// The set of record classes known to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    #[serde(default)]
    classes: IndexMap<String, ClassDef>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class.
    pub fn with_class(mut self, name: impl Into<String>, def: ClassDef) -> Self {
        self.classes.insert(name.into(), def);
        self
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn class(&self, class: &str) -> Option<&ClassDef> {
        self.classes.get(class)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// The class followed by its ancestors, most derived first.
    ///
    /// Unknown classes yield just themselves. A parent cycle in the model
    /// stops at the first repeated class.
    pub fn ancestry(&self, class: &str) -> Vec<String> {
        let mut chain = vec![class.to_string()];
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(class);

        let mut current = self.classes.get(class).and_then(|c| c.parent.as_deref());
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent.to_string());
            current = self.classes.get(parent).and_then(|c| c.parent.as_deref());
        }
        chain
    }

    /// Whether `class` equals `ancestor` or transitively extends it.
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        class == ancestor || self.ancestry(class).iter().any(|c| c == ancestor)
    }

    /// Topmost ancestor of a class (the class itself for base classes).
    pub fn base_class(&self, class: &str) -> String {
        self.ancestry(class)
            .pop()
            .unwrap_or_else(|| class.to_string())
    }

    /// Whether the class (or any ancestor) keeps historical snapshots.
    pub fn is_versioned(&self, class: &str) -> bool {
        self.ancestry(class)
            .iter()
            .any(|c| self.classes.get(c).map(|d| d.versioned).unwrap_or(false))
    }

    /// Look up a relation by name on a class or its ancestors.
    ///
    /// Exact names win; otherwise an ASCII case-insensitive match is accepted.
    pub fn relation(&self, class: &str, name: &str) -> Option<(&str, &RelationDef)> {
        let chain = self.ancestry(class);
        for ancestor in &chain {
            if let Some((key, def)) = self
                .classes
                .get(ancestor)
                .and_then(|c| c.relations.get_key_value(name))
            {
                return Some((key.as_str(), def));
            }
        }
        for ancestor in &chain {
            if let Some((key, def)) = self.classes.get(ancestor).and_then(|c| {
                c.relations
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
            }) {
                return Some((key.as_str(), def));
            }
        }
        None
    }
}
