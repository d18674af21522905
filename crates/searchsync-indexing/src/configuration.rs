//! Index configuration resolver.
//!
//! Answers "which indexes apply to this class / document" and "which fields
//! does this class export", merging the static index definitions with the
//! class hierarchy of the data model. Per-class results are cached until the
//! definitions are replaced.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use searchsync_types::{ClassSpec, ConfigError, Field, IndexDefinition, IndexDefinitions};
use tracing::debug;

use crate::document::{identifier_prefix, Document};
use crate::model::DataModel;

/// Indexes applicable to a class or document, in definition order.
pub type IndexSelection = IndexMap<String, IndexDefinition>;

/// Extension point that narrows the indexes chosen for a document.
///
/// Filters can only drop indexes; they are never given a way to add one.
pub trait IndexFilter: Send + Sync {
    /// Keep `index` for `document`?
    fn retain(&self, document: &dyn Document, index: &str, definition: &IndexDefinition) -> bool;

    fn name(&self) -> &str;
}

/// Routes documents to indexes whose `routing_key` matches their partition.
///
/// Indexes without a routing key accept every partition.
pub struct PartitionFilter;

impl IndexFilter for PartitionFilter {
    fn retain(&self, document: &dyn Document, _index: &str, definition: &IndexDefinition) -> bool {
        match definition.routing_key_str() {
            None => true,
            Some(key) => document.partition_key().as_deref() == Some(key.as_str()),
        }
    }

    fn name(&self) -> &str {
        "partition"
    }
}

/// Process-wide view of which classes are indexed where.
pub struct IndexConfiguration {
    model: Arc<DataModel>,
    definitions: RwLock<IndexDefinitions>,
    filters: Vec<Box<dyn IndexFilter>>,
    class_cache: RwLock<HashMap<String, Arc<IndexSelection>>>,
}

impl IndexConfiguration {
    pub fn new(model: Arc<DataModel>, definitions: IndexDefinitions) -> Self {
        Self {
            model,
            definitions: RwLock::new(definitions),
            filters: Vec::new(),
            class_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Append an extension filter; filters run in registration order.
    pub fn with_filter(mut self, filter: Box<dyn IndexFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn model(&self) -> &Arc<DataModel> {
        &self.model
    }

    /// Snapshot of the current definitions.
    pub fn definitions(&self) -> IndexDefinitions {
        self.definitions.read().clone()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    /// Replace the definitions and drop every cached resolution.
    pub fn replace_definitions(&self, definitions: IndexDefinitions) {
        *self.definitions.write() = definitions;
        self.class_cache.write().clear();
        debug!("Index definitions replaced, class cache cleared");
    }

    /// The nearest spec for `class` in one index: the entry for the class
    /// itself, else for its closest configured ancestor.
    fn nearest_spec<'a>(&self, definition: &'a IndexDefinition, class: &str) -> Option<&'a ClassSpec> {
        self.model
            .ancestry(class)
            .iter()
            .find_map(|ancestor| definition.include_classes.get(ancestor))
    }

    /// Indexes that include `class`, directly or through an ancestor.
    ///
    /// An explicit `false` for the class (or a nearer ancestor) excludes it.
    pub fn indexes_for_class(&self, class: &str) -> Arc<IndexSelection> {
        if let Some(hit) = self.class_cache.read().get(class) {
            return hit.clone();
        }

        let selection: IndexSelection = self
            .definitions
            .read()
            .iter()
            .filter(|(_, def)| {
                self.nearest_spec(def, class)
                    .map(|spec| !spec.is_excluded())
                    .unwrap_or(false)
            })
            .map(|(name, def)| (name.clone(), def.clone()))
            .collect();

        let selection = Arc::new(selection);
        self.class_cache
            .write()
            .insert(class.to_string(), selection.clone());
        selection
    }

    /// Indexes for a document: the class selection narrowed by every filter.
    pub fn indexes_for_document(&self, document: &dyn Document) -> IndexSelection {
        let mut selection = (*self.indexes_for_class(document.source_class())).clone();
        for filter in &self.filters {
            selection.retain(|name, def| {
                let keep = filter.retain(document, name, def);
                if !keep {
                    debug!(
                        filter = filter.name(),
                        index = %name,
                        document = %document.identifier(),
                        "Index filtered out"
                    );
                }
                keep
            });
        }
        selection
    }

    pub fn is_class_indexed(&self, class: &str) -> bool {
        !self.indexes_for_class(class).is_empty()
    }

    /// Exported fields for `class`, walking from the class up its ancestry.
    ///
    /// The most derived declaration of a name wins. Declaring the same name
    /// again with a different `type` is a configuration error.
    pub fn fields_for_class(&self, class: &str) -> Result<Vec<Field>, ConfigError> {
        let indexes = self.indexes_for_class(class);
        let mut fields: IndexMap<String, Field> = IndexMap::new();

        for ancestor in self.model.ancestry(class) {
            for def in indexes.values() {
                let Some(spec) = def.include_classes.get(&ancestor) else {
                    continue;
                };
                for field in spec.fields() {
                    merge_field(&mut fields, field, class)?;
                }
            }
        }
        Ok(fields.into_values().collect())
    }

    /// Every field any class contributes to one index.
    pub fn fields_for_index(&self, index: &str) -> Result<Vec<Field>, ConfigError> {
        let definitions = self.definitions.read();
        let mut fields: IndexMap<String, Field> = IndexMap::new();
        if let Some(def) = definitions.get(index) {
            for (class, spec) in &def.include_classes {
                for field in spec.fields() {
                    merge_field(&mut fields, field, class)?;
                }
            }
        }
        Ok(fields.into_values().collect())
    }

    /// Every class included (not excluded) by any index, in definition order.
    pub fn searchable_classes(&self) -> Vec<String> {
        let mut classes: IndexSet<String> = IndexSet::new();
        for def in self.definitions.read().values() {
            for (class, spec) in &def.include_classes {
                if !spec.is_excluded() {
                    classes.insert(class.clone());
                }
            }
        }
        classes.into_iter().collect()
    }

    /// Searchable classes that are not subtypes of another searchable class.
    pub fn searchable_base_classes(&self) -> Vec<String> {
        let classes = self.searchable_classes();
        classes
            .iter()
            .filter(|class| {
                !classes
                    .iter()
                    .any(|other| other != *class && self.model.is_a(class, other))
            })
            .cloned()
            .collect()
    }

    /// Reject indexed base classes whose document ids would collide.
    pub fn validate_identifiers(&self) -> Result<(), ConfigError> {
        let mut prefixes: HashMap<String, String> = HashMap::new();
        for class in self.searchable_classes() {
            let base = self.model.base_class(&class);
            let prefix = identifier_prefix(&base);
            match prefixes.get(&prefix) {
                Some(existing) if *existing != base => {
                    return Err(ConfigError::IdentifierCollision {
                        first: existing.clone(),
                        second: base,
                        prefix,
                    });
                }
                Some(_) => {}
                None => {
                    prefixes.insert(prefix, base);
                }
            }
        }
        Ok(())
    }
}

fn merge_field(
    fields: &mut IndexMap<String, Field>,
    field: Field,
    class: &str,
) -> Result<(), ConfigError> {
    match fields.get(field.search_field_name()) {
        None => {
            fields.insert(field.search_field_name().to_string(), field);
            Ok(())
        }
        Some(existing) => match (existing.field_type(), field.field_type()) {
            (Some(a), Some(b)) if a != b => Err(ConfigError::IncompatibleField {
                field: field.search_field_name().to_string(),
                class: class.to_string(),
                existing: a.to_string(),
                incoming: b.to_string(),
            }),
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassDef;
    use searchsync_types::parse_index_definitions;

    fn model() -> Arc<DataModel> {
        Arc::new(
            DataModel::new()
                .with_class("Base", ClassDef::new())
                .with_class("Sub", ClassDef::new().extends("Base"))
                .with_class("SubSub", ClassDef::new().extends("Sub"))
                .with_class("Other", ClassDef::new()),
        )
    }

    fn configuration(toml: &str) -> IndexConfiguration {
        IndexConfiguration::new(model(), parse_index_definitions(toml).unwrap())
    }

    const INHERITANCE: &str = r#"
[index1.include_classes.Base.fields]
title = true

[index2.include_classes.Base.fields]
title = { options = { type = "text" } }

[index3.include_classes.Sub.fields]
summary = true
"#;

    fn names(selection: &IndexSelection) -> Vec<&str> {
        selection.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_indexes_for_class_follow_inheritance() {
        let config = configuration(INHERITANCE);
        assert_eq!(
            names(&config.indexes_for_class("Sub")),
            vec!["index1", "index2", "index3"]
        );
        assert_eq!(names(&config.indexes_for_class("Base")), vec!["index1", "index2"]);
        assert_eq!(
            names(&config.indexes_for_class("SubSub")),
            vec!["index1", "index2", "index3"]
        );
        assert!(config.indexes_for_class("Other").is_empty());
        assert!(!config.is_class_indexed("Other"));
    }

    #[test]
    fn test_explicit_exclusion_overrides_ancestor() {
        let config = configuration(
            r#"
[main.include_classes]
Sub = false

[main.include_classes.Base.fields]
title = true
"#,
        );
        assert!(config.is_class_indexed("Base"));
        assert!(!config.is_class_indexed("Sub"));
        assert!(!config.is_class_indexed("SubSub"));
        assert_eq!(config.searchable_classes(), vec!["Base"]);
    }

    #[test]
    fn test_cache_invalidated_on_replace() {
        let config = configuration(INHERITANCE);
        assert_eq!(config.indexes_for_class("Base").len(), 2);

        config.replace_definitions(parse_index_definitions("[solo.include_classes.Base]\n").unwrap());
        assert_eq!(names(&config.indexes_for_class("Base")), vec!["solo"]);
        assert!(config.indexes_for_class("Sub").len() == 1);
    }

    #[test]
    fn test_fields_for_class_merges_hierarchy() {
        let config = configuration(INHERITANCE);
        let fields = config.fields_for_class("Sub").unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.search_field_name()).collect();
        assert_eq!(names, vec!["summary", "title"]);

        let base = config.fields_for_class("Base").unwrap();
        assert_eq!(base.len(), 1);
    }

    #[test]
    fn test_most_derived_field_wins() {
        let config = configuration(
            r#"
[main.include_classes.Base.fields]
title = { property = "Title" }

[main.include_classes.Sub.fields]
title = { property = "MenuTitle" }
"#,
        );
        let fields = config.fields_for_class("Sub").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].property(), Some("MenuTitle"));
    }

    #[test]
    fn test_incompatible_field_types_rejected() {
        let config = configuration(
            r#"
[main.include_classes.Base.fields]
created = { options = { type = "date" } }

[main.include_classes.Sub.fields]
created = { options = { type = "text" } }
"#,
        );
        let err = config.fields_for_class("Sub").unwrap_err();
        assert!(matches!(err, ConfigError::IncompatibleField { .. }));

        let err = config.fields_for_index("main").unwrap_err();
        assert!(err.to_string().contains("created"));
    }

    #[test]
    fn test_fields_for_index() {
        let config = configuration(INHERITANCE);
        let fields = config.fields_for_index("index2").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field_type(), Some("text"));
        assert!(config.fields_for_index("missing").unwrap().is_empty());
    }

    #[test]
    fn test_searchable_base_classes() {
        let config = configuration(INHERITANCE);
        assert_eq!(config.searchable_classes(), vec!["Base", "Sub"]);
        assert_eq!(config.searchable_base_classes(), vec!["Base"]);
    }

    #[test]
    fn test_colliding_identifier_prefixes_rejected() {
        let config = configuration(INHERITANCE);
        assert_eq!(config.validate_identifiers(), Ok(()));

        let model = DataModel::new()
            .with_class("My.Page", ClassDef::new())
            .with_class("my_page", ClassDef::new());
        let toml = r#"
[main.include_classes."My.Page"]
[main.include_classes.my_page]
"#;
        let definitions = parse_index_definitions(toml).unwrap();
        let config = IndexConfiguration::new(Arc::new(model), definitions);
        let err = config.validate_identifiers().unwrap_err();
        assert_eq!(
            err,
            ConfigError::IdentifierCollision {
                first: "My.Page".into(),
                second: "my_page".into(),
                prefix: "my_page".into(),
            }
        );
    }
}
