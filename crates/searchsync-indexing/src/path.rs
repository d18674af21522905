//! Dot-path resolution over the record graph.
//!
//! A path like `"Images.Tags.Title"` is consumed left to right. Single
//! records resolve the next segment as a field or relation accessor. A
//! to-many list maps a plain field across its members (yielding a list of
//! scalars) or joins a further relation into one flat list.
//!
//! Alongside the value, resolution reports the *dependency source*: the
//! intermediate record or list that produced the value, or `None` when the
//! value came straight off the root record.

use searchsync_types::ConfigError;
use serde_json::Value;

use crate::model::DataModel;
use crate::record::{RecordRef, RelationList, Resolved};

/// Where a resolved value came from, when not the root record itself.
#[derive(Debug, Clone)]
pub enum DependencySource {
    One(RecordRef),
    Many(RelationList),
}

impl DependencySource {
    /// Whether the source contains the record `(class, id)`.
    pub fn references(&self, model: &DataModel, class: &str, id: u64) -> bool {
        match self {
            DependencySource::One(record) => {
                record.id() == id && model.base_class(record.class_name()) == model.base_class(class)
            }
            DependencySource::Many(list) => list
                .records
                .iter()
                .any(|r| r.id() == id && model.base_class(r.class_name()) == model.base_class(class)),
        }
    }
}

/// Result of resolving a path on a record.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub dependency: Option<DependencySource>,
    pub value: Resolved,
}

enum Subject {
    One { record: RecordRef, is_root: bool },
    Many(RelationList),
}

fn unresolvable(path: &str, segment: &str, subject: &str) -> ConfigError {
    ConfigError::UnresolvablePath {
        path: path.to_string(),
        segment: segment.to_string(),
        subject: subject.to_string(),
    }
}

/// Resolve `path` against `root`.
pub fn resolve_path(root: &RecordRef, path: &str) -> Result<Resolution, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(unresolvable(path, "", root.class_name()));
    }

    let mut subject = Subject::One {
        record: root.clone(),
        is_root: true,
    };

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        subject = match subject {
            Subject::One { record, is_root } => {
                let resolved = record
                    .get(segment)
                    .ok_or_else(|| unresolvable(path, segment, record.class_name()))?;
                let source = || {
                    if is_root {
                        None
                    } else {
                        Some(DependencySource::One(record.clone()))
                    }
                };
                match resolved {
                    Resolved::Value(_) | Resolved::Opaque(_) => {
                        if !is_last {
                            return Err(unresolvable(path, segments[i + 1], segment));
                        }
                        return Ok(Resolution {
                            dependency: source(),
                            value: resolved,
                        });
                    }
                    Resolved::One { target, record: next } => {
                        if is_last {
                            return Ok(Resolution {
                                dependency: source(),
                                value: Resolved::One { target, record: next },
                            });
                        }
                        match next {
                            Some(next) => Subject::One {
                                record: next,
                                is_root: false,
                            },
                            // An unset to-one relation resolves every field on it to null.
                            None => {
                                return Ok(Resolution {
                                    dependency: None,
                                    value: Resolved::Value(Value::Null),
                                })
                            }
                        }
                    }
                    Resolved::Many(list) => {
                        if is_last {
                            return Ok(Resolution {
                                dependency: Some(DependencySource::Many(list.clone())),
                                value: Resolved::Many(list),
                            });
                        }
                        Subject::Many(list)
                    }
                }
            }
            Subject::Many(list) => {
                let mut values = Vec::new();
                let mut joined: Vec<RecordRef> = Vec::new();
                let mut joined_target: Option<String> = None;

                for member in &list.records {
                    match member
                        .get(segment)
                        .ok_or_else(|| unresolvable(path, segment, member.class_name()))?
                    {
                        Resolved::Value(v) => values.push(v),
                        Resolved::Opaque(type_name) => {
                            return Ok(Resolution {
                                dependency: Some(DependencySource::Many(list.clone())),
                                value: Resolved::Opaque(type_name),
                            })
                        }
                        Resolved::One { target, record } => {
                            joined_target.get_or_insert(target);
                            joined.extend(record);
                        }
                        Resolved::Many(inner) => {
                            joined_target.get_or_insert(inner.target);
                            joined.extend(inner.records);
                        }
                    }
                }

                if let Some(target) = joined_target {
                    let joined = RelationList::new(target, joined);
                    if is_last {
                        return Ok(Resolution {
                            dependency: Some(DependencySource::Many(joined.clone())),
                            value: Resolved::Many(joined),
                        });
                    }
                    Subject::Many(joined)
                } else {
                    if !is_last && !values.is_empty() {
                        return Err(unresolvable(path, segments[i + 1], segment));
                    }
                    // Empty lists and plain fields both end here.
                    return Ok(Resolution {
                        dependency: Some(DependencySource::Many(list)),
                        value: Resolved::Value(Value::Array(values)),
                    });
                }
            }
        };
    }

    // The loop always returns on the last segment.
    Err(unresolvable(path, "", root.class_name()))
}

/// Shape of the dependency a path creates, derived from the model alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyShape {
    /// Class of the record(s) the value is read from
    pub target: String,
    pub to_many: bool,
}

/// Work out which class a field path reads its value from.
///
/// Returns `None` when the value comes straight off `class` itself. Plain
/// (non-relation) segments are only allowed at the end of the path.
pub fn dependency_shape(
    model: &DataModel,
    class: &str,
    path: &str,
) -> Result<Option<DependencyShape>, ConfigError> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = class.to_string();
    let mut shape: Option<DependencyShape> = None;

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        match model.relation(&current, segment) {
            Some((_, relation)) => {
                let to_many =
                    relation.kind.is_to_many() || shape.as_ref().map(|s| s.to_many).unwrap_or(false);
                current = relation.target.clone();
                shape = Some(DependencyShape {
                    target: current.clone(),
                    to_many,
                });
            }
            None if is_last => {}
            None => return Err(unresolvable(path, segment, &current)),
        }
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassDef;
    use crate::record::RecordStore;
    use crate::store::{MemoryStore, RecordData};
    use serde_json::json;
    use std::sync::Arc;

    fn model() -> DataModel {
        DataModel::new()
            .with_class(
                "Article",
                ClassDef::new()
                    .many_many("Tags", "Tag")
                    .has_many("Images", "Image")
                    .has_one("Author", "Member"),
            )
            .with_class("Image", ClassDef::new().many_many("Tags", "Tag"))
            .with_class("Member", ClassDef::new().has_one("Company", "Company"))
            .with_class("Company", ClassDef::new())
            .with_class("Tag", ClassDef::new())
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new(Arc::new(model()));
        store.write(RecordData::new("Tag", 1).with_field("Title", "rust"));
        store.write(RecordData::new("Tag", 2).with_field("Title", "search"));
        store.write(RecordData::new("Tag", 3).with_field("Title", "cats"));
        store.write(RecordData::new("Company", 8).with_field("Name", "Acme"));
        store.write(
            RecordData::new("Member", 4)
                .with_field("Name", "Ada")
                .with_has_one("Company", 8),
        );
        store.write(RecordData::new("Image", 10).with_many("Tags", &[3]));
        store.write(RecordData::new("Image", 11).with_many("Tags", &[1]));
        store.write(
            RecordData::new("Article", 1)
                .with_field("Title", "Indexing")
                .with_field("Meta", json!({"a": 1}))
                .with_many("Tags", &[1, 2])
                .with_many("Images", &[10, 11])
                .with_has_one("Author", 4),
        );
        store.write(RecordData::new("Article", 2).with_field("Title", "Empty"));
        store
    }

    fn article(id: u64) -> RecordRef {
        store().fetch_by_id("Article", id).unwrap().unwrap()
    }

    #[test]
    fn test_root_field_has_no_dependency() {
        let res = resolve_path(&article(1), "Title").unwrap();
        assert!(res.dependency.is_none());
        assert!(matches!(res.value, Resolved::Value(v) if v == json!("Indexing")));
    }

    #[test]
    fn test_to_many_field_maps_across_members() {
        let res = resolve_path(&article(1), "Tags.Title").unwrap();
        assert!(matches!(res.value, Resolved::Value(v) if v == json!(["rust", "search"])));
        match res.dependency {
            Some(DependencySource::Many(list)) => {
                assert_eq!(list.target, "Tag");
                assert_eq!(list.ids(), vec![1, 2]);
            }
            other => panic!("expected list dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_to_many_joins_lists() {
        let res = resolve_path(&article(1), "Images.Tags.Title").unwrap();
        assert!(matches!(res.value, Resolved::Value(v) if v == json!(["cats", "rust"])));
        match res.dependency {
            Some(DependencySource::Many(list)) => assert_eq!(list.ids(), vec![3, 1]),
            other => panic!("expected joined list, got {:?}", other),
        }
    }

    #[test]
    fn test_to_one_chain_reports_last_intermediate() {
        let res = resolve_path(&article(1), "Author.Company.Name").unwrap();
        assert!(matches!(res.value, Resolved::Value(v) if v == json!("Acme")));
        match res.dependency {
            Some(DependencySource::One(record)) => {
                assert_eq!(record.class_name(), "Company");
                assert_eq!(record.id(), 8);
            }
            other => panic!("expected record dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_relation_returns_list_as_value_and_dependency() {
        let res = resolve_path(&article(1), "Tags").unwrap();
        assert!(matches!(res.value, Resolved::Many(_)));
        assert!(matches!(res.dependency, Some(DependencySource::Many(_))));
    }

    #[test]
    fn test_unset_to_one_resolves_null() {
        let res = resolve_path(&article(2), "Author.Name").unwrap();
        assert!(matches!(res.value, Resolved::Value(Value::Null)));
        assert!(res.dependency.is_none());
    }

    #[test]
    fn test_empty_list_yields_empty_array() {
        let res = resolve_path(&article(2), "Tags.Title").unwrap();
        assert!(matches!(res.value, Resolved::Value(v) if v == json!([])));
    }

    #[test]
    fn test_unresolvable_segment_is_named() {
        let err = resolve_path(&article(1), "Nope").unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnresolvablePath {
                path: "Nope".into(),
                segment: "Nope".into(),
                subject: "Article".into(),
            }
        );

        let err = resolve_path(&article(1), "Title.Length").unwrap_err();
        assert!(err.to_string().contains("'Length'"));

        let err = resolve_path(&article(1), "Tags.Missing").unwrap_err();
        assert!(err.to_string().contains("on Tag"));
    }

    #[test]
    fn test_dependency_shape() {
        let model = model();
        assert_eq!(dependency_shape(&model, "Article", "Title").unwrap(), None);
        assert_eq!(
            dependency_shape(&model, "Article", "Tags.Title").unwrap(),
            Some(DependencyShape {
                target: "Tag".into(),
                to_many: true
            })
        );
        assert_eq!(
            dependency_shape(&model, "Article", "Author.Company.Name").unwrap(),
            Some(DependencyShape {
                target: "Company".into(),
                to_many: false
            })
        );
        assert_eq!(
            dependency_shape(&model, "Article", "Images.Tags.Title")
                .unwrap()
                .map(|s| s.target),
            Some("Tag".to_string())
        );
        assert!(dependency_shape(&model, "Article", "Title.Length").is_err());
    }

    #[test]
    fn test_dependency_source_references() {
        let model = model();
        let res = resolve_path(&article(1), "Tags.Title").unwrap();
        let dep = res.dependency.unwrap();
        assert!(dep.references(&model, "Tag", 2));
        assert!(!dep.references(&model, "Tag", 3));
        assert!(!dep.references(&model, "Image", 2));
    }
}
