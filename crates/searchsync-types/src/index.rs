//! Index definitions: which classes go into which index, with which fields.
//!
//! Definitions are read from a dedicated TOML document so that class names
//! keep their case and index order is preserved:
//!
//! ```toml
//! [main]
//! routing_key = "site-1"
//!
//! [main.include_classes]
//! Secret = false
//!
//! [main.include_classes.Page.fields]
//! title = true
//! tag_titles = { property = "Tags.Title", options = { type = "text" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::field::Field;

/// Ordered map of index name to definition.
pub type IndexDefinitions = IndexMap<String, IndexDefinition>;

/// Configuration for one named index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Class name to field spec (or `false` to exclude the class)
    #[serde(default)]
    pub include_classes: IndexMap<String, ClassSpec>,

    /// Partition key matched against a document's partition (multi-tenant routing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<Value>,
}

impl IndexDefinition {
    /// Add a class with the given field spec.
    pub fn with_class(mut self, class: impl Into<String>, spec: ClassSpec) -> Self {
        self.include_classes.insert(class.into(), spec);
        self
    }

    /// Set the routing key.
    pub fn with_routing_key(mut self, key: impl Into<Value>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    /// Routing key rendered as a string, for comparison with partition keys.
    pub fn routing_key_str(&self) -> Option<String> {
        self.routing_key.as_ref().map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Field spec for one class within an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassSpec {
    /// `false` excludes the class (and its subclasses); `true` includes it without fields
    Toggle(bool),
    /// Included with explicit fields
    Fields {
        #[serde(default)]
        fields: IndexMap<String, FieldSpec>,
    },
}

impl ClassSpec {
    /// Build an included spec from a list of fields.
    pub fn from_fields(fields: impl IntoIterator<Item = Field>) -> Self {
        ClassSpec::Fields {
            fields: fields
                .into_iter()
                .map(|f| {
                    let spec = if f.property().is_none() && f.options().is_empty() {
                        FieldSpec::Enabled(true)
                    } else {
                        FieldSpec::Detailed {
                            property: f.property().map(str::to_string),
                            options: f.options().clone(),
                        }
                    };
                    (f.search_field_name().to_string(), spec)
                })
                .collect(),
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, ClassSpec::Toggle(false))
    }

    /// The enabled fields declared by this spec, in declaration order.
    pub fn fields(&self) -> Vec<Field> {
        match self {
            ClassSpec::Toggle(_) => Vec::new(),
            ClassSpec::Fields { fields } => fields
                .iter()
                .filter_map(|(name, spec)| spec.to_field(name))
                .collect(),
        }
    }
}

/// One field entry: `true`, `false`, or `{ property, options }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Enabled(bool),
    Detailed {
        #[serde(default)]
        property: Option<String>,
        #[serde(default)]
        options: BTreeMap<String, Value>,
    },
}

impl FieldSpec {
    fn to_field(&self, name: &str) -> Option<Field> {
        match self {
            FieldSpec::Enabled(false) => None,
            FieldSpec::Enabled(true) => Some(Field::new(name)),
            FieldSpec::Detailed { property, options } => {
                let field = Field::new(name).with_options(options.clone());
                Some(match property {
                    Some(p) => field.with_property(p.clone()),
                    None => field,
                })
            }
        }
    }
}

/// Parse index definitions from TOML text.
pub fn parse_index_definitions(text: &str) -> Result<IndexDefinitions, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load index definitions from a TOML file.
pub fn load_index_definitions(path: impl AsRef<Path>) -> Result<IndexDefinitions, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    parse_index_definitions(&text)
}
