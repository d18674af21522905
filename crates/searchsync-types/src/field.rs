//! Exported field descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// One exported attribute of a document.
///
/// `search_field_name` is the key written to the backend. `property` is an
/// optional dot-delimited path into the record graph (e.g. `"Images.Tags.Title"`);
/// when absent the search field name itself is used as the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    search_field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    property: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, Value>,
}

impl Field {
    /// Create a field that resolves its own name on the record.
    pub fn new(search_field_name: impl Into<String>) -> Self {
        Self {
            search_field_name: search_field_name.into(),
            property: None,
            options: BTreeMap::new(),
        }
    }

    /// Set the source path expression.
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Add an option (e.g. `type`).
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Replace all options.
    pub fn with_options(mut self, options: BTreeMap<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn search_field_name(&self) -> &str {
        &self.search_field_name
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// The path to resolve: the explicit property, or the field name.
    pub fn property_path(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.search_field_name)
    }

    pub fn options(&self) -> &BTreeMap<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// The backend schema type, if declared.
    pub fn field_type(&self) -> Option<&str> {
        self.options.get("type").and_then(Value::as_str)
    }

    /// Check the exported name against backend naming rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_field_name(&self.search_field_name)
    }
}

/// Validate a backend field name.
///
/// Names must be non-empty, consist of lowercase ASCII letters, digits and
/// underscores, and must not start with an underscore.
pub fn validate_field_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidFieldName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.starts_with('_') {
        return Err(invalid("must not start with an underscore"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
    {
        return Err(invalid(&format!(
            "contains '{}'; only lowercase letters, digits and underscores are allowed",
            c
        )));
    }
    Ok(())
}
