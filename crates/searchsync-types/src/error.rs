//! Configuration errors.
//!
//! These indicate a deployment or configuration bug rather than a transient
//! failure, so they are never retried.

use thiserror::Error;

/// Errors raised by configuration loading and field resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Settings could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// Index definitions file could not be parsed
    #[error("Invalid index definitions: {0}")]
    Parse(String),

    /// Field name does not satisfy backend naming rules
    #[error("Invalid field name '{name}': {reason}")]
    InvalidFieldName { name: String, reason: String },

    /// A user field collides with an identity, meta or discriminator field
    #[error("Field '{field}' on {class} collides with a reserved document field")]
    ReservedFieldCollision { field: String, class: String },

    /// The same exported name is defined twice with different types
    #[error("Field '{field}' on {class} is declared as '{existing}' and '{incoming}'")]
    IncompatibleField {
        field: String,
        class: String,
        existing: String,
        incoming: String,
    },

    /// Resolved value is an associative (keyed) collection
    #[error("Field '{field}' on {class} resolved to an associative array; only scalars and lists of scalars can be indexed")]
    AssociativeValue { field: String, class: String },

    /// Resolved list contains nested lists or maps
    #[error("Field '{field}' on {class} resolved to a list containing non-scalar values")]
    NonScalarList { field: String, class: String },

    /// Resolved value is an object graph the indexer cannot flatten
    #[error("Field '{field}' on {class} resolved to an unsupported value of type {type_name}")]
    UnsupportedValue {
        field: String,
        class: String,
        type_name: String,
    },

    /// Property names a relation without selecting a field on it
    #[error("Field '{field}' on {class} points at the relation '{relation}' itself; use dot syntax to select a field on it (e.g. '{relation}.Title')")]
    RawRelation {
        field: String,
        class: String,
        relation: String,
    },

    /// Two base classes would produce the same document ids
    #[error("Classes '{first}' and '{second}' both map to the document id prefix '{prefix}'")]
    IdentifierCollision {
        first: String,
        second: String,
        prefix: String,
    },

    /// A path segment could not be resolved
    #[error("Cannot resolve '{segment}' on {subject} (path '{path}')")]
    UnresolvablePath {
        path: String,
        segment: String,
        subject: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidFieldName {
            name: "_title".into(),
            reason: "must not start with an underscore".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid field name '_title': must not start with an underscore"
        );

        let err = ConfigError::RawRelation {
            field: "tags".into(),
            class: "Article".into(),
            relation: "Tags".into(),
        };
        assert!(err.to_string().contains("'Tags.Title'"));
    }

    #[test]
    fn test_associative_and_raw_relation_are_distinct() {
        let assoc = ConfigError::AssociativeValue {
            field: "meta".into(),
            class: "Article".into(),
        };
        let raw = ConfigError::RawRelation {
            field: "meta".into(),
            class: "Article".into(),
            relation: "Meta".into(),
        };
        assert_ne!(assoc.to_string(), raw.to_string());
        assert!(assoc.to_string().contains("associative"));
    }
}
