//! Wire representation shared with search backends.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat string-keyed map of scalars and scalar lists sent to a backend.
pub type WireDocument = BTreeMap<String, Value>;

/// What an indexing run does with its documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMethod {
    /// Re-evaluate indexability; add or remove accordingly
    Add,
    /// Remove unconditionally
    Delete,
}

impl fmt::Display for IndexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexMethod::Add => write!(f, "add"),
            IndexMethod::Delete => write!(f, "delete"),
        }
    }
}

/// Whether a JSON value is a scalar leaf (null, bool, number or string).
pub fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_method_serialization() {
        assert_eq!(serde_json::to_string(&IndexMethod::Add).unwrap(), "\"add\"");
        let method: IndexMethod = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(method, IndexMethod::Delete);
        assert_eq!(IndexMethod::Delete.to_string(), "delete");
    }

    #[test]
    fn test_is_scalar() {
        assert!(is_scalar(&json!(null)));
        assert!(is_scalar(&json!("a")));
        assert!(is_scalar(&json!(1.5)));
        assert!(!is_scalar(&json!([1])));
        assert!(!is_scalar(&json!({"a": 1})));
    }
}
