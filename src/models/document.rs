use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MapstoreError, Result};

/// A document as submitted for indexing: an id plus top-level fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document with no fields
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set a field value
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Build a document from an id and a JSON object body
    pub fn from_json(id: impl Into<String>, body: Value) -> Result<Self> {
        match body {
            Value::Object(fields) => Ok(Self {
                id: id.into(),
                fields,
            }),
            other => Err(MapstoreError::InvalidValue {
                field: "_source".to_string(),
                reason: format!("document body must be a JSON object, got {}", other),
            }),
        }
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Overlay `changes` onto this document's top-level fields.
    /// Returns true if any field changed.
    pub fn apply_update(&mut self, changes: &Map<String, Value>) -> bool {
        let mut changed = false;
        for (name, value) in changes {
            if self.fields.get(name) != Some(value) {
                self.fields.insert(name.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_builder() {
        let doc = Document::new("0")
            .with_field("dv_field", 100)
            .with_field("name", "one hundred");

        assert_eq!(doc.id, "0");
        assert_eq!(doc.get("dv_field"), Some(&json!(100)));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_from_json() {
        let doc = Document::from_json("1", json!({"dv_field": 200})).unwrap();
        assert_eq!(doc.fields.len(), 1);
        assert!(Document::from_json("1", json!([1, 2])).is_err());
    }

    #[test]
    fn test_apply_update() {
        let mut doc = Document::new("0")
            .with_field("dv_field", 100)
            .with_field("name", "one hundred");

        let same = json!({"dv_field": 100});
        assert!(!doc.apply_update(same.as_object().unwrap()));

        let changes = json!({"dv_field": 1009, "extra": true});
        assert!(doc.apply_update(changes.as_object().unwrap()));
        assert_eq!(doc.get("dv_field"), Some(&json!(1009)));
        assert_eq!(doc.get("name"), Some(&json!("one hundred")));
        assert_eq!(doc.get("extra"), Some(&json!(true)));
    }
}
