//! Stored fields: per-document raw values and the optional `_source`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::FieldValue;

/// Stored data of one document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Values of fields declared `store: true`
    pub fields: BTreeMap<String, FieldValue>,
    /// Serialized `_source` JSON, when source storage is enabled
    pub source: Option<Vec<u8>>,
}

impl StoredDocument {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.source.is_none()
    }
}

/// Stored documents of a segment, indexed by docno
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredFields {
    docs: Vec<StoredDocument>,
}

impl StoredFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: StoredDocument) {
        self.docs.push(doc);
    }

    pub fn get(&self, docno: super::DocNo) -> Option<&StoredDocument> {
        self.docs.get(docno.as_usize())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::DocNo;

    #[test]
    fn test_stored_fields() {
        let mut stored = StoredFields::new();

        let mut doc = StoredDocument::default();
        assert!(doc.is_empty());
        doc.fields
            .insert("name".to_string(), FieldValue::Text("one hundred".to_string()));
        stored.push(doc);
        stored.push(StoredDocument {
            fields: BTreeMap::new(),
            source: Some(br#"{"dv_field":200}"#.to_vec()),
        });

        let data = stored.serialize().unwrap();
        let restored = StoredFields::deserialize(&data).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.get(DocNo(0)).unwrap().fields.get("name"),
            Some(&FieldValue::Text("one hundred".to_string()))
        );
        assert!(restored.get(DocNo(1)).unwrap().source.is_some());
        assert!(restored.get(DocNo(2)).is_none());
    }
}
