//! Document parsing: resolves and coerces every field of a document

use serde_json::Value;

use super::field_type::FieldValue;
use super::mapping::{validate_field_name, FieldDeclaration, Mapping};
use super::resolver::{resolve, Resolution};
use crate::error::{MapstoreError, Result};
use crate::models::Document;
use crate::tokenizer::Tokenizer;

/// One field of a parsed document
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedField {
    pub declaration: FieldDeclaration,
    pub value: FieldValue,
    /// Inverted index terms; empty unless the field is searchable
    pub terms: Vec<String>,
}

/// A document whose fields have all been resolved and coerced
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedDocument {
    pub id: String,
    pub fields: Vec<ParsedField>,
    /// Serialized `_source`, present when source storage is enabled
    pub source: Option<Vec<u8>>,
    /// Declarations this document introduces to the mapping
    pub new_declarations: Vec<FieldDeclaration>,
}

impl ParsedDocument {
    pub fn field(&self, name: &str) -> Option<&ParsedField> {
        self.fields.iter().find(|f| f.declaration.name == name)
    }

    /// Rough in-memory footprint, used for buffer sizing
    pub fn estimated_bytes(&self) -> usize {
        let fields: usize = self
            .fields
            .iter()
            .map(|f| {
                let value = match &f.value {
                    FieldValue::Text(s) | FieldValue::Keyword(s) => s.len(),
                    _ => 8,
                };
                f.declaration.name.len()
                    + value
                    + f.terms.iter().map(|t| t.len() + 4).sum::<usize>()
            })
            .sum();
        self.id.len() + fields + self.source.as_ref().map_or(0, |s| s.len())
    }
}

/// Parses documents against a mapping snapshot
#[derive(Clone, Debug, Default)]
pub struct DocumentParser {
    tokenizer: Tokenizer,
}

impl DocumentParser {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Resolve and coerce every field. Nothing is registered here; the
    /// caller registers `new_declarations` once the whole document parsed.
    pub fn parse(&self, mapping: &Mapping, doc: &Document) -> Result<ParsedDocument> {
        if doc.id.is_empty() {
            return Err(MapstoreError::InvalidValue {
                field: "_id".to_string(),
                reason: "document id cannot be empty".to_string(),
            });
        }

        let mut fields = Vec::with_capacity(doc.fields.len());
        let mut new_declarations = Vec::new();

        for (name, value) in &doc.fields {
            validate_field_name(name).map_err(|e| MapstoreError::InvalidValue {
                field: name.clone(),
                reason: e.to_string(),
            })?;

            // Nulls neither introduce a field nor produce a value
            if value.is_null() {
                continue;
            }

            let declaration = match resolve(name, None, mapping, value)? {
                Resolution::Declared(decl) => decl,
                Resolution::Introduced(decl) => {
                    new_declarations.push(decl.clone());
                    decl
                }
                Resolution::Ignored => continue,
            };

            let coerced = declaration
                .field_type
                .coerce(value)
                .map_err(|reason| MapstoreError::InvalidValue {
                    field: name.clone(),
                    reason,
                })?;
            let Some(value) = coerced else { continue };

            let terms = if declaration.searchable() {
                value.index_terms(&self.tokenizer)
            } else {
                Vec::new()
            };
            fields.push(ParsedField {
                declaration,
                value,
                terms,
            });
        }

        let source = if mapping.source_enabled {
            Some(serde_json::to_vec(&Value::Object(doc.fields.clone()))?)
        } else {
            None
        };

        Ok(ParsedDocument {
            id: doc.id.clone(),
            fields,
            source,
            new_declarations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mapping::{DynamicTemplate, FieldMapping, StorageForms};
    use crate::schema::FieldType;
    use serde_json::json;

    fn scenario_mapping() -> Mapping {
        Mapping::new()
            .field(
                "name",
                FieldMapping::text().with_store(true).with_doc_values(false),
            )
            .unwrap()
            .dynamic_template(
                DynamicTemplate::new(
                    "dv",
                    "dv_*",
                    FieldMapping::integer().with_index(false).with_doc_values(true),
                )
                .unwrap(),
            )
            .unwrap()
            .with_source_enabled(false)
    }

    #[test]
    fn test_parse_scenario_document() {
        let parser = DocumentParser::default();
        let doc = Document::new("0")
            .with_field("dv_field", 100)
            .with_field("name", "one hundred");

        let parsed = parser.parse(&scenario_mapping(), &doc).unwrap();

        assert_eq!(parsed.id, "0");
        assert!(parsed.source.is_none());
        assert_eq!(parsed.new_declarations.len(), 1);
        assert_eq!(parsed.new_declarations[0].name, "dv_field");

        let dv = parsed.field("dv_field").unwrap();
        assert_eq!(dv.value, FieldValue::Long(100));
        assert_eq!(dv.declaration.forms, StorageForms::new(false, false, true));
        assert!(dv.terms.is_empty());

        let name = parsed.field("name").unwrap();
        assert_eq!(name.terms, vec!["one", "hundred"]);
    }

    #[test]
    fn test_parse_keeps_source_when_enabled() {
        let parser = DocumentParser::default();
        let mapping = Mapping::new();
        let doc = Document::new("1").with_field("count", 3);

        let parsed = parser.parse(&mapping, &doc).unwrap();
        let source: Value = serde_json::from_slice(parsed.source.as_ref().unwrap()).unwrap();
        assert_eq!(source, json!({"count": 3}));
        assert_eq!(
            parsed.field("count").unwrap().declaration.field_type,
            FieldType::Long
        );
    }

    #[test]
    fn test_parse_errors() {
        let parser = DocumentParser::default();
        let mapping = scenario_mapping();

        let err = parser
            .parse(&mapping, &Document::new("0").with_field("dv_field", "abc"))
            .unwrap_err();
        assert_eq!(err.field(), Some("dv_field"));

        let err = parser
            .parse(&mapping, &Document::new("0").with_field("dv_list", json!([1, 2])))
            .unwrap_err();
        assert!(matches!(err, MapstoreError::InvalidValue { .. }));

        assert!(parser.parse(&mapping, &Document::new("")).is_err());
        assert!(parser
            .parse(&mapping, &Document::new("0").with_field("_id", "x"))
            .is_err());
    }

    #[test]
    fn test_null_values_are_skipped() {
        let parser = DocumentParser::default();
        let doc = Document::new("0").with_field("dv_field", Value::Null);

        let parsed = parser.parse(&scenario_mapping(), &doc).unwrap();
        assert!(parsed.fields.is_empty());
        assert!(parsed.new_declarations.is_empty());
    }
}
