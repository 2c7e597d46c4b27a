//! Mapping definitions
//!
//! A mapping declares, per field, a type and which storage forms the field
//! materializes: inverted postings (`index`), stored raw values (`store`)
//! and columnar doc values (`doc_values`). Unseen fields are resolved
//! through ordered dynamic templates and the dynamic mapping mode.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::field_type::{json_mapping_type, FieldType};
use super::glob::GlobPattern;
use crate::error::{MapstoreError, Result};

/// The set of storage forms a field materializes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageForms {
    /// Indexed into the inverted index
    pub searchable: bool,
    /// Raw value kept in the stored fields
    pub stored: bool,
    /// Per-document value kept in a doc values column
    pub columnar: bool,
}

impl StorageForms {
    pub fn new(searchable: bool, stored: bool, columnar: bool) -> Self {
        Self {
            searchable,
            stored,
            columnar,
        }
    }
}

impl Default for StorageForms {
    /// Forms of a dynamically detected field with no matching template
    fn default() -> Self {
        Self::new(true, true, false)
    }
}

impl fmt::Display for StorageForms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index={}, store={}, doc_values={}",
            self.searchable, self.stored, self.columnar
        )
    }
}

/// Dynamic mapping behavior for fields no declaration or template covers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicMapping {
    /// Detect the type and register the field (default)
    #[default]
    True,
    /// Keep the value in `_source` but do not index it
    False,
    /// Reject documents with unmapped fields
    Strict,
}

impl DynamicMapping {
    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(true) => Ok(DynamicMapping::True),
            Value::Bool(false) => Ok(DynamicMapping::False),
            Value::String(s) if s == "true" => Ok(DynamicMapping::True),
            Value::String(s) if s == "false" => Ok(DynamicMapping::False),
            Value::String(s) if s == "strict" => Ok(DynamicMapping::Strict),
            other => Err(MapstoreError::InvalidMapping(format!(
                "unknown dynamic mode [{}]",
                other
            ))),
        }
    }
}

/// Field mapping parameters as written in a mapping definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field type; a template may leave it unset to use the detected type
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub index: bool,
    pub store: bool,
    /// Defaults to whatever the type supports
    pub doc_values: Option<bool>,
}

impl FieldMapping {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            index: true,
            store: false,
            doc_values: None,
        }
    }

    /// A template mapping that keeps the detected type
    pub fn detected() -> Self {
        Self {
            field_type: None,
            index: true,
            store: false,
            doc_values: None,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldType::Text)
    }

    pub fn keyword() -> Self {
        Self::new(FieldType::Keyword)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn long() -> Self {
        Self::new(FieldType::Long)
    }

    pub fn double() -> Self {
        Self::new(FieldType::Double)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn with_index(mut self, index: bool) -> Self {
        self.index = index;
        self
    }

    pub fn with_store(mut self, store: bool) -> Self {
        self.store = store;
        self
    }

    pub fn with_doc_values(mut self, doc_values: bool) -> Self {
        self.doc_values = Some(doc_values);
        self
    }

    /// Parse mapping parameters from JSON
    pub fn from_json(field: &str, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            MapstoreError::InvalidMapping(format!("mapping for [{}] must be an object", field))
        })?;

        let field_type = match obj.get("type") {
            None => None,
            Some(Value::String(name)) => Some(FieldType::from_name(name).ok_or_else(|| {
                MapstoreError::InvalidMapping(format!(
                    "no handler for type [{}] declared on field [{}]",
                    name, field
                ))
            })?),
            Some(other) => {
                return Err(MapstoreError::InvalidMapping(format!(
                    "type of field [{}] must be a string, got {}",
                    field, other
                )))
            }
        };

        let flag = |name: &str| -> Result<Option<bool>> {
            match obj.get(name) {
                None => Ok(None),
                Some(Value::Bool(b)) => Ok(Some(*b)),
                Some(Value::String(s)) if s == "true" => Ok(Some(true)),
                Some(Value::String(s)) if s == "false" => Ok(Some(false)),
                Some(other) => Err(MapstoreError::InvalidMapping(format!(
                    "[{}] on field [{}] must be a boolean, got {}",
                    name, field, other
                ))),
            }
        };

        Ok(Self {
            field_type,
            index: flag("index")?.unwrap_or(true),
            store: flag("store")?.unwrap_or(false),
            doc_values: flag("doc_values")?,
        })
    }

    /// Turn these parameters into a declaration for `name`, using
    /// `detected` when the mapping leaves the type unset
    pub fn declare(
        &self,
        name: &str,
        detected: Option<FieldType>,
        explicit: bool,
    ) -> Result<FieldDeclaration> {
        let field_type = self.field_type.or(detected).ok_or_else(|| {
            MapstoreError::InvalidMapping(format!("no type specified for field [{}]", name))
        })?;

        let columnar = self
            .doc_values
            .unwrap_or_else(|| field_type.default_doc_values());
        if columnar && field_type.column_kind().is_none() {
            return Err(MapstoreError::InvalidMapping(format!(
                "field [{}] of type [{}] does not support doc_values",
                name, field_type
            )));
        }

        Ok(FieldDeclaration {
            name: name.to_string(),
            field_type,
            forms: StorageForms::new(self.index, self.store, columnar),
            explicit,
        })
    }
}

/// The resolved storage decision for one field name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: String,
    pub field_type: FieldType,
    pub forms: StorageForms,
    /// Declared in the mapping rather than introduced by a document
    pub explicit: bool,
}

impl FieldDeclaration {
    pub fn searchable(&self) -> bool {
        self.forms.searchable
    }

    pub fn stored(&self) -> bool {
        self.forms.stored
    }

    pub fn columnar(&self) -> bool {
        self.forms.columnar
    }

    /// Same type and storage forms, regardless of how the field was introduced
    pub fn is_compatible_with(&self, other: &FieldDeclaration) -> bool {
        self.field_type == other.field_type && self.forms == other.forms
    }

    /// Human-readable `type (forms)` description
    pub fn describe(&self) -> String {
        format!("{} ({})", self.field_type, self.forms)
    }
}

/// Dynamic template: applies a field mapping to unseen fields that match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DynamicTemplate {
    pub name: String,
    /// Field name glob
    #[serde(rename = "match")]
    pub match_pattern: Option<GlobPattern>,
    /// Field name glob that excludes otherwise matching fields
    pub unmatch: Option<GlobPattern>,
    /// JSON type the value must have (`long`, `double`, `string`, `boolean`, `*`)
    pub match_mapping_type: Option<String>,
    pub mapping: FieldMapping,
}

impl DynamicTemplate {
    /// Template applying `mapping` to fields matching `pattern`
    pub fn new(name: impl Into<String>, pattern: &str, mapping: FieldMapping) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            match_pattern: Some(GlobPattern::new(pattern)?),
            unmatch: None,
            match_mapping_type: None,
            mapping,
        })
    }

    pub fn with_unmatch(mut self, pattern: &str) -> Result<Self> {
        self.unmatch = Some(GlobPattern::new(pattern)?);
        Ok(self)
    }

    pub fn with_match_mapping_type(mut self, json_type: impl Into<String>) -> Self {
        self.match_mapping_type = Some(json_type.into());
        self
    }

    /// Check whether this template applies to `field` holding `value`
    pub fn matches(&self, field: &str, value: &Value) -> bool {
        if let Some(pattern) = &self.match_pattern {
            if !pattern.matches(field) {
                return false;
            }
        }
        if let Some(pattern) = &self.unmatch {
            if pattern.matches(field) {
                return false;
            }
        }
        match self.match_mapping_type.as_deref() {
            None | Some("*") => true,
            Some(json_type) => json_type == json_mapping_type(value),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.match_pattern.is_none()
            && self.unmatch.is_none()
            && self.match_mapping_type.is_none()
        {
            return Err(MapstoreError::InvalidMapping(format!(
                "dynamic template [{}] has no match condition",
                self.name
            )));
        }
        if let Some(json_type) = &self.match_mapping_type {
            if !matches!(
                json_type.as_str(),
                "*" | "long" | "double" | "string" | "boolean"
            ) {
                return Err(MapstoreError::InvalidMapping(format!(
                    "dynamic template [{}] has unknown match_mapping_type [{}]",
                    self.name, json_type
                )));
            }
        }
        // A typed template must produce a valid declaration on its own
        if self.mapping.field_type.is_some() {
            self.mapping.declare(&self.name, None, false)?;
        }
        Ok(())
    }

    fn from_json(name: &str, body: &Value) -> Result<Self> {
        let obj = body.as_object().ok_or_else(|| {
            MapstoreError::InvalidMapping(format!("dynamic template [{}] must be an object", name))
        })?;

        let pattern = |key: &str| -> Result<Option<GlobPattern>> {
            match obj.get(key) {
                None => Ok(None),
                Some(Value::String(s)) => GlobPattern::new(s.as_str()).map(Some),
                Some(other) => Err(MapstoreError::InvalidMapping(format!(
                    "[{}] of dynamic template [{}] must be a string, got {}",
                    key, name, other
                ))),
            }
        };

        let match_mapping_type = match obj.get("match_mapping_type") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(MapstoreError::InvalidMapping(format!(
                    "match_mapping_type of dynamic template [{}] must be a string, got {}",
                    name, other
                )))
            }
        };

        let mapping = obj
            .get("mapping")
            .map(|m| FieldMapping::from_json(name, m))
            .transpose()?
            .unwrap_or_else(FieldMapping::detected);

        Ok(Self {
            name: name.to_string(),
            match_pattern: pattern("match")?,
            unmatch: pattern("unmatch")?,
            match_mapping_type,
            mapping,
        })
    }
}

/// Mapping for one logical document type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Declared and dynamically registered fields
    pub fields: BTreeMap<String, FieldDeclaration>,
    /// Templates in declaration order; the first match wins
    pub dynamic_templates: Vec<DynamicTemplate>,
    /// Whether the whole document is kept as `_source`
    pub source_enabled: bool,
    pub dynamic: DynamicMapping,
    /// Forms of dynamically detected fields no template covers
    pub dynamic_defaults: StorageForms,
}

impl Default for Mapping {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            dynamic_templates: Vec::new(),
            source_enabled: true,
            dynamic: DynamicMapping::True,
            dynamic_defaults: StorageForms::default(),
        }
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, mapping: FieldMapping) -> Result<Self> {
        let name = name.into();
        let declaration = mapping.declare(&name, None, true)?;
        self.fields.insert(name, declaration);
        Ok(self)
    }

    /// Append a dynamic template
    pub fn dynamic_template(mut self, template: DynamicTemplate) -> Result<Self> {
        template.validate()?;
        self.dynamic_templates.push(template);
        Ok(self)
    }

    pub fn with_source_enabled(mut self, enabled: bool) -> Self {
        self.source_enabled = enabled;
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicMapping) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn with_dynamic_defaults(mut self, forms: StorageForms) -> Self {
        self.dynamic_defaults = forms;
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.get(name)
    }

    /// First template that applies to `field` holding `value`
    pub fn find_template(&self, field: &str, value: &Value) -> Option<&DynamicTemplate> {
        self.dynamic_templates.iter().find(|t| t.matches(field, value))
    }

    /// Parse a mapping definition in the usual JSON shape:
    ///
    /// ```json
    /// {
    ///   "dynamic": true,
    ///   "_source": { "enabled": false },
    ///   "properties": { "name": { "type": "text", "store": true, "doc_values": false } },
    ///   "dynamic_templates": [
    ///     { "dv": { "match": "dv_*", "mapping": { "type": "integer", "index": false } } }
    ///   ]
    /// }
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| MapstoreError::InvalidMapping("mapping must be an object".to_string()))?;

        let mut mapping = Mapping::new();

        for key in obj.keys() {
            if !matches!(
                key.as_str(),
                "properties" | "dynamic_templates" | "_source" | "dynamic"
            ) {
                return Err(MapstoreError::InvalidMapping(format!(
                    "unsupported mapping parameter [{}]",
                    key
                )));
            }
        }

        if let Some(dynamic) = obj.get("dynamic") {
            mapping.dynamic = DynamicMapping::from_json(dynamic)?;
        }

        if let Some(source) = obj.get("_source") {
            mapping.source_enabled = match source.get("enabled") {
                None => true,
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(MapstoreError::InvalidMapping(format!(
                        "_source.enabled must be a boolean, got {}",
                        other
                    )))
                }
            };
        }

        if let Some(properties) = obj.get("properties") {
            let properties = properties.as_object().ok_or_else(|| {
                MapstoreError::InvalidMapping("properties must be an object".to_string())
            })?;
            for (name, body) in properties {
                validate_field_name(name)?;
                let declaration = FieldMapping::from_json(name, body)?.declare(name, None, true)?;
                mapping.fields.insert(name.clone(), declaration);
            }
        }

        if let Some(templates) = obj.get("dynamic_templates") {
            let templates = templates.as_array().ok_or_else(|| {
                MapstoreError::InvalidMapping("dynamic_templates must be an array".to_string())
            })?;
            for entry in templates {
                let (name, body) = single_entry(entry)?;
                let template = DynamicTemplate::from_json(name, body)?;
                template.validate()?;
                mapping.dynamic_templates.push(template);
            }
        }

        Ok(mapping)
    }

    /// Parse a mapping definition from a JSON string
    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json(&value)
    }

    /// Render in the same JSON shape accepted by [`Mapping::from_json`]
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for (name, decl) in &self.fields {
            properties.insert(
                name.clone(),
                serde_json::json!({
                    "type": decl.field_type.name(),
                    "index": decl.forms.searchable,
                    "store": decl.forms.stored,
                    "doc_values": decl.forms.columnar,
                }),
            );
        }

        let templates: Vec<Value> = self
            .dynamic_templates
            .iter()
            .map(|t| {
                let mut body = Map::new();
                if let Some(p) = &t.match_pattern {
                    body.insert("match".to_string(), Value::from(p.as_str()));
                }
                if let Some(p) = &t.unmatch {
                    body.insert("unmatch".to_string(), Value::from(p.as_str()));
                }
                if let Some(json_type) = &t.match_mapping_type {
                    body.insert("match_mapping_type".to_string(), Value::from(json_type.as_str()));
                }
                let mut mapping = Map::new();
                if let Some(ty) = t.mapping.field_type {
                    mapping.insert("type".to_string(), Value::from(ty.name()));
                }
                mapping.insert("index".to_string(), Value::from(t.mapping.index));
                mapping.insert("store".to_string(), Value::from(t.mapping.store));
                if let Some(dv) = t.mapping.doc_values {
                    mapping.insert("doc_values".to_string(), Value::from(dv));
                }
                body.insert("mapping".to_string(), Value::Object(mapping));

                let mut entry = Map::new();
                entry.insert(t.name.clone(), Value::Object(body));
                Value::Object(entry)
            })
            .collect();

        let dynamic = match self.dynamic {
            DynamicMapping::True => Value::Bool(true),
            DynamicMapping::False => Value::Bool(false),
            DynamicMapping::Strict => Value::from("strict"),
        };

        serde_json::json!({
            "dynamic": dynamic,
            "_source": { "enabled": self.source_enabled },
            "properties": properties,
            "dynamic_templates": templates,
        })
    }
}

/// Reject names reserved for metadata fields
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MapstoreError::InvalidMapping(
            "field name cannot be empty".to_string(),
        ));
    }
    if matches!(name, "_id" | "_source" | "_version") {
        return Err(MapstoreError::InvalidMapping(format!(
            "field [{}] is a metadata field and cannot be declared",
            name
        )));
    }
    Ok(())
}

fn single_entry(entry: &Value) -> Result<(&str, &Value)> {
    match entry.as_object() {
        Some(obj) if obj.len() == 1 => obj
            .iter()
            .next()
            .map(|(name, body)| (name.as_str(), body))
            .ok_or_else(|| MapstoreError::InvalidMapping("empty dynamic template".to_string())),
        _ => Err(MapstoreError::InvalidMapping(
            "each dynamic template must be an object with a single named entry".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario_mapping() -> Value {
        json!({
            "properties": {
                "name": { "type": "text", "index": true, "store": true, "doc_values": false }
            },
            "dynamic_templates": [
                { "dv": {
                    "match": "dv_*",
                    "mapping": { "type": "integer", "index": false, "store": false, "doc_values": true }
                } }
            ],
            "_source": { "enabled": false }
        })
    }

    #[test]
    fn test_storage_forms_display() {
        let forms = StorageForms::new(false, false, true);
        assert_eq!(forms.to_string(), "index=false, store=false, doc_values=true");
        assert_eq!(StorageForms::default(), StorageForms::new(true, true, false));
    }

    #[test]
    fn test_field_mapping_defaults() {
        let decl = FieldMapping::integer().declare("count", None, true).unwrap();
        assert_eq!(decl.forms, StorageForms::new(true, false, true));

        let decl = FieldMapping::text().declare("body", None, true).unwrap();
        assert!(!decl.columnar());

        // Explicit flags are taken verbatim, including all-false
        let decl = FieldMapping::long()
            .with_index(false)
            .with_doc_values(false)
            .declare("off", None, true)
            .unwrap();
        assert_eq!(decl.forms, StorageForms::new(false, false, false));
    }

    #[test]
    fn test_text_doc_values_rejected() {
        let err = FieldMapping::text()
            .with_doc_values(true)
            .declare("body", None, true)
            .unwrap_err();
        assert!(matches!(err, MapstoreError::InvalidMapping(_)));
    }

    #[test]
    fn test_parse_mapping_json() {
        let mapping = Mapping::from_json(&scenario_mapping()).unwrap();

        assert!(!mapping.source_enabled);
        assert_eq!(mapping.dynamic, DynamicMapping::True);

        let name = mapping.get_field("name").unwrap();
        assert_eq!(name.field_type, FieldType::Text);
        assert_eq!(name.forms, StorageForms::new(true, true, false));
        assert!(name.explicit);

        assert_eq!(mapping.dynamic_templates.len(), 1);
        let template = mapping.find_template("dv_field", &json!(100)).unwrap();
        assert_eq!(template.name, "dv");
        assert_eq!(template.mapping.field_type, Some(FieldType::Integer));
        assert!(mapping.find_template("name2", &json!(1)).is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Mapping::from_json(&json!({"properties": {"a": {"type": "geo_shape"}}})).is_err());
        assert!(Mapping::from_json(&json!({"dynamic_templates": [{"a": {}, "b": {}}]})).is_err());
        assert!(Mapping::from_json(&json!({"dynamic_templates": [{"a": {"match": ""}}]})).is_err());
        assert!(Mapping::from_json(&json!({"dynamic": "sometimes"})).is_err());
        assert!(Mapping::from_json(&json!({"settings": {}})).is_err());
        assert!(Mapping::from_json(&json!({"properties": {"_id": {"type": "keyword"}}})).is_err());
    }

    #[test]
    fn test_template_conditions() {
        let template = DynamicTemplate::new("longs", "*", FieldMapping::detected())
            .unwrap()
            .with_unmatch("skip_*")
            .unwrap()
            .with_match_mapping_type("long");

        assert!(template.matches("count", &json!(5)));
        assert!(!template.matches("count", &json!("5")));
        assert!(!template.matches("skip_count", &json!(5)));
    }

    #[test]
    fn test_first_template_wins() {
        let mapping = Mapping::new()
            .dynamic_template(
                DynamicTemplate::new("first", "dv_*", FieldMapping::long()).unwrap(),
            )
            .unwrap()
            .dynamic_template(
                DynamicTemplate::new("second", "dv_f*", FieldMapping::keyword()).unwrap(),
            )
            .unwrap();

        let template = mapping.find_template("dv_field", &json!(1)).unwrap();
        assert_eq!(template.name, "first");
    }

    #[test]
    fn test_json_round_trip() {
        let mapping = Mapping::from_json(&scenario_mapping()).unwrap();
        let restored = Mapping::from_json(&mapping.to_json()).unwrap();
        assert_eq!(restored, mapping);

        let encoded = serde_json::to_string(&mapping).unwrap();
        let decoded: Mapping = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, mapping);
    }
}
