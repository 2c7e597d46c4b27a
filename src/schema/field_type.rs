//! Field type definitions
//!
//! Defines how different data types are coerced, indexed and stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::segment::{f64_to_sortable_i64, sortable_i64_to_f64, ColumnKind, ColumnValue};
use crate::tokenizer::Tokenizer;

/// Field data type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Analyzed full-text field. Has no doc values.
    Text,
    /// Exact-value string field
    Keyword,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    Long,
    /// 64-bit floating point
    Double,
    /// Boolean value
    Boolean,
}

impl FieldType {
    /// Parse a mapping type name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(FieldType::Text),
            "keyword" => Some(FieldType::Keyword),
            "integer" => Some(FieldType::Integer),
            "long" => Some(FieldType::Long),
            "double" => Some(FieldType::Double),
            "boolean" => Some(FieldType::Boolean),
            _ => None,
        }
    }

    /// Mapping type name
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
        }
    }

    /// Column kind used for doc values of this type, if any
    pub fn column_kind(&self) -> Option<ColumnKind> {
        match self {
            FieldType::Text => None,
            FieldType::Keyword => Some(ColumnKind::Keyword),
            FieldType::Integer | FieldType::Long | FieldType::Double => Some(ColumnKind::Numeric),
            FieldType::Boolean => Some(ColumnKind::Boolean),
        }
    }

    /// Whether doc values are enabled by default for this type
    pub fn default_doc_values(&self) -> bool {
        self.column_kind().is_some()
    }

    /// Check if this field type supports range queries
    pub fn supports_range(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Long | FieldType::Double
        )
    }

    /// Detect a type for an unmapped JSON value
    pub fn detect(value: &Value) -> Option<FieldType> {
        match value {
            Value::Bool(_) => Some(FieldType::Boolean),
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Some(FieldType::Long)
                } else {
                    Some(FieldType::Double)
                }
            }
            Value::String(_) => Some(FieldType::Text),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Coerce a JSON value into a typed field value.
    ///
    /// `Ok(None)` means the value is null and the field is skipped.
    pub fn coerce(&self, value: &Value) -> Result<Option<FieldValue>, String> {
        if value.is_null() {
            return Ok(None);
        }
        if value.is_array() || value.is_object() {
            return Err(format!(
                "expected a single {} value, got {}",
                self.name(),
                json_kind(value)
            ));
        }

        let coerced = match self {
            FieldType::Text => FieldValue::Text(scalar_to_string(value)),
            FieldType::Keyword => FieldValue::Keyword(scalar_to_string(value)),
            FieldType::Integer => {
                let v = coerce_integer(value)?;
                if v < i32::MIN as i64 || v > i32::MAX as i64 {
                    return Err(format!("value [{}] is out of range for an integer", v));
                }
                FieldValue::Long(v)
            }
            FieldType::Long => FieldValue::Long(coerce_integer(value)?),
            FieldType::Double => {
                let v = match value {
                    Value::Number(n) => n
                        .as_f64()
                        .ok_or_else(|| format!("value [{}] is not a double", n))?,
                    Value::String(s) => s
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| format!("cannot parse [{}] as a double", s))?,
                    other => return Err(format!("cannot coerce {} to a double", json_kind(other))),
                };
                if !v.is_finite() {
                    return Err(format!("[{}] is not a finite double", v));
                }
                // -0.0 and 0.0 share one column value
                FieldValue::Double(if v == 0.0 { 0.0 } else { v })
            }
            FieldType::Boolean => match value {
                Value::Bool(b) => FieldValue::Boolean(*b),
                Value::String(s) if s == "true" => FieldValue::Boolean(true),
                Value::String(s) if s == "false" => FieldValue::Boolean(false),
                other => {
                    return Err(format!(
                        "cannot coerce [{}] to a boolean",
                        scalar_to_string(other)
                    ))
                }
            },
        };
        Ok(Some(coerced))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON type name used by `match_mapping_type` conditions
pub fn json_mapping_type(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "long",
        Value::Number(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Ok(v)
            } else if n.is_u64() {
                Err(format!("value [{}] is out of range for a long", n))
            } else {
                truncate_float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    let f = s
                        .parse::<f64>()
                        .map_err(|_| format!("cannot parse [{}] as a number", s))?;
                    truncate_float(f)
                }
            }
        }
        other => Err(format!("cannot coerce {} to a number", json_kind(other))),
    }
}

fn truncate_float(v: f64) -> Result<i64, String> {
    if !v.is_finite() || v < i64::MIN as f64 || v >= i64::MAX as f64 {
        return Err(format!("value [{}] is out of range for a long", v));
    }
    Ok(v.trunc() as i64)
}

/// A coerced field value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Keyword(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
}

impl FieldValue {
    /// Terms written to the inverted index for this value
    pub fn index_terms(&self, tokenizer: &Tokenizer) -> Vec<String> {
        match self {
            FieldValue::Text(s) => tokenizer.unique_terms(s),
            FieldValue::Keyword(s) => vec![s.clone()],
            FieldValue::Long(v) => vec![v.to_string()],
            FieldValue::Double(v) => vec![v.to_string()],
            FieldValue::Boolean(b) => vec![b.to_string()],
        }
    }

    /// Doc value representation, if the value has one
    pub fn column_value(&self) -> Option<ColumnValue> {
        match self {
            FieldValue::Text(_) => None,
            FieldValue::Keyword(s) => Some(ColumnValue::Keyword(s.clone())),
            FieldValue::Long(v) => Some(ColumnValue::Numeric(*v)),
            FieldValue::Double(v) => Some(ColumnValue::Numeric(f64_to_sortable_i64(*v))),
            FieldValue::Boolean(b) => Some(ColumnValue::Boolean(*b)),
        }
    }

    /// Rebuild a field value from its doc value
    pub fn from_column_value(field_type: FieldType, value: ColumnValue) -> Option<Self> {
        match (field_type, value) {
            (FieldType::Keyword, ColumnValue::Keyword(s)) => Some(FieldValue::Keyword(s)),
            (FieldType::Integer | FieldType::Long, ColumnValue::Numeric(v)) => {
                Some(FieldValue::Long(v))
            }
            (FieldType::Double, ColumnValue::Numeric(v)) => {
                Some(FieldValue::Double(sortable_i64_to_f64(v)))
            }
            (FieldType::Boolean, ColumnValue::Boolean(b)) => Some(FieldValue::Boolean(b)),
            _ => None,
        }
    }

    /// Convert back to JSON
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) | FieldValue::Keyword(s) => Value::String(s.clone()),
            FieldValue::Long(v) => Value::from(*v),
            FieldValue::Double(v) => Value::from(*v),
            FieldValue::Boolean(b) => Value::Bool(*b),
        }
    }
}
