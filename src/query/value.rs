//! Exact-value query over doc values
//!
//! Unlike a term query this reads the column, so it works on fields that
//! are not indexed. The value is coerced with the field's type; keyword
//! values are compared whole, without analysis.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::QueryContext;
use crate::error::{MapstoreError, Result};
use crate::schema::StorageForms;

/// Query matching docs whose `field` doc value equals `value`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueQuery {
    pub field: String,
    pub value: Value,
}

impl ValueQuery {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn execute(&self, ctx: &QueryContext<'_>) -> Result<Vec<String>> {
        let decl = ctx.field(&self.field).ok_or_else(|| MapstoreError::FieldNotColumnar {
            field: self.field.clone(),
            declared: StorageForms::new(false, false, false),
        })?;
        if !decl.columnar() {
            return Err(MapstoreError::FieldNotColumnar {
                field: self.field.clone(),
                declared: decl.forms,
            });
        }

        let value = decl.field_type.coerce(&self.value).map_err(|reason| {
            MapstoreError::InvalidQuery(format!("value on [{}]: {}", self.field, reason))
        })?;
        // null never matches
        let Some(column_value) = value.and_then(|v| v.column_value()) else {
            return Ok(Vec::new());
        };

        Ok(ctx.collect_ids(|segment| segment.value_docs(&self.field, &column_value)))
    }
}
