//! Term query over the inverted index
//!
//! The query text is coerced with the field's type and analyzed the way
//! indexing analyzes values. A doc matches when it contains every
//! resulting term.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::QueryContext;
use crate::error::{MapstoreError, Result};
use crate::schema::StorageForms;

/// Query matching docs whose `field` contains `term`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: String,
    pub term: String,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn execute(&self, ctx: &QueryContext<'_>) -> Result<Vec<String>> {
        let decl = ctx.field(&self.field).ok_or_else(|| MapstoreError::FieldNotSearchable {
            field: self.field.clone(),
            declared: StorageForms::new(false, false, false),
        })?;
        if !decl.searchable() {
            return Err(MapstoreError::FieldNotSearchable {
                field: self.field.clone(),
                declared: decl.forms,
            });
        }

        let value = decl
            .field_type
            .coerce(&Value::String(self.term.clone()))
            .map_err(|reason| {
                MapstoreError::InvalidQuery(format!("term on [{}]: {}", self.field, reason))
            })?;
        let terms = value
            .map(|v| v.index_terms(ctx.tokenizer()))
            .unwrap_or_default();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        Ok(ctx.collect_ids(|segment| {
            let mut docs: Option<RoaringBitmap> = None;
            for term in &terms {
                let hits = segment.term_docs(&self.field, term);
                docs = Some(match docs {
                    Some(acc) => acc & hits,
                    None => hits,
                });
            }
            docs.unwrap_or_default()
        }))
    }
}
