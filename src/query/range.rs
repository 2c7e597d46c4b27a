//! Range query over doc values
//!
//! Bounds are inclusive. Integer fields round a fractional lower bound up
//! and a fractional upper bound down; double fields compare in the sortable
//! i64 encoding their columns use.

use serde::{Deserialize, Serialize};

use super::context::QueryContext;
use crate::error::{MapstoreError, Result};
use crate::schema::{FieldType, StorageForms};
use crate::segment::f64_to_sortable_i64;

/// A range bound
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeValue {
    Long(i64),
    Double(f64),
}

impl RangeValue {
    fn as_f64(self) -> f64 {
        match self {
            RangeValue::Long(v) => v as f64,
            RangeValue::Double(v) => v,
        }
    }

    fn is_nan(self) -> bool {
        matches!(self, RangeValue::Double(v) if v.is_nan())
    }
}

impl From<i64> for RangeValue {
    fn from(v: i64) -> Self {
        RangeValue::Long(v)
    }
}

impl From<i32> for RangeValue {
    fn from(v: i32) -> Self {
        RangeValue::Long(v as i64)
    }
}

impl From<f64> for RangeValue {
    fn from(v: f64) -> Self {
        RangeValue::Double(v)
    }
}

/// Query matching docs whose `field` value lies in `[gte, lte]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    pub gte: RangeValue,
    pub lte: RangeValue,
}

impl RangeQuery {
    pub fn new(field: impl Into<String>, gte: impl Into<RangeValue>, lte: impl Into<RangeValue>) -> Self {
        Self {
            field: field.into(),
            gte: gte.into(),
            lte: lte.into(),
        }
    }

    /// Matching doc ids across the snapshot
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
        if !decl.field_type.supports_range() {
            return Err(MapstoreError::InvalidQuery(format!(
                "range query on [{}] of type {}",
                self.field, decl.field_type
            )));
        }
        if self.gte.is_nan() || self.lte.is_nan() {
            return Err(MapstoreError::InvalidQuery(format!(
                "range bounds on [{}] must be numbers",
                self.field
            )));
        }

        let Some((min, max)) = self.encoded_bounds(decl.field_type) else {
            return Ok(Vec::new());
        };
        Ok(ctx.collect_ids(|segment| segment.range_query(&self.field, min, max)))
    }

    /// Bounds in column encoding, or None when the range is empty
    fn encoded_bounds(&self, field_type: FieldType) -> Option<(i64, i64)> {
        let (min, max) = match field_type {
            FieldType::Double => (
                f64_to_sortable_i64(self.gte.as_f64()),
                f64_to_sortable_i64(self.lte.as_f64()),
            ),
            _ => {
                let min = match self.gte {
                    RangeValue::Long(v) => v,
                    // Saturates at the i64 bounds
                    RangeValue::Double(v) => v.ceil() as i64,
                };
                let max = match self.lte {
                    RangeValue::Long(v) => v,
                    RangeValue::Double(v) => v.floor() as i64,
                };
                (min, max)
            }
        };
        (min <= max).then_some((min, max))
    }
}
