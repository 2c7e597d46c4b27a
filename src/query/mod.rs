//! Query execution over a published snapshot
//!
//! - Range queries read doc values columns
//! - Term queries read the inverted index
//! - Value queries match one exact doc value
//!
//! All exclude tombstoned docs and return document ids in segment order,
//! then docno order.

mod context;
mod range;
mod term;
mod value;

pub use context::QueryContext;
pub use range::{RangeQuery, RangeValue};
pub use term::TermQuery;
pub use value::ValueQuery;
