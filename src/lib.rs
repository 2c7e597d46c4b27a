pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod query;
pub mod schema;
pub mod segment;
pub mod tokenizer;

pub use config::{AnalyzerConfig, BufferConfig, IndexConfig, MergePolicyConfig};
pub use engine::Index;
pub use error::{MapstoreError, Result};
pub use models::*;
pub use query::{RangeQuery, RangeValue, TermQuery, ValueQuery};
pub use schema::{
    DynamicMapping, DynamicTemplate, FieldDeclaration, FieldMapping, FieldType, Mapping,
    StorageForms,
};
pub use segment::{SegmentId, SegmentInfo, Version};
pub use tokenizer::Tokenizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
