//! Schema: field types, mappings and field resolution
//!
//! - Field types and value coercion
//! - Mappings with explicit declarations and dynamic templates
//! - The mapping registry and the per-field resolver
//! - Document parsing against a mapping snapshot

mod field_type;
mod glob;
mod mapping;
mod parser;
mod resolver;

pub use field_type::{json_mapping_type, FieldType, FieldValue};
pub use glob::GlobPattern;
pub use mapping::{
    validate_field_name, DynamicMapping, DynamicTemplate, FieldDeclaration, FieldMapping, Mapping,
    StorageForms,
};
pub use parser::{DocumentParser, ParsedDocument, ParsedField};
pub use resolver::{resolve, MappingRegistry, Resolution};
