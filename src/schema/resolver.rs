//! Field resolution and the mapping registry
//!
//! Resolution order for a field name:
//! 1. an existing declaration (explicit, or registered by an earlier document)
//! 2. the first dynamic template that matches
//! 3. the dynamic mapping mode (`true`, `false`, `strict`)
//!
//! The registry keeps the current mapping behind an `ArcSwap`. Readers take
//! a point-in-time snapshot; registrations build a new mapping and swap it in.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::field_type::FieldType;
use super::mapping::{DynamicMapping, FieldDeclaration, Mapping};
use crate::error::{MapstoreError, Result};

/// Outcome of resolving a single field
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// The field already has a declaration
    Declared(FieldDeclaration),
    /// A new declaration that must be registered before use
    Introduced(FieldDeclaration),
    /// Dynamic mapping is off; the field is not indexed
    Ignored,
}

impl Resolution {
    pub fn declaration(&self) -> Option<&FieldDeclaration> {
        match self {
            Resolution::Declared(decl) | Resolution::Introduced(decl) => Some(decl),
            Resolution::Ignored => None,
        }
    }
}

/// Resolve the storage decision for `name` holding `value`.
///
/// An explicit declaration wins outright. Otherwise the mapping's templates
/// and dynamic mode decide.
pub fn resolve(
    name: &str,
    explicit: Option<&FieldDeclaration>,
    mapping: &Mapping,
    value: &Value,
) -> Result<Resolution> {
    if let Some(decl) = explicit.or_else(|| mapping.get_field(name)) {
        return Ok(Resolution::Declared(decl.clone()));
    }

    let detected = FieldType::detect(value);

    if let Some(template) = mapping.find_template(name, value) {
        let decl = template.mapping.declare(name, detected, false)?;
        debug!(field = name, template = %template.name, "Matched dynamic template");
        return Ok(Resolution::Introduced(decl));
    }

    match mapping.dynamic {
        DynamicMapping::Strict => Err(MapstoreError::StrictMappingViolation(name.to_string())),
        DynamicMapping::False => Ok(Resolution::Ignored),
        DynamicMapping::True => {
            let field_type = detected.ok_or_else(|| MapstoreError::InvalidValue {
                field: name.to_string(),
                reason: format!(
                    "cannot detect a type for a value of type [{}]",
                    super::field_type::json_mapping_type(value)
                ),
            })?;
            let mut forms = mapping.dynamic_defaults;
            forms.columnar &= field_type.column_kind().is_some();
            Ok(Resolution::Introduced(FieldDeclaration {
                name: name.to_string(),
                field_type,
                forms,
                explicit: false,
            }))
        }
    }
}

/// Owns the mapping of one index
pub struct MappingRegistry {
    current: ArcSwap<Mapping>,
    /// Serializes copy-on-write updates
    write_lock: Mutex<()>,
}

impl MappingRegistry {
    pub fn new(mapping: Mapping) -> Self {
        Self {
            current: ArcSwap::from_pointee(mapping),
            write_lock: Mutex::new(()),
        }
    }

    /// Point-in-time view of the mapping
    pub fn snapshot(&self) -> Arc<Mapping> {
        self.current.load_full()
    }

    pub fn get_field_declaration(&self, name: &str) -> Option<FieldDeclaration> {
        self.current.load().get_field(name).cloned()
    }

    /// Merge a mapping definition into the current one.
    ///
    /// Fields already declared must be redeclared identically. Templates,
    /// `_source` and dynamic settings are taken from `update`.
    pub fn define_mapping(&self, update: Mapping) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self.current.load_full();

        let mut merged = (*current).clone();
        for (name, decl) in update.fields {
            let replace = match merged.fields.get(&name) {
                Some(existing) if !existing.is_compatible_with(&decl) => {
                    return Err(conflict(existing, &decl));
                }
                // An explicit redeclaration promotes a dynamic field
                Some(existing) => !existing.explicit && decl.explicit,
                None => true,
            };
            if replace {
                merged.fields.insert(name, decl);
            }
        }
        merged.dynamic_templates = update.dynamic_templates;
        merged.source_enabled = update.source_enabled;
        merged.dynamic = update.dynamic;
        merged.dynamic_defaults = update.dynamic_defaults;

        info!(
            fields = merged.fields.len(),
            templates = merged.dynamic_templates.len(),
            source_enabled = merged.source_enabled,
            "Mapping updated"
        );
        self.current.store(Arc::new(merged));
        Ok(())
    }

    /// Register declarations introduced by a document.
    ///
    /// Identical re-registrations are no-ops; a different declaration for a
    /// field that is already registered fails with `ConflictingDeclaration`.
    pub fn register(&self, declarations: &[FieldDeclaration]) -> Result<()> {
        if declarations.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock();
        let current = self.current.load_full();

        let mut added = Vec::new();
        for decl in declarations {
            match current.get_field(&decl.name) {
                Some(existing) if existing.is_compatible_with(decl) => {}
                Some(existing) => return Err(conflict(existing, decl)),
                None => added.push(decl),
            }
        }
        if added.is_empty() {
            return Ok(());
        }

        let mut updated = (*current).clone();
        for decl in added {
            debug!(
                field = %decl.name,
                field_type = %decl.field_type,
                forms = %decl.forms,
                "Registered dynamic field"
            );
            updated.fields.insert(decl.name.clone(), decl.clone());
        }
        self.current.store(Arc::new(updated));
        Ok(())
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new(Mapping::default())
    }
}

fn conflict(existing: &FieldDeclaration, requested: &FieldDeclaration) -> MapstoreError {
    MapstoreError::ConflictingDeclaration {
        field: existing.name.clone(),
        declared: existing.describe(),
        requested: requested.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mapping::{DynamicTemplate, FieldMapping, StorageForms};
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
                    FieldMapping::integer()
                        .with_index(false)
                        .with_store(false)
                        .with_doc_values(true),
                )
                .unwrap(),
            )
            .unwrap()
            .with_source_enabled(false)
    }

    #[test]
    fn test_explicit_declaration_wins() {
        let mapping = scenario_mapping();
        let explicit = FieldMapping::keyword().declare("dv_x", None, true).unwrap();

        let resolution = resolve("dv_x", Some(&explicit), &mapping, &json!("a")).unwrap();
        assert_eq!(resolution, Resolution::Declared(explicit));
    }

    #[test]
    fn test_template_resolution() {
        let mapping = scenario_mapping();
        let resolution = resolve("dv_field", None, &mapping, &json!(100)).unwrap();

        let decl = match resolution {
            Resolution::Introduced(decl) => decl,
            other => panic!("unexpected resolution {:?}", other),
        };
        assert_eq!(decl.field_type, FieldType::Integer);
        assert_eq!(decl.forms, StorageForms::new(false, false, true));
        assert!(!decl.explicit);
    }

    #[test]
    fn test_dynamic_modes() {
        let mapping = Mapping::new();
        let decl = resolve("other", None, &mapping, &json!("hello"))
            .unwrap()
            .declaration()
            .cloned()
            .unwrap();
        assert_eq!(decl.field_type, FieldType::Text);
        assert_eq!(decl.forms, StorageForms::default());

        let mapping = Mapping::new().with_dynamic(DynamicMapping::False);
        assert_eq!(
            resolve("other", None, &mapping, &json!(1)).unwrap(),
            Resolution::Ignored
        );

        let mapping = Mapping::new().with_dynamic(DynamicMapping::Strict);
        let err = resolve("other", None, &mapping, &json!(1)).unwrap_err();
        assert!(matches!(err, MapstoreError::StrictMappingViolation(ref f) if f == "other"));
    }

    #[test]
    fn test_dynamic_defaults_never_columnar_for_text() {
        let mapping =
            Mapping::new().with_dynamic_defaults(StorageForms::new(true, false, true));

        let text = resolve("t", None, &mapping, &json!("x")).unwrap();
        assert!(!text.declaration().unwrap().columnar());
        let long = resolve("n", None, &mapping, &json!(5)).unwrap();
        assert!(long.declaration().unwrap().columnar());
    }

    #[test]
    fn test_register_and_snapshot() {
        let registry = MappingRegistry::new(scenario_mapping());
        let before = registry.snapshot();

        let decl = resolve("dv_field", None, &before, &json!(100))
            .unwrap()
            .declaration()
            .cloned()
            .unwrap();
        registry.register(&[decl.clone()]).unwrap();
        // Identical registration is a no-op
        registry.register(&[decl.clone()]).unwrap();

        assert!(before.get_field("dv_field").is_none());
        assert_eq!(registry.get_field_declaration("dv_field"), Some(decl));
    }

    #[test]
    fn test_register_conflict() {
        let registry = MappingRegistry::new(scenario_mapping());
        let conflicting = FieldMapping::text()
            .with_store(false)
            .declare("name", None, false)
            .unwrap();

        let err = registry.register(&[conflicting]).unwrap_err();
        match err {
            MapstoreError::ConflictingDeclaration {
                field,
                declared,
                requested,
            } => {
                assert_eq!(field, "name");
                assert_eq!(declared, "text (index=true, store=true, doc_values=false)");
                assert_eq!(requested, "text (index=true, store=false, doc_values=false)");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_define_mapping_merges() {
        let registry = MappingRegistry::new(scenario_mapping());

        // Same declaration again plus a new field
        let update = scenario_mapping().field("tag", FieldMapping::keyword()).unwrap();
        registry.define_mapping(update).unwrap();
        assert!(registry.get_field_declaration("tag").is_some());
        assert!(!registry.snapshot().source_enabled);

        // Turning doc values on for an existing field is rejected
        let update = Mapping::new()
            .field("name", FieldMapping::keyword().with_doc_values(true))
            .unwrap();
        let err = registry.define_mapping(update).unwrap_err();
        assert!(matches!(err, MapstoreError::ConflictingDeclaration { .. }));
        assert_eq!(
            registry.get_field_declaration("name").unwrap().field_type,
            FieldType::Text
        );
    }

    #[test]
    fn test_define_mapping_promotes_dynamic_field() {
        let registry = MappingRegistry::new(scenario_mapping());
        let dynamic = resolve("dv_field", None, &registry.snapshot(), &json!(1))
            .unwrap()
            .declaration()
            .cloned()
            .unwrap();
        registry.register(&[dynamic]).unwrap();

        let update = scenario_mapping()
            .field(
                "dv_field",
                FieldMapping::integer().with_index(false).with_doc_values(true),
            )
            .unwrap();
        registry.define_mapping(update).unwrap();
        assert!(registry.get_field_declaration("dv_field").unwrap().explicit);
    }
}
