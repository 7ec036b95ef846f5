//! Process-wide table of resource, datatype and nested-structure schemas.

mod builtin;

use once_cell::sync::Lazy;
use papaya::HashMap as PapayaMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{FhirModelError, Result};
use crate::types::choice_types::choice_suffix;
use crate::types::datatype::{self, TypeCategory};
use crate::types::{ChoiceResolution, FieldSpec, ResourceSchema, capitalize_first};

pub use builtin::R4_TABLES;

static R4: Lazy<Arc<SchemaRegistry>> = Lazy::new(|| match SchemaRegistry::with_r4() {
    Ok(registry) => Arc::new(registry),
    Err(e) => panic!("embedded FHIR R4 schema tables are inconsistent: {e}"),
});

/// Schemas keyed by type name or, for nested structures, by fully-qualified path
/// (`AdverseEvent.suspectEntity.causality`).
///
/// Registration flattens base types into the registered schema, so every lookup returns the
/// complete ordered field table. Reads never block.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: PapayaMap<String, Arc<ResourceSchema>>,
    choice_resolutions: PapayaMap<String, ChoiceResolution>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh registry preloaded with the built-in R4 tables, open for further registrations.
    pub fn with_r4() -> Result<Self> {
        let registry = Self::new();
        builtin::load_r4(&registry)?;
        Ok(registry)
    }

    /// The shared, immutable R4 registry.
    pub fn r4() -> Arc<SchemaRegistry> {
        Arc::clone(&R4)
    }

    pub fn register_schema(
        &self,
        resource_type: &str,
        mut schema: ResourceSchema,
    ) -> Result<Arc<ResourceSchema>> {
        if schema.name.is_empty() {
            schema.name = resource_type.to_string();
        } else if schema.name != resource_type {
            return Err(FhirModelError::invalid_schema(format!(
                "Schema named {} cannot be registered as {resource_type}",
                schema.name
            )));
        }

        if self.contains(resource_type) {
            return Err(FhirModelError::DuplicateSchema {
                resource_type: resource_type.to_string(),
            });
        }

        let mut schema = self.flatten(schema)?;
        schema.assign_paths();
        schema.validate_structure()?;

        let schema = Arc::new(schema);
        let guard = self.schemas.pin();
        if guard
            .try_insert(resource_type.to_string(), Arc::clone(&schema))
            .is_err()
        {
            return Err(FhirModelError::DuplicateSchema {
                resource_type: resource_type.to_string(),
            });
        }

        debug!(
            resource_type,
            fields = schema.fields.len(),
            "Registered schema"
        );
        Ok(schema)
    }

    /// Register several schemas in order; bases must precede the types deriving from them.
    pub fn register_all(&self, schemas: impl IntoIterator<Item = ResourceSchema>) -> Result<usize> {
        let mut count = 0;
        for schema in schemas {
            let name = schema.name.clone();
            self.register_schema(&name, schema)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get_schema(&self, resource_type: &str) -> Result<Arc<ResourceSchema>> {
        self.find_schema(resource_type)
            .ok_or_else(|| FhirModelError::unknown_resource_type(resource_type))
    }

    pub fn find_schema(&self, resource_type: &str) -> Option<Arc<ResourceSchema>> {
        self.schemas.pin().get(resource_type).cloned()
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.schemas.pin().contains_key(resource_type)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Concrete (non-abstract) resource types, sorted by name.
    pub fn resource_types(&self) -> Vec<String> {
        let guard = self.schemas.pin();
        let mut names: Vec<String> = guard
            .iter()
            .filter(|(_, schema)| schema.is_resource() && !schema.is_abstract)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Map a concrete wire name onto its choice group within the schema at `base_path`.
    ///
    /// When several declared alternatives match, the longest type code wins.
    pub fn resolve_choice_field(&self, base_path: &str, concrete: &str) -> Result<ChoiceResolution> {
        let cache_key = format!("{base_path}#{concrete}");
        if let Some(hit) = self.choice_resolutions.pin().get(&cache_key) {
            return Ok(hit.clone());
        }

        let schema = self.get_schema(base_path)?;
        let mut prefix_group: Option<&FieldSpec> = None;
        let mut best: Option<(&FieldSpec, &str)> = None;

        for field in schema.choice_fields() {
            let Some(suffix) = choice_suffix(field.base_name(), concrete) else {
                continue;
            };
            prefix_group.get_or_insert(field);
            for type_code in &field.types {
                if capitalize_first(type_code) == suffix
                    && best.is_none_or(|(_, current)| type_code.len() > current.len())
                {
                    best = Some((field, type_code));
                }
            }
        }

        match (best, prefix_group) {
            (Some((field, type_code)), _) => {
                let resolution = ChoiceResolution {
                    group: field.name.clone(),
                    base: field.base_name().to_string(),
                    type_code: type_code.to_string(),
                };
                self.choice_resolutions
                    .pin()
                    .insert(cache_key, resolution.clone());
                Ok(resolution)
            }
            (None, Some(group)) => Err(FhirModelError::UnresolvableChoiceField {
                group: group.path.clone(),
                field_name: concrete.to_string(),
            }),
            (None, None) => Err(FhirModelError::NotAChoiceField {
                base_path: base_path.to_string(),
                field_name: concrete.to_string(),
            }),
        }
    }

    /// Schema describing the values of `field` when they hold `type_code`.
    ///
    /// `None` for primitives, for `Resource` (resolved from the value itself) and for
    /// complex types that are not registered.
    pub fn nested_schema(
        &self,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
    ) -> Option<Arc<ResourceSchema>> {
        if let Some(reference) = &field.content_reference {
            return self.find_schema(reference.trim_start_matches('#'));
        }
        match datatype::categorize(type_code) {
            TypeCategory::Backbone => {
                self.find_schema(&format!("{}.{}", owner.name, field.base_name()))
            }
            TypeCategory::Complex => self.find_schema(type_code),
            TypeCategory::Primitive(_) | TypeCategory::Resource => None,
        }
    }

    /// Look a field up by dotted path, walking through nested structures and datatypes:
    /// `AdverseEvent.suspectEntity.causality.method`, `Coverage.period.start`,
    /// `ClinicalImpression.effective[x]` or `ClinicalImpression.effectivePeriod`.
    pub fn field_by_path(&self, path: &str) -> Result<FieldSpec> {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let mut schema = self.get_schema(root)?;
        let mut segments = segments.peekable();

        while let Some(segment) = segments.next() {
            let (field, type_code) = match schema.field(segment) {
                Some(field) => (field.clone(), field.single_type().map(str::to_string)),
                None => match self.resolve_choice_field(&schema.name, segment) {
                    Ok(resolution) => {
                        let field = schema.field(&resolution.group).cloned().ok_or_else(|| {
                            FhirModelError::UnknownField {
                                schema: schema.name.clone(),
                                field: segment.to_string(),
                            }
                        })?;
                        (field, Some(resolution.type_code))
                    }
                    Err(_) => {
                        return Err(FhirModelError::UnknownField {
                            schema: schema.name.clone(),
                            field: segment.to_string(),
                        });
                    }
                },
            };

            if segments.peek().is_none() {
                return Ok(field);
            }

            let next = type_code
                .and_then(|code| self.nested_schema(&schema, &field, &code))
                .ok_or_else(|| FhirModelError::UnknownField {
                    schema: schema.name.clone(),
                    field: segment.to_string(),
                })?;
            schema = next;
        }

        Err(FhirModelError::UnknownField {
            schema: schema.name.clone(),
            field: path.to_string(),
        })
    }

    fn flatten(&self, mut schema: ResourceSchema) -> Result<ResourceSchema> {
        let Some(base_name) = schema.base.clone() else {
            return Ok(schema);
        };
        let base = self.find_schema(&base_name).ok_or_else(|| {
            FhirModelError::invalid_schema(format!(
                "Base type {base_name} of {} is not registered",
                schema.name
            ))
        })?;

        let mut fields = base.fields.clone();
        for own in schema.fields.drain(..) {
            match fields.iter_mut().find(|f| f.name == own.name) {
                Some(inherited) => *inherited = own,
                None => fields.push(own),
            }
        }
        schema.fields = fields;

        let mut search_params = base.search_params.clone();
        search_params.extend(
            schema
                .search_params
                .drain(..)
                .filter(|p| !base.search_params.contains(p)),
        );
        schema.search_params = search_params;
        Ok(schema)
    }
}
