use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use url::Url;

use super::cardinality::Max;
use super::datatype;
use super::field::FieldSpec;
use crate::error::{FhirModelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    Resource,
    ComplexType,
    /// Nested structure addressed by its path, e.g. `Coverage.class`.
    Backbone,
}

/// Ordered field table for one resource type, datatype or nested structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    pub name: String,
    pub kind: SchemaKind,
    #[serde(default, rename = "abstract", skip_serializing_if = "std::ops::Not::not")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_params: Vec<String>,
}

impl ResourceSchema {
    pub fn new(name: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_abstract: false,
            url: None,
            base: None,
            fields: Vec::new(),
            search_params: Vec::new(),
        }
    }

    pub fn resource(name: impl Into<String>) -> Self {
        Self::new(name, SchemaKind::Resource)
    }

    pub fn backbone(path: impl Into<String>) -> Self {
        Self::new(path, SchemaKind::Backbone)
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_search_param(mut self, name: impl Into<String>) -> Self {
        self.search_params.push(name.into());
        self
    }

    pub fn is_resource(&self) -> bool {
        self.kind == SchemaKind::Resource
    }

    /// Root type of the schema: `Coverage` for `Coverage.class`.
    pub fn root_type(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Lookup by wire name. Choice groups are found by their `[x]` name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_storage_name(&self, storage_name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.storage_name() == storage_name)
    }

    pub fn choice_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_choice())
    }

    /// Fill in each field's dotted path from the schema name.
    pub fn assign_paths(&mut self) {
        for field in &mut self.fields {
            field.path = format!("{}.{}", self.name, field.name);
        }
    }

    pub fn validate_structure(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FhirModelError::invalid_schema("Schema name cannot be empty"));
        }

        let mut wire_names = HashSet::new();
        let mut storage_names = HashSet::new();

        for field in &self.fields {
            let at = format!("{}.{}", self.name, field.name);

            if field.base_name().is_empty() {
                return Err(FhirModelError::invalid_schema(format!(
                    "Field name cannot be empty in {}",
                    self.name
                )));
            }
            if !wire_names.insert(field.name.as_str()) {
                return Err(FhirModelError::invalid_schema(format!(
                    "Duplicate field {at}"
                )));
            }
            if !storage_names.insert(field.storage_name()) {
                return Err(FhirModelError::invalid_schema(format!(
                    "Duplicate storage name '{}' at {at}",
                    field.storage_name()
                )));
            }
            if let Max::Bounded(max) = field.max {
                if field.min > max {
                    return Err(FhirModelError::invalid_schema(format!(
                        "Minimum cardinality {} exceeds maximum {max} at {at}",
                        field.min
                    )));
                }
            }

            match (&field.content_reference, field.types.len()) {
                (Some(_), 0) => {}
                (Some(_), _) => {
                    return Err(FhirModelError::invalid_schema(format!(
                        "Content reference field {at} cannot also declare types"
                    )));
                }
                (None, 0) => {
                    return Err(FhirModelError::invalid_schema(format!(
                        "Field {at} declares no type"
                    )));
                }
                (None, 1) => {}
                (None, _) if field.is_choice() => {}
                (None, _) => {
                    return Err(FhirModelError::invalid_schema(format!(
                        "Field {at} declares several types but is not a choice field"
                    )));
                }
            }

            if field.types.iter().any(String::is_empty) {
                return Err(FhirModelError::invalid_schema(format!(
                    "Field {at} declares an empty type code"
                )));
            }

            if field.is_choice() && field.storage_name.is_some() {
                return Err(FhirModelError::invalid_schema(format!(
                    "Choice field {at} cannot rename its storage"
                )));
            }

            if field.binding.is_some() && !field.types.iter().any(|t| datatype::is_bindable(t)) {
                return Err(FhirModelError::invalid_schema(format!(
                    "Binding on {at} which has no coded type"
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for ResourceSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceSchema({})", self.name)?;
        if let Some(base) = &self.base {
            write!(f, " : {base}")?;
        }
        if let Some(url) = &self.url {
            write!(f, " [{url}]")?;
        }
        Ok(())
    }
}
