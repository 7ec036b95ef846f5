use serde::{Deserialize, Serialize};

use super::binding::Binding;
use super::cardinality::Max;
use super::choice_types::{CHOICE_SUFFIX, choice_wire_name};
use super::datatype::{self, TypeCategory};

const STRUCTURE_DEFINITION_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

/// One field of a schema.
///
/// `name` is the wire name (`class`, `effective[x]`). `storage_name` is the identifier the
/// field is stored under in an [`Instance`](super::Instance); it defaults to the wire name
/// with any `[x]` suffix removed and only needs declaring when the two must differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: Max,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<Binding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_profiles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_reference: Option<String>,
    /// Carried as an XML attribute rather than a child element (`Element.id`, `Extension.url`).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub xml_attr: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, type_code: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            name: name.into(),
            storage_name: None,
            types: vec![type_code.into()],
            min: 0,
            max: Max::Bounded(1),
            binding: None,
            target_profiles: Vec::new(),
            content_reference: None,
            xml_attr: false,
        }
    }

    /// A polymorphic field. `base` may be given with or without the `[x]` suffix.
    pub fn choice<I, S>(base: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut name = base.into();
        if !name.ends_with(CHOICE_SUFFIX) {
            name.push_str(CHOICE_SUFFIX);
        }
        Self {
            types: types.into_iter().map(Into::into).collect(),
            ..Self::new(name, String::new())
        }
    }

    pub fn with_cardinality(mut self, min: u32, max: Max) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn required(mut self) -> Self {
        self.min = self.min.max(1);
        self
    }

    pub fn repeating(mut self) -> Self {
        self.max = Max::Unbounded;
        self
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_target_types<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.target_profiles = targets
            .into_iter()
            .map(|t| format!("{STRUCTURE_DEFINITION_PREFIX}{}", t.as_ref()))
            .collect();
        self
    }

    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = Some(storage_name.into());
        self
    }

    pub fn with_content_reference(mut self, path: impl Into<String>) -> Self {
        self.content_reference = Some(path.into());
        self.types.clear();
        self
    }

    pub fn as_xml_attribute(mut self) -> Self {
        self.xml_attr = true;
        self
    }

    pub fn is_choice(&self) -> bool {
        self.name.ends_with(CHOICE_SUFFIX)
    }

    /// Wire name without the `[x]` suffix.
    pub fn base_name(&self) -> &str {
        self.name.strip_suffix(CHOICE_SUFFIX).unwrap_or(&self.name)
    }

    pub fn storage_name(&self) -> &str {
        self.storage_name.as_deref().unwrap_or_else(|| self.base_name())
    }

    pub fn is_required(&self) -> bool {
        self.min > 0
    }

    pub fn is_repeating(&self) -> bool {
        self.max.is_repeating()
    }

    pub fn declares_type(&self, type_code: &str) -> bool {
        self.types.iter().any(|t| t == type_code)
    }

    /// The declared type of a non-choice field; backbone for content references.
    pub fn single_type(&self) -> Option<&str> {
        if self.content_reference.is_some() {
            return Some("BackboneElement");
        }
        match self.types.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn is_backbone(&self) -> bool {
        self.content_reference.is_some()
            || self
                .single_type()
                .is_some_and(|t| datatype::categorize(t) == TypeCategory::Backbone)
    }

    /// Concrete wire names of every alternative of a choice field.
    pub fn choice_wire_names(&self) -> Vec<(String, &str)> {
        self.types
            .iter()
            .map(|t| (choice_wire_name(self.base_name(), t), t.as_str()))
            .collect()
    }

    /// Resource type names allowed as reference targets.
    pub fn target_resource_types(&self) -> Vec<&str> {
        self.target_profiles
            .iter()
            .map(|profile| profile.rsplit('/').next().unwrap_or(profile))
            .collect()
    }

    pub fn allows_any_target(&self) -> bool {
        self.target_profiles.is_empty()
            || self
                .target_resource_types()
                .iter()
                .any(|t| *t == datatype::RESOURCE)
    }
}
