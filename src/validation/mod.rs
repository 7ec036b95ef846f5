//! Structural validation of instances against their schemas.
//!
//! The validator walks an [`Instance`] alongside its [`ResourceSchema`], descending into nested
//! structures, datatypes and contained resources, and collects every violation it finds. It
//! never fails fast and never mutates the instance.

pub mod binding;
pub mod outcome;
pub mod parallel;
pub mod primitive;
pub mod reference;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core::{AdvisoryBindingMode, ReferenceTargetMode, ValidatorConfig};
use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::types::datatype::{self, PrimitiveShape, TypeCategory};
use crate::types::{
    Binding, BindingStrength, FieldSpec, FieldValue, Instance, ResourceSchema, choice_wire_name,
};

pub use binding::TerminologyResolver;
pub use parallel::ParallelValidator;
pub use primitive::PrimitiveValidator;
pub use reference::{LiteralReference, ReferenceResolver};

use binding::BindingVerdict;

/// Core validation engine trait for validating instances against schemas
pub trait ValidationEngine {
    /// Validate an instance against the schema registered for its type
    fn validate(&self, instance: &Instance) -> Result<ValidationResult>;

    /// Validate an instance against an explicit schema
    fn validate_with_schema(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
    ) -> Result<ValidationResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Information,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationSeverity::Error => "error",
            ValidationSeverity::Warning => "warning",
            ValidationSeverity::Information => "information",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// Occurrence count outside `min..=max`.
    Cardinality,
    /// More than one alternative of a choice group is populated.
    MultipleChoiceValues,
    /// Code outside a required binding.
    InvalidCode,
    /// Code outside an extensible or preferred binding.
    NonConformantCode,
    /// Reference to a resource type the field does not allow.
    ReferenceTarget,
    UnresolvedReference,
    TypeMismatch,
    UnknownElement,
    InvalidChoiceType,
    PrimitiveFormat,
    DepthLimit,
}

impl IssueKind {
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::Cardinality => "cardinality",
            IssueKind::MultipleChoiceValues => "multiple-choice-values",
            IssueKind::InvalidCode => "invalid-code",
            IssueKind::NonConformantCode => "non-conformant-code",
            IssueKind::ReferenceTarget => "reference-target",
            IssueKind::UnresolvedReference => "unresolved-reference",
            IssueKind::TypeMismatch => "type-mismatch",
            IssueKind::UnknownElement => "unknown-element",
            IssueKind::InvalidChoiceType => "invalid-choice-type",
            IssueKind::PrimitiveFormat => "primitive-format",
            IssueKind::DepthLimit => "depth-limit",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub kind: IssueKind,
    pub message: String,
    pub path: Option<String>,
}

impl ValidationIssue {
    pub fn new(severity: ValidationSeverity, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, kind, message)
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, kind, message)
    }

    pub fn information(kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Information, kind, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity.as_str(), self.kind)?;
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Result of validation containing all issues found
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
    /// No error-severity issues
    pub is_valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let count = |severity| issues.iter().filter(|i| i.severity == severity).count();
        let error_count = count(ValidationSeverity::Error);
        let warning_count = count(ValidationSeverity::Warning);
        let info_count = count(ValidationSeverity::Information);

        Self {
            is_valid: error_count == 0,
            issues,
            error_count,
            warning_count,
            info_count,
        }
    }

    pub fn success() -> Self {
        Self::from_issues(Vec::new())
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
        self.error_count += other.error_count;
        self.warning_count += other.warning_count;
        self.info_count += other.info_count;
        self.is_valid = self.is_valid && other.is_valid;
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }
}

/// Path bookkeeping and issue collection during one validation pass
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub current_path: String,
    pub path_stack: Vec<String>,
    pub issues: Vec<ValidationIssue>,
    pub depth: usize,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_path(&mut self, segment: &str) {
        self.path_stack.push(self.current_path.clone());
        self.current_path = self.child_path(segment);
    }

    pub fn pop_path(&mut self) {
        if let Some(previous_path) = self.path_stack.pop() {
            self.current_path = previous_path;
        }
    }

    pub fn child_path(&self, segment: &str) -> String {
        if self.current_path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.current_path, segment)
        }
    }

    /// Issues without a path are attributed to the current location
    pub fn add_issue(&mut self, mut issue: ValidationIssue) {
        if issue.path.is_none() && !self.current_path.is_empty() {
            issue.path = Some(self.current_path.clone());
        }
        self.issues.push(issue);
    }

    pub fn add_error(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.add_issue(ValidationIssue::error(kind, message));
    }

    pub fn add_warning(&mut self, kind: IssueKind, message: impl Into<String>) {
        self.add_issue(ValidationIssue::warning(kind, message));
    }

    pub fn into_result(self) -> ValidationResult {
        ValidationResult::from_issues(self.issues)
    }
}

/// Validates instances against the schemas of a [`SchemaRegistry`].
pub struct StructuralValidator {
    registry: Arc<SchemaRegistry>,
    config: ValidatorConfig,
    primitives: PrimitiveValidator,
    terminology: Option<Arc<dyn TerminologyResolver>>,
    references: Option<Arc<dyn ReferenceResolver>>,
}

impl fmt::Debug for StructuralValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralValidator")
            .field("schemas", &self.registry.len())
            .field("config", &self.config)
            .field("terminology", &self.terminology.is_some())
            .field("references", &self.references.is_some())
            .finish()
    }
}

impl StructuralValidator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            config: ValidatorConfig::default(),
            primitives: PrimitiveValidator::new(),
            terminology: None,
            references: None,
        }
    }

    /// Validator over the shared R4 registry
    pub fn r4() -> Self {
        Self::new(SchemaRegistry::r4())
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_terminology(mut self, terminology: Arc<dyn TerminologyResolver>) -> Self {
        self.terminology = Some(terminology);
        self
    }

    pub fn with_reference_resolver(mut self, references: Arc<dyn ReferenceResolver>) -> Self {
        self.references = Some(references);
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    fn check_structure(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
        container: &Instance,
        context: &mut ValidationContext,
    ) {
        for field in &schema.fields {
            if field.is_choice() {
                self.check_choice_group(instance, schema, field, container, context);
            } else {
                self.check_field(instance, schema, field, container, context);
            }
        }
        self.check_undeclared_slots(instance, schema, context);
    }

    fn check_field(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
        field: &FieldSpec,
        container: &Instance,
        context: &mut ValidationContext,
    ) {
        let values = instance.get(field.storage_name());
        let count = values.len().max(meta_count(instance, &field.name));
        self.check_cardinality(field, &field.name, count, context);

        let Some(type_code) = field.single_type() else {
            return;
        };
        let indexed = field.is_repeating() || values.len() > 1;
        for (index, value) in values.iter().enumerate() {
            context.push_path(&segment(&field.name, indexed, index));
            self.check_value(schema, field, type_code, value, container, context);
            context.pop_path();
        }
    }

    fn check_choice_group(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
        field: &FieldSpec,
        container: &Instance,
        context: &mut ValidationContext,
    ) {
        let alternatives = instance.choice_alternatives(field.storage_name());

        if alternatives.len() > 1 {
            let populated: Vec<String> = alternatives
                .iter()
                .map(|(type_code, _)| choice_wire_name(field.base_name(), type_code))
                .collect();
            let group_path = context.child_path(&field.name);
            context.add_issue(
                ValidationIssue::error(
                    IssueKind::MultipleChoiceValues,
                    format!(
                        "At most one alternative of {group_path} may be populated, found {}",
                        populated.join(", ")
                    ),
                )
                .with_path(group_path),
            );
        } else {
            let values = alternatives.first().map_or(0, |(_, values)| values.len());
            let meta = field
                .choice_wire_names()
                .iter()
                .map(|(wire, _)| meta_count(instance, wire))
                .max()
                .unwrap_or(0);
            self.check_cardinality(field, &field.name, values.max(meta), context);
        }

        for (type_code, values) in alternatives {
            if !field.declares_type(type_code) {
                continue;
            }
            let wire = choice_wire_name(field.base_name(), type_code);
            let indexed = field.is_repeating() || values.len() > 1;
            for (index, value) in values.iter().enumerate() {
                context.push_path(&segment(&wire, indexed, index));
                self.check_value(schema, field, type_code, value, container, context);
                context.pop_path();
            }
        }
    }

    fn check_cardinality(
        &self,
        field: &FieldSpec,
        segment: &str,
        count: usize,
        context: &mut ValidationContext,
    ) {
        let path = context.child_path(segment);
        if count < field.min as usize {
            context.add_issue(
                ValidationIssue::error(
                    IssueKind::Cardinality,
                    format!(
                        "{path} requires at least {} value(s), found {count}",
                        field.min
                    ),
                )
                .with_path(path.clone()),
            );
        }
        if !field.max.allows(count) {
            context.add_issue(
                ValidationIssue::error(
                    IssueKind::Cardinality,
                    format!("{path} allows at most {} value(s), found {count}", field.max),
                )
                .with_path(path),
            );
        }
    }

    fn check_value(
        &self,
        owner: &ResourceSchema,
        field: &FieldSpec,
        type_code: &str,
        value: &FieldValue,
        container: &Instance,
        context: &mut ValidationContext,
    ) {
        match datatype::categorize(type_code) {
            TypeCategory::Primitive(shape) => {
                if !shape_matches(shape, value) {
                    context.add_error(
                        IssueKind::TypeMismatch,
                        format!("Expected a {type_code} value, found {}", value.kind_name()),
                    );
                    return;
                }
                if self.config.validate_primitives {
                    if let Some(problem) = self.primitives.check(type_code, value) {
                        context.add_error(IssueKind::PrimitiveFormat, problem);
                    }
                }
            }
            TypeCategory::Resource => {
                let Some(resource) = value.as_instance() else {
                    context.add_error(
                        IssueKind::TypeMismatch,
                        format!("Expected a resource, found {}", value.kind_name()),
                    );
                    return;
                };
                match self.registry.find_schema(resource.type_name()) {
                    Some(schema) if schema.is_resource() => {
                        self.descend(resource, &schema, container, context);
                    }
                    _ => debug!(
                        resource_type = resource.type_name(),
                        path = %context.current_path,
                        "Skipping resource without a registered schema"
                    ),
                }
            }
            TypeCategory::Backbone | TypeCategory::Complex => {
                let FieldValue::Complex(inner) = value else {
                    context.add_error(
                        IssueKind::TypeMismatch,
                        format!("Expected a {type_code} structure, found {}", value.kind_name()),
                    );
                    return;
                };
                if type_code == datatype::REFERENCE {
                    self.check_reference(field, inner, container, context);
                }
                if let Some(nested) = self.registry.nested_schema(owner, field, type_code) {
                    self.descend(inner, &nested, container, context);
                }
            }
        }

        if let Some(binding) = &field.binding {
            self.check_binding(binding, type_code, value, context);
        }
    }

    fn descend(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
        container: &Instance,
        context: &mut ValidationContext,
    ) {
        if context.depth >= self.config.max_depth {
            context.add_issue(ValidationIssue::information(
                IssueKind::DepthLimit,
                format!(
                    "Nesting deeper than {} levels is not validated",
                    self.config.max_depth
                ),
            ));
            return;
        }
        context.depth += 1;
        self.check_structure(instance, schema, container, context);
        context.depth -= 1;
    }

    fn check_binding(
        &self,
        binding: &Binding,
        type_code: &str,
        value: &FieldValue,
        context: &mut ValidationContext,
    ) {
        let enforced = match binding.strength {
            BindingStrength::Required => true,
            strength if strength.is_advisory() => {
                self.config.advisory_bindings == AdvisoryBindingMode::Warn
            }
            _ => false,
        };
        if !enforced {
            return;
        }

        let verdict = binding::evaluate(binding, type_code, value, self.terminology.as_deref());
        if let BindingVerdict::NotInValueSet(found) = verdict {
            let value_set = binding.value_set.as_deref().unwrap_or("the bound value set");
            if binding.strength == BindingStrength::Required {
                context.add_error(
                    IssueKind::InvalidCode,
                    format!("{found} is not in {value_set} (required binding)"),
                );
            } else {
                context.add_warning(
                    IssueKind::NonConformantCode,
                    format!(
                        "{found} is not in {value_set} ({} binding)",
                        binding.strength.as_str()
                    ),
                );
            }
        }
    }

    fn check_reference(
        &self,
        field: &FieldSpec,
        reference: &Instance,
        container: &Instance,
        context: &mut ValidationContext,
    ) {
        let literal = reference.get_str("reference");
        let mut target_type = None;

        match literal.map(LiteralReference::parse) {
            Some(LiteralReference::Contained(id)) if id.is_empty() => {
                target_type = Some(container.type_name().to_string());
            }
            Some(LiteralReference::Contained(id)) => {
                match reference::find_contained(container, &id) {
                    Some(resource) => target_type = Some(resource.type_name().to_string()),
                    None => context.add_error(
                        IssueKind::UnresolvedReference,
                        format!("No contained resource has id '{id}'"),
                    ),
                }
            }
            Some(parsed) => {
                target_type = parsed.resource_type().map(str::to_string);
                if let Some(resolver) = &self.references {
                    match resolver.dereference(reference) {
                        Some(resolved) => target_type = Some(resolved.type_name().to_string()),
                        None => context.add_warning(
                            IssueKind::UnresolvedReference,
                            format!("Reference '{}' could not be resolved", literal.unwrap_or_default()),
                        ),
                    }
                }
            }
            None => {}
        }

        let Some(target_type) = target_type.or_else(|| reference.get_str("type").map(str::to_string))
        else {
            return;
        };
        if field.allows_any_target() {
            return;
        }
        let allowed = field.target_resource_types();
        if allowed.contains(&target_type.as_str()) {
            return;
        }

        let message = format!(
            "Reference to {target_type} is not allowed here; expected {}",
            allowed.join(" | ")
        );
        match self.config.reference_targets {
            ReferenceTargetMode::Error => context.add_error(IssueKind::ReferenceTarget, message),
            ReferenceTargetMode::Warn => context.add_warning(IssueKind::ReferenceTarget, message),
            ReferenceTargetMode::Ignore => {}
        }
    }

    fn check_undeclared_slots(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
        context: &mut ValidationContext,
    ) {
        for (key, values) in instance.slots() {
            if values.is_empty() {
                continue;
            }
            let Some(field) = schema.field_by_storage_name(&key.field) else {
                let path = context.child_path(&key.field);
                context.add_issue(
                    ValidationIssue::error(
                        IssueKind::UnknownElement,
                        format!("{} declares no field stored as '{}'", schema.name, key.field),
                    )
                    .with_path(path),
                );
                continue;
            };

            let problem = match (key.choice_type.as_deref(), field.is_choice()) {
                (Some(type_code), true) if !field.declares_type(type_code) => Some(format!(
                    "{type_code} is not an allowed type for {}; expected {}",
                    field.name,
                    field.types.join(" | ")
                )),
                (Some(type_code), false) => Some(format!(
                    "{} is not a choice field but holds a {type_code} alternative",
                    field.name
                )),
                (None, true) => Some(format!("{} holds a value without a type", field.name)),
                _ => None,
            };
            if let Some(message) = problem {
                let path = context.child_path(&field.name);
                context.add_issue(
                    ValidationIssue::error(IssueKind::InvalidChoiceType, message).with_path(path),
                );
            }
        }
    }
}

impl ValidationEngine for StructuralValidator {
    fn validate(&self, instance: &Instance) -> Result<ValidationResult> {
        let schema = self.registry.get_schema(instance.type_name())?;
        self.validate_with_schema(instance, &schema)
    }

    fn validate_with_schema(
        &self,
        instance: &Instance,
        schema: &ResourceSchema,
    ) -> Result<ValidationResult> {
        let mut context = ValidationContext::new();
        context.push_path(&schema.name);
        self.check_structure(instance, schema, instance, &mut context);
        Ok(context.into_result())
    }
}

fn segment(name: &str, indexed: bool, index: usize) -> String {
    if indexed {
        format!("{name}[{index}]")
    } else {
        name.to_string()
    }
}

/// Occurrences contributed by `_field` metadata, for primitives carrying only extensions.
fn meta_count(instance: &Instance, wire_name: &str) -> usize {
    match instance.primitive_meta(wire_name) {
        Some(serde_json::Value::Array(items)) => items.len(),
        Some(_) => 1,
        None => 0,
    }
}

fn shape_matches(shape: PrimitiveShape, value: &FieldValue) -> bool {
    matches!(
        (shape, value),
        (PrimitiveShape::Boolean, FieldValue::Boolean(_))
            | (PrimitiveShape::Integer, FieldValue::Integer(_))
            | (PrimitiveShape::Decimal, FieldValue::Decimal(_) | FieldValue::Integer(_))
            | (PrimitiveShape::Text, FieldValue::String(_))
    )
}
