use thiserror::Error;

use crate::validation::ValidationIssue;

#[derive(Error, Debug)]
pub enum FhirModelError {
    #[error("Unknown resource type: {resource_type}")]
    UnknownResourceType { resource_type: String },

    #[error("Schema already registered for type: {resource_type}")]
    DuplicateSchema { resource_type: String },

    #[error("'{field_name}' is not a choice field of {base_path}")]
    NotAChoiceField {
        base_path: String,
        field_name: String,
    },

    #[error("'{field_name}' does not name a declared type of choice field {group}")]
    UnresolvableChoiceField { group: String, field_name: String },

    #[error("Malformed wire format at {path}: {message}")]
    MalformedWireFormat { path: String, message: String },

    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("Field '{field}' is not declared by schema {schema}")]
    UnknownField { schema: String, field: String },

    #[error("Validation failed with {} error(s)", .issues.len())]
    ValidationFailed { issues: Vec<ValidationIssue> },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation task failed: {message}")]
    TaskFailed { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FhirModelError {
    pub fn unknown_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnknownResourceType {
            resource_type: resource_type.into(),
        }
    }

    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedWireFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Path of the offending wire location, when the error carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::MalformedWireFormat { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FhirModelError>;
