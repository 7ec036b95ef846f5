use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FhirModelError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FhirModelsConfig {
    pub fhir_version: FhirVersion,
    pub validation: ValidatorConfig,
    pub codec: CodecConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FhirVersion {
    #[default]
    #[serde(rename = "4.0.1")]
    R4,
    #[serde(rename = "4.3.0")]
    R4B,
    #[serde(rename = "5.0.0")]
    R5,
}

/// What to do with codes outside an extensible or preferred binding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryBindingMode {
    #[default]
    Ignore,
    Warn,
}

/// Severity of a reference whose target type is not allowed by the field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceTargetMode {
    #[default]
    Error,
    Warn,
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    pub advisory_bindings: AdvisoryBindingMode,
    pub reference_targets: ReferenceTargetMode,
    pub validate_primitives: bool,
    /// Nesting depth past which nested structures are not descended into.
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CodecConfig {
    pub reject_unknown_choice_types: bool,
    pub reject_unknown_elements: bool,
    pub pretty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    pub max_concurrent_validations: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            advisory_bindings: AdvisoryBindingMode::Ignore,
            reference_targets: ReferenceTargetMode::Error,
            validate_primitives: true,
            max_depth: 32,
        }
    }
}

impl ValidatorConfig {
    pub fn strict() -> Self {
        Self {
            advisory_bindings: AdvisoryBindingMode::Warn,
            ..Self::default()
        }
    }

    pub fn lenient() -> Self {
        Self {
            reference_targets: ReferenceTargetMode::Warn,
            validate_primitives: false,
            ..Self::default()
        }
    }

    pub fn with_advisory_bindings(mut self, mode: AdvisoryBindingMode) -> Self {
        self.advisory_bindings = mode;
        self
    }

    pub fn with_reference_targets(mut self, mode: ReferenceTargetMode) -> Self {
        self.reference_targets = mode;
        self
    }
}

impl CodecConfig {
    pub fn strict() -> Self {
        Self {
            reject_unknown_choice_types: true,
            reject_unknown_elements: true,
            pretty: false,
        }
    }

    pub fn pretty() -> Self {
        Self {
            pretty: true,
            ..Self::default()
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get() * 2,
        }
    }
}

impl FhirModelsConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            other => Err(FhirModelError::Config {
                message: format!(
                    "Unsupported configuration file extension {:?} for {}",
                    other.unwrap_or(""),
                    path.display()
                ),
            }),
        }
    }

    pub fn with_validation(mut self, validation: ValidatorConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fhir_version != FhirVersion::R4 {
            return Err(FhirModelError::Config {
                message: format!(
                    "FHIR version {} is not supported; only 4.0.1 schema tables are built in",
                    self.fhir_version
                ),
            });
        }
        if self.performance.max_concurrent_validations == 0 {
            return Err(FhirModelError::Config {
                message: "performance.max_concurrent_validations must be at least 1".to_string(),
            });
        }
        if self.validation.max_depth == 0 {
            return Err(FhirModelError::Config {
                message: "validation.max_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FhirVersion::R4 => write!(f, "4.0.1"),
            FhirVersion::R4B => write!(f, "4.3.0"),
            FhirVersion::R5 => write!(f, "5.0.0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FhirModelsConfig::default();
        assert_eq!(config.fhir_version, FhirVersion::R4);
        assert_eq!(config.validation.advisory_bindings, AdvisoryBindingMode::Ignore);
        assert_eq!(config.validation.reference_targets, ReferenceTargetMode::Error);
        assert!(config.performance.max_concurrent_validations >= 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = FhirModelsConfig::from_yaml_str(
            "validation:\n  advisory_bindings: warn\n  reference_targets: ignore\ncodec:\n  pretty: true\n",
        )
        .unwrap();
        assert_eq!(config.validation.advisory_bindings, AdvisoryBindingMode::Warn);
        assert_eq!(config.validation.reference_targets, ReferenceTargetMode::Ignore);
        assert!(config.validation.validate_primitives);
        assert!(config.codec.pretty);
        assert!(!config.codec.reject_unknown_elements);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let err = FhirModelsConfig::from_json_str(r#"{"fhir_version":"5.0.0"}"#).unwrap_err();
        assert!(matches!(err, FhirModelError::Config { .. }));
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            ValidatorConfig::lenient().reference_targets,
            ReferenceTargetMode::Warn
        );
        assert_eq!(
            ValidatorConfig::strict().advisory_bindings,
            AdvisoryBindingMode::Warn
        );
        assert!(CodecConfig::strict().reject_unknown_choice_types);
    }
}
