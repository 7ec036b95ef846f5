//! JSON and XML wire formats for schema-described instances.
//!
//! Both codecs are driven entirely by the [`SchemaRegistry`]: field order on output, `[x]`
//! choice names, storage-name mapping and primitive typing all come from the registered
//! schemas. Keys the schema does not know are carried through untouched.

pub mod json;
pub mod xml;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::core::FhirModelsConfig;
use crate::error::{FhirModelError, Result};
use crate::registry::SchemaRegistry;
use crate::types::Instance;
use crate::validation::{StructuralValidator, ValidationEngine, ValidationResult};

pub use json::JsonCodec;
pub use xml::XmlCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Json,
    Xml,
}

impl WireFormat {
    pub fn media_type(&self) -> &'static str {
        match self {
            WireFormat::Json => "application/fhir+json",
            WireFormat::Xml => "application/fhir+xml",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(WireFormat::Json),
            "xml" => Some(WireFormat::Xml),
            _ => None,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Json => write!(f, "json"),
            WireFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = FhirModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "application/fhir+json" | "application/json" => Ok(WireFormat::Json),
            "xml" | "application/fhir+xml" | "application/xml" => Ok(WireFormat::Xml),
            other => Err(FhirModelError::Config {
                message: format!("Unknown wire format '{other}'"),
            }),
        }
    }
}

/// One wire format: text in, [`Instance`] out, and back.
pub trait WireCodec {
    fn format(&self) -> WireFormat;

    fn decode(&self, input: &str) -> Result<Instance>;

    fn encode(&self, instance: &Instance) -> Result<String>;
}

/// How much validation accompanies decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Decode only.
    #[default]
    Unchecked,
    /// Decode and attach the validation report.
    Lenient,
    /// Decode and fail when validation reports errors.
    Strict,
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub instance: Instance,
    pub report: Option<ValidationResult>,
}

/// Both codecs plus a validator sharing one registry and configuration.
#[derive(Debug)]
pub struct ResourceCodec {
    json: JsonCodec,
    xml: XmlCodec,
    validator: StructuralValidator,
}

impl ResourceCodec {
    pub fn new(registry: Arc<SchemaRegistry>, config: &FhirModelsConfig) -> Self {
        let json = JsonCodec::new(Arc::clone(&registry)).with_config(config.codec.clone());
        let xml = XmlCodec::new(json.clone());
        let validator =
            StructuralValidator::new(registry).with_config(config.validation.clone());
        Self {
            json,
            xml,
            validator,
        }
    }

    /// Codecs over the shared R4 registry with default settings.
    pub fn r4() -> Self {
        Self::new(SchemaRegistry::r4(), &FhirModelsConfig::default())
    }

    /// Replace the validator, e.g. to attach terminology or reference resolvers.
    pub fn with_validator(mut self, validator: StructuralValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn json(&self) -> &JsonCodec {
        &self.json
    }

    pub fn xml(&self) -> &XmlCodec {
        &self.xml
    }

    pub fn validator(&self) -> &StructuralValidator {
        &self.validator
    }

    pub fn codec(&self, format: WireFormat) -> &dyn WireCodec {
        match format {
            WireFormat::Json => &self.json,
            WireFormat::Xml => &self.xml,
        }
    }

    pub fn decode(&self, format: WireFormat, input: &str, mode: ParseMode) -> Result<Decoded> {
        let instance = self.codec(format).decode(input)?;
        let report = match mode {
            ParseMode::Unchecked => None,
            ParseMode::Lenient | ParseMode::Strict => Some(self.validator.validate(&instance)?),
        };

        if mode == ParseMode::Strict {
            if let Some(report) = report.as_ref().filter(|r| !r.is_valid) {
                return Err(FhirModelError::ValidationFailed {
                    issues: report.errors().cloned().collect(),
                });
            }
        }

        debug!(
            %format,
            resource_type = instance.type_name(),
            ?mode,
            "Decoded resource"
        );
        Ok(Decoded { instance, report })
    }

    pub fn encode(&self, format: WireFormat, instance: &Instance) -> Result<String> {
        self.codec(format).encode(instance)
    }

    /// Re-encode a payload in another format, or normalize it within the same one.
    pub fn convert(&self, input: &str, from: WireFormat, to: WireFormat) -> Result<String> {
        let instance = self.codec(from).decode(input)?;
        self.codec(to).encode(&instance)
    }

    /// Decode and validate in one step.
    pub fn validate_wire(&self, format: WireFormat, input: &str) -> Result<ValidationResult> {
        let instance = self.codec(format).decode(input)?;
        self.validator.validate(&instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_parsing() {
        assert_eq!("JSON".parse::<WireFormat>().unwrap(), WireFormat::Json);
        assert_eq!(
            "application/fhir+xml".parse::<WireFormat>().unwrap(),
            WireFormat::Xml
        );
        assert!("turtle".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::from_extension("XML"), Some(WireFormat::Xml));
        assert_eq!(WireFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_strict_decode_rejects_invalid() {
        let codec = ResourceCodec::r4();
        let input = r#"{"resourceType":"Coverage","status":"bogus"}"#;

        let lenient = codec.decode(WireFormat::Json, input, ParseMode::Lenient).unwrap();
        let report = lenient.report.unwrap();
        assert!(!report.is_valid);

        let err = codec
            .decode(WireFormat::Json, input, ParseMode::Strict)
            .unwrap_err();
        match err {
            FhirModelError::ValidationFailed { issues } => {
                assert_eq!(issues.len(), report.error_count);
            }
            other => panic!("unexpected error: {other}"),
        }

        let unchecked = codec.decode(WireFormat::Json, input, ParseMode::Unchecked).unwrap();
        assert!(unchecked.report.is_none());
    }
}
