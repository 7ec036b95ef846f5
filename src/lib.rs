//! # OctoFHIR FHIR Models
//!
//! Schema-driven serialization and structural validation for FHIR R4 resources.
//!
//! ## Features
//!
//! - **Schema Registry**: Lock-free table of resource, datatype and nested-structure schemas
//!   with `[x]` choice-field resolution
//! - **Validation**: Cardinality, choice exclusivity, bindings and reference targets, with
//!   every violation collected in one pass
//! - **Wire Formats**: FHIR JSON and XML in schema order, with unknown elements preserved
//! - **Batch Validation**: Bounded-concurrency validation on the tokio runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use octofhir_fhirmodels::*;
//!
//! # fn example() -> Result<()> {
//! let codec = ResourceCodec::r4();
//! let decoded = codec.decode(
//!     WireFormat::Json,
//!     r#"{"resourceType":"Coverage","status":"active"}"#,
//!     ParseMode::Lenient,
//! )?;
//!
//! if let Some(report) = decoded.report {
//!     for issue in &report.issues {
//!         println!("{issue}");
//!     }
//! }
//!
//! let xml = codec.encode(WireFormat::Xml, &decoded.instance)?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod registry;
pub mod serialization;
pub mod types;
pub mod utils;
pub mod validation;

pub use crate::core::{
    AdvisoryBindingMode, CodecConfig, FhirModelsConfig, FhirVersion, PerformanceConfig,
    ReferenceTargetMode, ValidatorConfig,
};
pub use error::Result; // Our Result type takes precedence
pub use error::FhirModelError;
pub use registry::SchemaRegistry;
pub use serialization::{
    Decoded, JsonCodec, ParseMode, ResourceCodec, WireCodec, WireFormat, XmlCodec,
};
pub use types::*;
pub use utils::ResourceFingerprint;
pub use validation::{
    IssueKind, ParallelValidator, ReferenceResolver, StructuralValidator, TerminologyResolver,
    ValidationContext, ValidationEngine, ValidationIssue, ValidationResult, ValidationSeverity,
};
