pub mod config;

pub use config::{
    AdvisoryBindingMode, CodecConfig, FhirModelsConfig, FhirVersion, PerformanceConfig,
    ReferenceTargetMode, ValidatorConfig,
};
