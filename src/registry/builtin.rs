use tracing::info;

use super::SchemaRegistry;
use crate::error::{FhirModelError, Result};
use crate::types::ResourceSchema;

/// Embedded R4 tables in registration order: base types, then datatypes, then resources.
pub const R4_TABLES: &[(&str, &str)] = &[
    ("base.json", include_str!("../../schemas/r4/base.json")),
    ("datatypes.json", include_str!("../../schemas/r4/datatypes.json")),
    ("adverse-event.json", include_str!("../../schemas/r4/adverse-event.json")),
    ("basic.json", include_str!("../../schemas/r4/basic.json")),
    (
        "clinical-impression.json",
        include_str!("../../schemas/r4/clinical-impression.json"),
    ),
    ("coverage.json", include_str!("../../schemas/r4/coverage.json")),
    ("detected-issue.json", include_str!("../../schemas/r4/detected-issue.json")),
    ("flag.json", include_str!("../../schemas/r4/flag.json")),
    (
        "medicinal-product-ingredient.json",
        include_str!("../../schemas/r4/medicinal-product-ingredient.json"),
    ),
    ("message-header.json", include_str!("../../schemas/r4/message-header.json")),
];

pub(super) fn load_r4(registry: &SchemaRegistry) -> Result<usize> {
    let mut total = 0;
    for (file, contents) in R4_TABLES {
        let schemas: Vec<ResourceSchema> = serde_json::from_str(contents).map_err(|e| {
            FhirModelError::invalid_schema(format!("schemas/r4/{file}: {e}"))
        })?;
        total += registry.register_all(schemas)?;
    }
    info!(schemas = total, "Loaded built-in FHIR R4 schema tables");
    Ok(total)
}
