use octofhir_fhirmodels::*;
use serde_json::{Value, json};
use std::sync::Arc;

#[allow(dead_code)]
pub fn registry() -> Arc<SchemaRegistry> {
    SchemaRegistry::r4()
}

#[allow(dead_code)]
pub fn validator() -> StructuralValidator {
    StructuralValidator::new(registry())
}

#[allow(dead_code)]
pub fn json_codec() -> JsonCodec {
    JsonCodec::new(registry())
}

#[allow(dead_code)]
pub fn xml_codec() -> XmlCodec {
    XmlCodec::new(json_codec())
}

/// The minimal valid Coverage: status, beneficiary and one payor.
#[allow(dead_code)]
pub fn coverage_json() -> Value {
    json!({
        "resourceType": "Coverage",
        "status": "active",
        "beneficiary": {"reference": "Patient/1"},
        "payor": [{"reference": "Organization/2"}]
    })
}

#[allow(dead_code)]
pub fn valid_coverage() -> Instance {
    Instance::new("Coverage")
        .with("status", "active")
        .with("beneficiary", Instance::reference("Patient/1"))
        .with("payor", Instance::reference("Organization/2"))
}

#[allow(dead_code)]
pub fn coverage_class(type_text: &str, value: &str) -> Instance {
    Instance::new("Coverage.class")
        .with("type", Instance::new("CodeableConcept").with("text", type_text))
        .with("value", value)
}

#[allow(dead_code)]
pub fn full_coverage() -> Instance {
    let mut coverage = valid_coverage()
        .with("id", "cov-1")
        .with(
            "identifier",
            Instance::new("Identifier")
                .with("system", "http://example.org/policies")
                .with("value", "P-12345"),
        )
        .with("subscriberId", "AB9876")
        .with(
            "period",
            Instance::new("Period")
                .with("start", "2020-01-01")
                .with("end", "2020-12-31"),
        )
        .with("local_class", coverage_class("group", "CB135"))
        .with("local_class", coverage_class("plan", "B37FC"))
        .with("order", 1)
        .with("subrogation", false);

    coverage.push(
        "costToBeneficiary",
        Instance::new("Coverage.costToBeneficiary").with_choice(
            "value",
            "Money",
            Instance::new("Money")
                .with("value", FieldValue::decimal(20.5).unwrap())
                .with("currency", "USD"),
        ),
    );
    coverage
}

#[allow(dead_code)]
pub fn adverse_event() -> Instance {
    Instance::new("AdverseEvent")
        .with("actuality", "actual")
        .with("subject", Instance::reference("Patient/1"))
        .with("date", "2020-03-01T10:00:00Z")
        .with(
            "suspectEntity",
            Instance::new("AdverseEvent.suspectEntity")
                .with("instance", Instance::reference("Medication/m1"))
                .with(
                    "causality",
                    Instance::new("AdverseEvent.suspectEntity.causality")
                        .with("productRelatedness", "probable")
                        .with(
                            "local_method",
                            Instance::codeable_concept(
                                "http://terminology.hl7.org/CodeSystem/causality-method",
                                "Bayesian",
                            ),
                        ),
                ),
        )
}

#[allow(dead_code)]
pub fn clinical_impression() -> Instance {
    Instance::new("ClinicalImpression")
        .with("status", "completed")
        .with("subject", Instance::reference("Patient/1"))
        .with_choice("effective", "dateTime", "2020-05-01")
        .with(
            "finding",
            Instance::new("ClinicalImpression.finding")
                .with("itemCodeableConcept", Instance::new("CodeableConcept").with("text", "stable"))
                .with("basis", "exam"),
        )
}

#[allow(dead_code)]
pub fn message_header() -> Instance {
    Instance::new("MessageHeader")
        .with_choice(
            "event",
            "Coding",
            Instance::coding("http://example.org/events", "admit"),
        )
        .with(
            "source",
            Instance::new("MessageHeader.source")
                .with("name", "HIS")
                .with("endpoint", "https://his.example.org/fhir"),
        )
        .with(
            "response",
            Instance::new("MessageHeader.response")
                .with("identifier", "msg-1")
                .with("code", "ok"),
        )
}
