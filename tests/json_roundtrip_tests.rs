mod common;

use common::*;
use octofhir_fhirmodels::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn keys(value: &Value) -> Vec<&str> {
    value
        .as_object()
        .map(|object| object.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

#[test]
fn test_round_trip_every_fixture() {
    let codec = json_codec();
    for instance in [
        valid_coverage(),
        full_coverage(),
        adverse_event(),
        clinical_impression(),
        message_header(),
    ] {
        let text = codec.encode(&instance).unwrap();
        let decoded = codec.decode(&text).unwrap();
        assert_eq!(decoded, instance);
        assert!(validator().validate(&decoded).unwrap().is_valid);
    }
}

#[test]
fn test_scenario_round_trips_byte_for_byte() {
    let codec = json_codec();
    let coverage = codec.decode_value(&coverage_json()).unwrap();
    assert_eq!(codec.encode_value(&coverage).unwrap(), coverage_json());
    assert_eq!(
        codec.encode(&coverage).unwrap(),
        r#"{"resourceType":"Coverage","status":"active","beneficiary":{"reference":"Patient/1"},"payor":[{"reference":"Organization/2"}]}"#
    );
}

#[test]
fn test_output_follows_schema_order() {
    let encoded = json_codec().encode_value(&full_coverage()).unwrap();
    assert_eq!(
        keys(&encoded),
        vec![
            "resourceType",
            "id",
            "identifier",
            "status",
            "subscriberId",
            "beneficiary",
            "period",
            "payor",
            "class",
            "order",
            "costToBeneficiary",
            "subrogation",
        ]
    );
    assert_eq!(keys(&encoded["period"]), vec!["start", "end"]);
    assert_eq!(keys(&encoded["class"][0]), vec!["type", "value"]);

    // repeating fields are arrays even with one value
    assert!(encoded["identifier"].is_array());
    assert!(encoded["payor"].is_array());
    assert!(encoded["subscriberId"].is_string());
}

#[test]
fn test_input_order_does_not_matter() {
    let codec = json_codec();
    let shuffled = json!({
        "payor": [{"reference": "Organization/2"}],
        "beneficiary": {"reference": "Patient/1"},
        "status": "active",
        "resourceType": "Coverage"
    });
    let coverage = codec.decode_value(&shuffled).unwrap();
    assert_eq!(coverage, valid_coverage());
    assert_eq!(
        keys(&codec.encode_value(&coverage).unwrap()),
        vec!["resourceType", "status", "beneficiary", "payor"]
    );
}

#[test]
fn test_coverage_class_uses_reserved_storage_name() {
    let codec = json_codec();
    let mut wire = coverage_json();
    wire["class"] = json!([
        {"type": {"text": "group"}, "value": "CB135"},
        {"type": {"text": "plan"}, "value": "B37FC", "name": "Full Coverage: Plan"}
    ]);

    let coverage = codec.decode_value(&wire).unwrap();
    assert!(coverage.get("class").is_empty());
    let classes = coverage.get("local_class");
    assert_eq!(classes.len(), 2);
    assert_eq!(
        classes[1].as_instance().and_then(|c| c.get_str("name")),
        Some("Full Coverage: Plan")
    );
    assert!(coverage.unrecognized().is_empty());

    let encoded = codec.encode_value(&coverage).unwrap();
    assert_eq!(encoded["class"], wire["class"]);
    assert!(encoded.get("local_class").is_none());
}

#[test]
fn test_causality_method_uses_reserved_storage_name() {
    let codec = json_codec();
    let encoded = codec.encode_value(&adverse_event()).unwrap();
    let causality = &encoded["suspectEntity"][0]["causality"][0];
    assert_eq!(keys(causality), vec!["productRelatedness", "method"]);
    assert_eq!(causality["method"]["coding"][0]["code"], json!("Bayesian"));

    let decoded = codec.decode_value(&encoded).unwrap();
    let suspect = decoded.first("suspectEntity").and_then(FieldValue::as_instance).unwrap();
    let causality = suspect.first("causality").and_then(FieldValue::as_instance).unwrap();
    assert_eq!(causality.get("local_method").len(), 1);
    assert!(causality.get("method").is_empty());
}

#[test]
fn test_choice_fields_resolve_both_ways() {
    let codec = json_codec();
    let impression = codec
        .decode_value(&json!({
            "resourceType": "ClinicalImpression",
            "status": "completed",
            "subject": {"reference": "Patient/1"},
            "effectivePeriod": {"start": "2020-05-01", "end": "2020-05-02"}
        }))
        .unwrap();

    let (type_code, values) = impression.choice("effective").unwrap();
    assert_eq!(type_code, "Period");
    assert_eq!(
        values[0].as_instance().and_then(|p| p.get_str("end")),
        Some("2020-05-02")
    );

    let encoded = codec.encode_value(&clinical_impression()).unwrap();
    assert_eq!(encoded["effectiveDateTime"], json!("2020-05-01"));
    assert!(encoded.get("effective").is_none());

    let header = codec.encode_value(&message_header()).unwrap();
    assert_eq!(keys(&header)[1], "eventCoding");
    assert_eq!(header["eventCoding"]["code"], json!("admit"));

    let money = codec.encode_value(&full_coverage()).unwrap();
    assert_eq!(
        money["costToBeneficiary"][0]["valueMoney"],
        json!({"value": 20.5, "currency": "USD"})
    );
}

#[test]
fn test_unknown_keys_survive_round_trip() {
    let codec = json_codec();
    let mut wire = coverage_json();
    wire["futureElement"] = json!({"nested": [1, 2, {"deep": true}]});
    wire["beneficiary"]["x-routing"] = json!("blue");
    wire["effectiveBoolean"] = json!(false);

    let coverage = codec.decode_value(&wire).unwrap();
    assert_eq!(coverage.unrecognized().len(), 2);
    assert!(validator().validate(&coverage).unwrap().is_valid);

    let encoded = codec.encode_value(&coverage).unwrap();
    assert_eq!(encoded, wire);
    assert_eq!(
        keys(&encoded),
        vec![
            "resourceType",
            "status",
            "beneficiary",
            "payor",
            "futureElement",
            "effectiveBoolean",
        ]
    );
}

#[test]
fn test_unknown_choice_type() {
    let wire = json!({
        "resourceType": "ClinicalImpression",
        "status": "completed",
        "subject": {"reference": "Patient/1"},
        "effectiveBoolean": true
    });

    let kept = json_codec().decode_value(&wire).unwrap();
    assert!(kept.choice("effective").is_none());
    assert_eq!(kept.unrecognized()["effectiveBoolean"], json!(true));

    let strict = json_codec().with_config(CodecConfig {
        reject_unknown_choice_types: true,
        ..CodecConfig::default()
    });
    match strict.decode_value(&wire) {
        Err(FhirModelError::UnresolvableChoiceField { group, field_name }) => {
            assert_eq!(group, "ClinicalImpression.effective[x]");
            assert_eq!(field_name, "effectiveBoolean");
        }
        other => panic!("unexpected decode result: {other:?}"),
    }
}

#[test]
fn test_primitive_metadata_round_trips() {
    let codec = json_codec();
    let wire = json!({
        "resourceType": "ClinicalImpression",
        "status": "completed",
        "_status": {"id": "st"},
        "subject": {"reference": "Patient/1"},
        "_effectiveDateTime": {"extension": [{
            "url": "http://hl7.org/fhir/StructureDefinition/data-absent-reason",
            "valueCode": "masked"
        }]},
        "protocol": ["http://example.org/p1", null],
        "_protocol": [null, {"id": "p2"}]
    });

    let impression = codec.decode_value(&wire).unwrap();
    assert_eq!(impression.get("protocol").len(), 1);
    assert!(impression.primitive_meta("effectiveDateTime").is_some());
    assert!(impression.choice("effective").is_none());
    assert!(validator().validate(&impression).unwrap().is_valid);

    let encoded = codec.encode_value(&impression).unwrap();
    assert_eq!(encoded, wire);
    assert_eq!(
        keys(&encoded),
        vec![
            "resourceType",
            "status",
            "_status",
            "subject",
            "_effectiveDateTime",
            "protocol",
            "_protocol",
        ]
    );
}

#[test]
fn test_interior_nulls_keep_metadata_aligned() {
    let codec = json_codec();
    let wire = json!({
        "resourceType": "ClinicalImpression",
        "status": "completed",
        "subject": {"reference": "Patient/1"},
        "protocol": [null, "http://example.org/b", null, "http://example.org/d"],
        "_protocol": [{"id": "p0"}, null, {"id": "p2"}, null]
    });

    let impression = codec.decode_value(&wire).unwrap();
    assert_eq!(impression.get("protocol").len(), 2);
    assert_eq!(impression.value_gaps(&SlotKey::field("protocol")), &[0, 2]);
    assert_eq!(codec.encode_value(&impression).unwrap(), wire);

    let xml = xml_codec().encode(&impression).unwrap();
    assert!(xml.contains(
        r#"<protocol id="p0"/><protocol value="http://example.org/b"/><protocol id="p2"/>"#
    ));
    let back = xml_codec().decode(&xml).unwrap();
    assert_eq!(back, impression);
    assert_eq!(codec.encode_value(&back).unwrap(), wire);
}

#[test]
fn test_decimal_text_is_kept_exactly() {
    let input = r#"{"resourceType":"Coverage","status":"active",
        "beneficiary":{"reference":"Patient/1"},"payor":[{"reference":"Organization/2"}],
        "costToBeneficiary":[{"valueMoney":{"value":1.50,"currency":"USD"}}]}"#;
    let coverage = json_codec().decode(input).unwrap();

    let json = json_codec().encode(&coverage).unwrap();
    assert!(json.contains(r#"{"value":1.50,"currency":"USD"}"#));

    let xml = xml_codec().encode(&coverage).unwrap();
    assert!(xml.contains(r#"<value value="1.50"/>"#));
    let back = xml_codec().decode(&xml).unwrap();
    assert_eq!(back, coverage);
    assert_eq!(json_codec().encode(&back).unwrap(), json);
}

#[test]
fn test_singleton_given_as_array_is_accepted() {
    let mut wire = coverage_json();
    wire["subrogation"] = json!([true, false]);

    let coverage = json_codec().decode_value(&wire).unwrap();
    assert_eq!(coverage.get("subrogation").len(), 2);

    let result = validator().validate(&coverage).unwrap();
    let issues: Vec<_> = result.issues_of(IssueKind::Cardinality).collect();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].path.as_deref(), Some("Coverage.subrogation"));
}

#[test]
fn test_malformed_input_reports_path() {
    let codec = json_codec();
    let cases = [
        (json!({"resourceType": "Coverage", "status": 5}), "Coverage.status"),
        (
            json!({"resourceType": "Coverage", "payor": ["Organization/2"]}),
            "Coverage.payor[0]",
        ),
        (
            json!({"resourceType": "Coverage", "class": [{"value": "a"}, {"value": 7}]}),
            "Coverage.class[1].value",
        ),
        (json!({"resourceType": "Coverage", "order": 1.5}), "Coverage.order"),
        (
            json!({"resourceType": "Coverage", "contained": [{"id": "x"}]}),
            "Coverage.contained[0]",
        ),
        (json!({"status": "active"}), "$"),
        (json!(["Coverage"]), "$"),
    ];

    for (wire, path) in cases {
        let err = codec.decode_value(&wire).unwrap_err();
        assert!(
            matches!(err, FhirModelError::MalformedWireFormat { .. }),
            "{wire}: {err}"
        );
        assert_eq!(err.path(), Some(path), "{wire}");
    }

    let err = codec.decode(r#"{"resourceType": "Coverage", "status": }"#).unwrap_err();
    assert!(err.path().is_some_and(|p| p.starts_with("line 1, column")));
}

#[test]
fn test_unknown_root_type() {
    let codec = json_codec();
    for wire in [
        json!({"resourceType": "Patient", "active": true}),
        json!({"resourceType": "Coverage.class", "value": "x"}),
        json!({"resourceType": "Money", "value": 1}),
    ] {
        assert!(matches!(
            codec.decode_value(&wire),
            Err(FhirModelError::UnknownResourceType { .. })
        ));
    }
    assert!(matches!(
        codec.encode_value(&Instance::new("Patient")),
        Err(FhirModelError::UnknownResourceType { .. })
    ));
}

#[test]
fn test_contained_resources() {
    let codec = json_codec();
    let mut wire = coverage_json();
    wire["contained"] = json!([
        {"resourceType": "Patient", "id": "p1", "name": [{"family": "Chalmers"}]},
        {
            "resourceType": "Flag",
            "id": "f1",
            "status": "active",
            "code": {"text": "VIP"},
            "subject": {"reference": "#p1"}
        }
    ]);
    wire["beneficiary"] = json!({"reference": "#p1"});

    let coverage = codec.decode_value(&wire).unwrap();
    let contained = coverage.get("contained");
    assert_eq!(contained.len(), 2);
    let patient = contained[0].as_instance().unwrap();
    assert_eq!(patient.type_name(), "Patient");
    assert_eq!(patient.unrecognized()["name"][0]["family"], json!("Chalmers"));
    let flag = contained[1].as_instance().unwrap();
    assert_eq!(flag.get_str("status"), Some("active"));

    assert!(validator().validate(&coverage).unwrap().is_valid);

    let encoded = codec.encode_value(&coverage).unwrap();
    assert_eq!(encoded, wire);
    assert_eq!(keys(&encoded["contained"][0])[0], "resourceType");
}

#[test]
fn test_narrative_round_trip() {
    let codec = json_codec();
    let mut wire = coverage_json();
    wire["text"] = json!({
        "status": "generated",
        "div": "<div xmlns=\"http://www.w3.org/1999/xhtml\"><p>Coverage for <b>Patient 1</b></p></div>"
    });

    let coverage = codec.decode_value(&wire).unwrap();
    assert!(validator().validate(&coverage).unwrap().is_valid);
    assert_eq!(codec.encode_value(&coverage).unwrap(), wire);
}

#[test]
fn test_deeply_nested_content_reference() {
    let codec = json_codec();
    let wire = json!({
        "resourceType": "MedicinalProductIngredient",
        "role": {"text": "active"},
        "substance": {
            "code": {"text": "amoxicillin"},
            "strength": [{
                "presentation": {
                    "numerator": {"value": 250, "unit": "mg"},
                    "denominator": {"value": 5, "unit": "mL"}
                },
                "referenceStrength": [{
                    "strength": {"numerator": {"value": 1}, "denominator": {"value": 1}}
                }]
            }]
        }
    });

    let ingredient = codec.decode_value(&wire).unwrap();
    let result = validator().validate(&ingredient).unwrap();
    assert!(result.is_valid, "{:#?}", result.issues);
    assert_eq!(codec.encode_value(&ingredient).unwrap(), wire);
}

#[test]
fn test_pretty_output() {
    let pretty = json_codec().with_config(CodecConfig::pretty());
    let text = pretty.encode(&valid_coverage()).unwrap();
    assert!(text.starts_with("{\n  \"resourceType\": \"Coverage\""));
    assert_eq!(pretty.decode(&text).unwrap(), valid_coverage());
}

#[test]
fn test_codec_facade_modes() {
    let codec = ResourceCodec::r4();
    let input = r#"{"resourceType":"Coverage","status":"bogus","beneficiary":{"reference":"Patient/1"}}"#;

    let unchecked = codec.decode(WireFormat::Json, input, ParseMode::Unchecked).unwrap();
    assert!(unchecked.report.is_none());

    let lenient = codec.decode(WireFormat::Json, input, ParseMode::Lenient).unwrap();
    let report = lenient.report.unwrap();
    assert_eq!(report.error_count, 2);
    assert_eq!(lenient.instance, unchecked.instance);

    match codec.decode(WireFormat::Json, input, ParseMode::Strict) {
        Err(FhirModelError::ValidationFailed { issues }) => {
            let kinds: Vec<IssueKind> = issues.iter().map(|i| i.kind).collect();
            assert_eq!(kinds, vec![IssueKind::InvalidCode, IssueKind::Cardinality]);
        }
        other => panic!("unexpected decode result: {other:?}"),
    }

    let valid = serde_json::to_string(&coverage_json()).unwrap();
    let strict = codec.decode(WireFormat::Json, &valid, ParseMode::Strict).unwrap();
    assert!(strict.report.unwrap().is_valid);
}

#[test]
fn test_fingerprint_ignores_wire_order() {
    let codec = json_codec();
    let a = codec.decode_value(&coverage_json()).unwrap();
    let b = codec
        .decode_value(&json!({
            "resourceType": "Coverage",
            "payor": [{"reference": "Organization/2"}],
            "beneficiary": {"reference": "Patient/1"},
            "status": "active"
        }))
        .unwrap();

    let fa = ResourceFingerprint::of(&codec, &a).unwrap();
    let fb = ResourceFingerprint::of(&codec, &b).unwrap();
    assert!(fa.matches(&fb));

    let mut c = b.clone();
    c.set("status", "draft");
    let fc = ResourceFingerprint::of(&codec, &c).unwrap();
    assert!(!fa.matches(&fc));
}
