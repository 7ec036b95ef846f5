use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use octofhir_fhirmodels::*;
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

const COVERAGE: &str = r#"{
  "resourceType": "Coverage",
  "id": "cov-1",
  "identifier": [{"system": "http://example.org/policies", "value": "P-12345"}],
  "status": "active",
  "subscriberId": "AB9876",
  "beneficiary": {"reference": "Patient/1"},
  "relationship": {"coding": [{"system": "http://terminology.hl7.org/CodeSystem/subscriber-relationship", "code": "self"}]},
  "period": {"start": "2020-01-01", "end": "2020-12-31"},
  "payor": [{"reference": "Organization/2"}],
  "class": [
    {"type": {"text": "group"}, "value": "CB135"},
    {"type": {"text": "plan"}, "value": "B37FC"}
  ],
  "order": 1,
  "costToBeneficiary": [{"valueMoney": {"value": 20.5, "currency": "USD"}}],
  "subrogation": false
}"#;

fn bench_registry_lookup(c: &mut Criterion) {
    let registry = SchemaRegistry::r4();

    c.bench_function("registry_get_schema", |b| {
        b.iter(|| black_box(registry.get_schema(black_box("Coverage"))).unwrap())
    });

    c.bench_function("registry_resolve_choice", |b| {
        b.iter(|| {
            black_box(registry.resolve_choice_field(
                black_box("Coverage.costToBeneficiary"),
                black_box("valueMoney"),
            ))
            .unwrap()
        })
    });
}

fn bench_validation(c: &mut Criterion) {
    let codec = ResourceCodec::r4();
    let coverage = codec.json().decode(COVERAGE).unwrap();
    let validator = codec.validator();

    c.bench_function("validate_coverage", |b| {
        b.iter(|| black_box(validator.validate(black_box(&coverage))).unwrap())
    });
}

fn bench_wire_formats(c: &mut Criterion) {
    let codec = ResourceCodec::r4();
    let coverage = codec.json().decode(COVERAGE).unwrap();
    let xml = codec.xml().encode(&coverage).unwrap();

    let mut group = c.benchmark_group("wire_formats");
    group.throughput(Throughput::Bytes(COVERAGE.len() as u64));
    group.bench_function("json_decode", |b| {
        b.iter(|| black_box(codec.json().decode(black_box(COVERAGE))).unwrap())
    });
    group.bench_function("json_encode", |b| {
        b.iter(|| black_box(codec.json().encode(black_box(&coverage))).unwrap())
    });
    group.bench_function("xml_decode", |b| {
        b.iter(|| black_box(codec.xml().decode(black_box(&xml))).unwrap())
    });
    group.bench_function("xml_encode", |b| {
        b.iter(|| black_box(codec.xml().encode(black_box(&coverage))).unwrap())
    });
    group.finish();
}

fn bench_batch_validation(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let codec = ResourceCodec::r4();
    let coverage = codec.json().decode(COVERAGE).unwrap();
    let parallel = ParallelValidator::new(Arc::new(StructuralValidator::r4()), num_cpus::get());

    let mut group = c.benchmark_group("batch_validation");
    group.throughput(Throughput::Elements(256));
    group.bench_function("validate_batch_256", |b| {
        b.iter_batched(
            || vec![coverage.clone(); 256],
            |batch| rt.block_on(async { black_box(parallel.validate_batch(batch).await) }),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_registry_lookup,
    bench_validation,
    bench_wire_formats,
    bench_batch_validation
);

criterion_main!(benches);
