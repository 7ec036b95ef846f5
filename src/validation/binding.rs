//! Value-set membership of coded values.

use crate::types::datatype;
use crate::types::{Binding, FieldValue, Instance};

/// Pluggable code-system lookup for value sets that are not enumerated locally.
pub trait TerminologyResolver: Send + Sync {
    fn is_code_valid(&self, system: Option<&str>, code: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BindingVerdict {
    Conformant,
    NotInValueSet(String),
    /// Nothing to judge with: no code present, or no local codes and no resolver.
    Undetermined,
}

/// `(system, code)` pairs carried by a value of `type_code`; `None` when the value has no
/// coded content at all.
fn coded_content<'a>(type_code: &str, value: &'a FieldValue) -> Option<Vec<(Option<&'a str>, &'a str)>> {
    match (type_code, value) {
        ("code" | "string" | "uri", FieldValue::String(code)) => Some(vec![(None, code.as_str())]),
        ("Coding", FieldValue::Complex(coding)) => {
            coding_pair(coding).map(|pair| vec![pair])
        }
        // the coded unit of a quantity
        (quantity, FieldValue::Complex(value)) if datatype::is_quantity(quantity) => {
            coding_pair(value).map(|pair| vec![pair])
        }
        ("CodeableConcept", FieldValue::Complex(concept)) => Some(
            concept
                .get("coding")
                .iter()
                .filter_map(FieldValue::as_instance)
                .filter_map(coding_pair)
                .collect(),
        ),
        _ => None,
    }
}

fn coding_pair(coding: &Instance) -> Option<(Option<&str>, &str)> {
    coding
        .get_str("code")
        .map(|code| (coding.get_str("system"), code))
}

fn describe(pairs: &[(Option<&str>, &str)]) -> String {
    pairs
        .iter()
        .map(|(system, code)| match system {
            Some(system) => format!("{system}#{code}"),
            None => format!("'{code}'"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Judge `value` against `binding`. Locally enumerated codes are authoritative for required
/// bindings; for advisory bindings the resolver may widen them.
pub(crate) fn evaluate(
    binding: &Binding,
    type_code: &str,
    value: &FieldValue,
    terminology: Option<&dyn TerminologyResolver>,
) -> BindingVerdict {
    let Some(pairs) = coded_content(type_code, value) else {
        return BindingVerdict::Undetermined;
    };

    if pairs.is_empty() {
        // a CodeableConcept carrying only text
        return if binding.is_enumerated() || terminology.is_some() {
            BindingVerdict::NotInValueSet("no coding".to_string())
        } else {
            BindingVerdict::Undetermined
        };
    }

    let advisory = binding.strength.is_advisory();
    let mut judged = false;
    for (system, code) in &pairs {
        let local = binding
            .is_enumerated()
            .then(|| binding.contains_coding(*system, code));
        let remote = match (local, advisory) {
            (Some(_), false) => None,
            _ => terminology.map(|t| t.is_code_valid(*system, code)),
        };
        if local == Some(true) || remote == Some(true) {
            return BindingVerdict::Conformant;
        }
        judged |= local.is_some() || remote.is_some();
    }

    if judged {
        BindingVerdict::NotInValueSet(describe(&pairs))
    } else {
        BindingVerdict::Undetermined
    }
}
