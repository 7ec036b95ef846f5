//! Lexical checks for FHIR primitive datatypes.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::types::FieldValue;

const YEAR: &str = r"([0-9]([0-9]([0-9][1-9]|[1-9]0)|[1-9]00)|[1-9]000)";
const TIME: &str = r"([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?";
const ZONE: &str = r"(Z|(\+|-)((0[0-9]|1[0-3]):[0-5][0-9]|14:00))";
const MONTH: &str = r"(0[1-9]|1[0-2])";
const DAY: &str = r"(0[1-9]|[1-2][0-9]|3[0-1])";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid primitive pattern {pattern}: {e}"))
}

static ID: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z0-9\-\.]{1,64}$"));
static CODE: Lazy<Regex> = Lazy::new(|| compile(r"^[^\s]+(\s[^\s]+)*$"));
static OID: Lazy<Regex> = Lazy::new(|| compile(r"^urn:oid:[0-2](\.(0|[1-9][0-9]*))+$"));
static UUID: Lazy<Regex> = Lazy::new(|| {
    compile(r"^urn:uuid:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
});
static BASE64: Lazy<Regex> = Lazy::new(|| compile(r"^(\s*([0-9a-zA-Z+/=]){4}\s*)+$"));
static DATE: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"^{YEAR}(-{MONTH}(-{DAY})?)?$")));
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(r"^{YEAR}(-{MONTH}(-{DAY}(T{TIME}{ZONE})?)?)?$"))
});
static INSTANT: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"^{YEAR}-{MONTH}-{DAY}T{TIME}{ZONE}$")));
static TIME_OF_DAY: Lazy<Regex> = Lazy::new(|| compile(&format!("^{TIME}$")));

/// Checks primitive values against the FHIR lexical grammars.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimitiveValidator;

impl PrimitiveValidator {
    pub fn new() -> Self {
        Self
    }

    /// A description of the problem, or `None` when `value` is a valid `type_code`.
    /// Values of the wrong shape are left to the caller's type check.
    pub fn check(&self, type_code: &str, value: &FieldValue) -> Option<String> {
        match value {
            FieldValue::Integer(i) => self.check_integer(type_code, *i),
            FieldValue::String(s) => self.check_text(type_code, s),
            _ => None,
        }
    }

    fn check_integer(&self, type_code: &str, value: i64) -> Option<String> {
        let valid = match type_code {
            "integer" => i32::try_from(value).is_ok(),
            "positiveInt" => value > 0 && value <= i64::from(i32::MAX),
            "unsignedInt" => value >= 0 && value <= i64::from(i32::MAX),
            _ => true,
        };
        (!valid).then(|| format!("{value} is out of range for {type_code}"))
    }

    fn check_text(&self, type_code: &str, value: &str) -> Option<String> {
        let valid = match type_code {
            "string" | "markdown" => !value.trim().is_empty(),
            "code" => CODE.is_match(value),
            "id" => ID.is_match(value),
            "oid" => OID.is_match(value),
            "uuid" => UUID.is_match(value),
            "base64Binary" => BASE64.is_match(value),
            "uri" | "canonical" => !value.is_empty() && !value.chars().any(char::is_whitespace),
            "url" => Url::parse(value).is_ok(),
            "date" => DATE.is_match(value) && calendar_date_is_real(value),
            "dateTime" => DATE_TIME.is_match(value) && calendar_date_is_real(value),
            "instant" => INSTANT.is_match(value) && DateTime::parse_from_rfc3339(value).is_ok(),
            "time" => TIME_OF_DAY.is_match(value),
            "xhtml" => value.trim_start().starts_with("<div"),
            _ => true,
        };
        (!valid).then(|| format!("'{value}' is not a valid {type_code}"))
    }
}

/// Rejects impossible calendar days such as `2021-02-30`; partial dates pass.
fn calendar_date_is_real(value: &str) -> bool {
    match value.get(..10) {
        Some(day) if day.len() == 10 => NaiveDate::parse_from_str(day, "%Y-%m-%d").is_ok(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(type_code: &str, value: &str) -> Option<String> {
        PrimitiveValidator::new().check(type_code, &FieldValue::from(value))
    }

    #[test]
    fn test_dates() {
        assert!(text("date", "2020").is_none());
        assert!(text("date", "2020-02").is_none());
        assert!(text("date", "2020-02-29").is_none());
        assert!(text("date", "2021-02-29").is_some());
        assert!(text("date", "2020-13").is_some());
        assert!(text("dateTime", "2020-02-01T10:00:00Z").is_none());
        assert!(text("dateTime", "2020-02-01T10:00:00.123+01:00").is_none());
        assert!(text("dateTime", "2020-02-01T10:00").is_some());
        assert!(text("instant", "2020-02-01T10:00:00Z").is_none());
        assert!(text("instant", "2020-02-01").is_some());
        assert!(text("time", "23:59:59").is_none());
        assert!(text("time", "24:00:00").is_some());
    }

    #[test]
    fn test_identifiers_and_codes() {
        assert!(text("id", "abc-123.x").is_none());
        assert!(text("id", "has space").is_some());
        assert!(text("code", "entered-in-error").is_none());
        assert!(text("code", " leading").is_some());
        assert!(text("oid", "urn:oid:1.2.3").is_none());
        assert!(text("oid", "1.2.3").is_some());
        assert!(text("uuid", "urn:uuid:c757873d-ec9a-4326-a141-556f43239520").is_none());
        assert!(text("base64Binary", "aGVsbG8=").is_none());
        assert!(text("base64Binary", "not base64!").is_some());
        assert!(text("url", "https://example.org/fhir").is_none());
        assert!(text("url", "not a url").is_some());
        assert!(text("uri", "Patient/1").is_none());
        assert!(text("string", "   ").is_some());
    }

    #[test]
    fn test_integers() {
        let validator = PrimitiveValidator::new();
        assert!(validator.check("positiveInt", &FieldValue::Integer(0)).is_some());
        assert!(validator.check("unsignedInt", &FieldValue::Integer(0)).is_none());
        assert!(validator.check("integer", &FieldValue::Integer(i64::MAX)).is_some());
        assert!(validator.check("date", &FieldValue::Boolean(true)).is_none());
    }
}
