use serde::{Deserialize, Serialize};

pub const CHOICE_SUFFIX: &str = "[x]";

/// Outcome of mapping a concrete wire name such as `effectiveDateTime` onto its choice group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceResolution {
    /// Declared group name, e.g. `effective[x]`.
    pub group: String,
    /// Group name without the suffix, e.g. `effective`.
    pub base: String,
    /// Concrete type code, e.g. `dateTime`.
    pub type_code: String,
}

/// `effective` + `dateTime` -> `effectiveDateTime`.
pub fn choice_wire_name(base: &str, type_code: &str) -> String {
    format!("{base}{}", capitalize_first(type_code))
}

pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Type code suffix of `concrete` when it starts with `base` followed by an uppercase letter.
pub fn choice_suffix<'a>(base: &str, concrete: &'a str) -> Option<&'a str> {
    concrete
        .strip_prefix(base)
        .filter(|rest| rest.chars().next().is_some_and(char::is_uppercase))
}
