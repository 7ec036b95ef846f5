use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingStrength {
    #[serde(rename = "required")]
    Required,
    #[serde(rename = "extensible")]
    Extensible,
    #[serde(rename = "preferred")]
    Preferred,
    #[serde(rename = "example")]
    Example,
}

impl BindingStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingStrength::Required => "required",
            BindingStrength::Extensible => "extensible",
            BindingStrength::Preferred => "preferred",
            BindingStrength::Example => "example",
        }
    }

    /// Extensible and preferred bindings may be reported as warnings; example bindings never are.
    pub fn is_advisory(&self) -> bool {
        matches!(self, BindingStrength::Extensible | BindingStrength::Preferred)
    }
}

/// Value-set binding of a coded field.
///
/// `codes` maps each code system URI to the codes it contributes to the value set.
/// An empty map means the value set is not enumerated locally, in which case only a
/// terminology collaborator can judge membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub strength: BindingStrength,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub codes: IndexMap<String, IndexSet<String>>,
}

impl Binding {
    pub fn new(strength: BindingStrength) -> Self {
        Self {
            strength,
            value_set: None,
            codes: IndexMap::new(),
        }
    }

    pub fn required() -> Self {
        Self::new(BindingStrength::Required)
    }

    pub fn with_value_set(mut self, value_set: impl Into<String>) -> Self {
        self.value_set = Some(value_set.into());
        self
    }

    pub fn with_codes<I, S>(mut self, system: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes
            .entry(system.into())
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn is_enumerated(&self) -> bool {
        self.codes.values().any(|codes| !codes.is_empty())
    }

    /// Membership for a bare `code` value, which carries no system.
    pub fn contains_code(&self, code: &str) -> bool {
        self.codes.values().any(|codes| codes.contains(code))
    }

    /// Membership for a `Coding`. Without a system the code is matched against every system.
    pub fn contains_coding(&self, system: Option<&str>, code: &str) -> bool {
        match system {
            Some(system) => self
                .codes
                .get(system)
                .is_some_and(|codes| codes.contains(code)),
            None => self.contains_code(code),
        }
    }
}
