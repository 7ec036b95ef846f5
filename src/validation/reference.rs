//! Literal reference parsing and the pluggable dereferencing collaborator.

use url::Url;

use crate::types::{FieldValue, Instance};

/// Follows `Reference` values for consumers that need the target resource.
pub trait ReferenceResolver: Send + Sync {
    fn dereference(&self, reference: &Instance) -> Option<Instance>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralReference {
    /// `#id` into the container's `contained` list; an empty id is the container itself.
    Contained(String),
    /// `Type/id`, optionally with `_history/vid`, relative or absolute.
    Typed {
        resource_type: String,
        id: String,
        base: Option<String>,
    },
    /// `urn:uuid:` and `urn:oid:` identifiers.
    Urn(String),
    Opaque(String),
}

impl LiteralReference {
    pub fn parse(reference: &str) -> Self {
        if let Some(id) = reference.strip_prefix('#') {
            return LiteralReference::Contained(id.to_string());
        }
        if reference.starts_with("urn:") {
            return LiteralReference::Urn(reference.to_string());
        }
        if reference.contains("://") {
            return match Url::parse(reference) {
                Ok(url) => {
                    let segments: Vec<&str> = url
                        .path_segments()
                        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                        .unwrap_or_default();
                    match typed_tail(&segments) {
                        Some((resource_type, id, consumed)) => {
                            let base_segments = &segments[..segments.len() - consumed];
                            let base = format!(
                                "{}://{}/{}",
                                url.scheme(),
                                url.host_str().unwrap_or_default(),
                                base_segments.join("/")
                            );
                            LiteralReference::Typed {
                                resource_type,
                                id,
                                base: Some(base.trim_end_matches('/').to_string()),
                            }
                        }
                        None => LiteralReference::Opaque(reference.to_string()),
                    }
                }
                Err(_) => LiteralReference::Opaque(reference.to_string()),
            };
        }

        let segments: Vec<&str> = reference.split('/').filter(|s| !s.is_empty()).collect();
        match typed_tail(&segments) {
            Some((resource_type, id, _)) => LiteralReference::Typed {
                resource_type,
                id,
                base: None,
            },
            None => LiteralReference::Opaque(reference.to_string()),
        }
    }

    pub fn resource_type(&self) -> Option<&str> {
        match self {
            LiteralReference::Typed { resource_type, .. } => Some(resource_type),
            _ => None,
        }
    }
}

/// `[.., Type, id]` or `[.., Type, id, "_history", vid]` -> `(Type, id, segments used)`.
fn typed_tail(segments: &[&str]) -> Option<(String, String, usize)> {
    let (tail, consumed) = match segments {
        [.., ty, id, "_history", _] => ([*ty, *id], 4),
        [.., ty, id] => ([*ty, *id], 2),
        _ => return None,
    };
    let [resource_type, id] = tail;
    let looks_like_type = resource_type
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
        && resource_type.chars().all(|c| c.is_ascii_alphabetic());
    looks_like_type.then(|| (resource_type.to_string(), id.to_string(), consumed))
}

/// Resource in `container.contained` carrying the given id.
pub fn find_contained<'a>(container: &'a Instance, id: &str) -> Option<&'a Instance> {
    container
        .get("contained")
        .iter()
        .filter_map(FieldValue::as_instance)
        .find(|resource| resource.id() == Some(id))
}
