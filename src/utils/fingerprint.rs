use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::registry::R4_TABLES;
use crate::serialization::JsonCodec;
use crate::types::Instance;

/// Content fingerprint of a resource for change detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceFingerprint {
    pub resource_type: String,
    pub id: Option<String>,
    /// SHA-256 of the canonical JSON form
    pub content_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ResourceFingerprint {
    /// Fingerprint an instance through its JSON encoding.
    ///
    /// Keys are sorted before hashing, so equal content gives equal hashes regardless of the
    /// order fields were set or received in.
    pub fn of(codec: &JsonCodec, instance: &Instance) -> Result<Self> {
        let encoded = codec.encode_value(instance)?;
        let canonical = serde_json::to_vec(&canonicalize(&encoded))?;

        Ok(Self {
            resource_type: instance.type_name().to_string(),
            id: instance.id().map(str::to_string),
            content_hash: sha256_hex(&canonical),
            created_at: chrono::Utc::now(),
        })
    }

    /// Same type and same content; creation time is ignored.
    pub fn matches(&self, other: &ResourceFingerprint) -> bool {
        self.resource_type == other.resource_type && self.content_hash == other.content_hash
    }

    /// Get a short representation of the fingerprint for logging
    pub fn short_hash(&self) -> &str {
        &self.content_hash[..8]
    }
}

/// Hash of the embedded R4 schema tables, identifying the built-in schema set.
pub fn schema_tables_hash() -> String {
    let mut hasher = Sha256::new();
    for (name, contents) in R4_TABLES {
        hasher.update(name.as_bytes());
        hasher.update(contents.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&object[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
