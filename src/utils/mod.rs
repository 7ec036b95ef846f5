pub mod fingerprint;

pub use fingerprint::{ResourceFingerprint, schema_tables_hash};
