//! Store key derivation.
//!
//! Every key the adapter writes is derived here, so the on-wire layout lives in
//! one place. The layout is stable and shared with existing data:
//!
//! - all-keys set:    `{model}:{key fields joined by ":"}:all`
//! - record hash:     `{model}:{key values joined by ":"}`
//! - field index set: `{model}:{field}:{base64(stringified value)}`
//! - serial counter:  `{model}:{key fields joined by ":"}:serial`

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::model::{Model, Value};

/// Set of every live record identity for a model.
pub fn all_keys_set(model: &Model) -> String {
    format!("{}:{}:all", model.name, model.key_fields.join(":"))
}

/// Counter backing serial primary-key assignment for a model.
pub fn serial_counter(model: &Model) -> String {
    format!("{}:{}:serial", model.name, model.key_fields.join(":"))
}

/// Hash holding one record's fields.
pub fn record_hash(model_name: &str, identity: &str) -> String {
    format!("{}:{}", model_name, identity)
}

/// Index set of identities whose `field` currently holds `value`.
pub fn field_index(model_name: &str, field: &str, value: &Value) -> String {
    format!("{}:{}:{}", model_name, field, encode_value(value))
}

/// Stringify and base64-encode a field value for use as a key fragment.
///
/// Encoders that wrap output at a fixed column insert newlines; those must
/// never reach a key, so any line breaks are stripped.
pub fn encode_value(value: &Value) -> String {
    STANDARD.encode(value.to_stored()).replace('\n', "")
}
