//! Canonical hashing of structured records.
//!
//! Every hash in this crate (record linkage, challenge hashes, SEED hashes)
//! is SHA-256 over the *canonical* JSON form of the value: UTF-8, map keys
//! sorted lexicographically at every nesting level, no insignificant
//! whitespace. Two values with identical logical content hash identically
//! regardless of field insertion order, and any other implementation of this
//! serialization produces byte-identical input.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a value to its canonical JSON string.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&mut out, &value);
    Ok(out)
}

/// SHA-256 of the canonical JSON form, as lowercase hex.
pub fn hash_value<T: Serialize>(value: &T) -> Result<String> {
    Ok(hash_canonical(&serde_json::to_value(value)?))
}

/// SHA-256 of an already-converted JSON value, as lowercase hex.
pub fn hash_canonical(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    hex::encode(Sha256::digest(out.as_bytes()))
}

/// Hash a value with one top-level field removed.
///
/// Used to compute signing hashes: the signed message for a record is the
/// hash of the record *without* its own signature field.
pub fn hash_without_field<T: Serialize>(value: &T, field: &str) -> Result<String> {
    let mut value = serde_json::to_value(value)?;
    match value.as_object_mut() {
        Some(map) => {
            map.remove(field);
        }
        None => return Err(Error::Serialization("expected a JSON object".to_string())),
    }
    Ok(hash_canonical(&value))
}

// Keys are sorted explicitly rather than relying on the map ordering of the
// JSON library, so the canonical form survives feature-flag changes in
// dependencies.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json handles escaping; a string always serializes cleanly
            out.push_str(&serde_json::to_string(s).expect("string serialization"));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string serialization"));
                out.push(':');
                write_canonical(out, &map[*key]);
            }
            out.push('}');
        }
    }
}
