//! Canonical serialization for deterministic hashing and signing.
//!
//! Every hash and signature in the gate is computed over the byte output of
//! this module, so the encoding must be bit-stable across processes, hosts,
//! and releases:
//!
//! - Object keys are emitted in lexicographic (byte-order) order.
//! - Arrays preserve insertion order.
//! - No whitespace between tokens.
//! - Strings use minimal JSON escaping.
//! - Numbers are integer-only; floats are rejected because their textual
//!   form is not guaranteed stable across platforms.
//! - Structures nested deeper than [`MAX_DEPTH`] levels are rejected.
//!
//! Two semantically equal structures always serialize to identical bytes,
//! which is what makes proposal hashes and signature payload reconstruction
//! (serialize, sign; later re-serialize, verify) sound.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Maximum recursion depth for canonicalization to prevent stack overflow.
pub const MAX_DEPTH: usize = 128;

/// Errors that can occur during canonical serialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// A floating-point number was encountered.
    ///
    /// Canonical records are integer-only; float formatting is not stable
    /// enough to hash or sign.
    #[error("float not allowed in canonical record")]
    FloatNotAllowed,

    /// The maximum nesting depth was exceeded.
    #[error("canonical record exceeds maximum depth of {MAX_DEPTH}")]
    DepthExceeded,

    /// The value could not be converted into a serializable tree.
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Serializes any `Serialize` value into its canonical byte string.
///
/// # Errors
///
/// Returns [`CanonicalError`] if the value contains floats, nests deeper
/// than [`MAX_DEPTH`], or fails `serde_json` conversion.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let tree =
        serde_json::to_value(value).map_err(|e| CanonicalError::Serialize(e.to_string()))?;
    let mut out = String::new();
    write_canonical(&mut out, &tree, 0)?;
    Ok(out.into_bytes())
}

/// Serializes an already-built [`serde_json::Value`] tree canonically.
///
/// # Errors
///
/// Returns [`CanonicalError`] on floats or excessive nesting.
pub fn value_to_canonical_bytes(tree: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut out = String::new();
    write_canonical(&mut out, tree, 0)?;
    Ok(out.into_bytes())
}

/// Computes the lowercase hex SHA-256 digest of a byte string.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Computes the canonical hash of a value: SHA-256 over its canonical bytes.
///
/// # Errors
///
/// Returns [`CanonicalError`] if canonical serialization fails.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(sha256_hex(&to_canonical_bytes(value)?))
}

fn write_canonical(out: &mut String, value: &Value, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::DepthExceeded);
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CanonicalError::FloatNotAllowed);
            }
            // i64/u64 Display is already canonical: no leading zeros, no sign
            // on zero, no exponent form.
            let _ = write!(out, "{n}");
        },
        Value::String(s) => write_escaped_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item, depth + 1)?;
            }
            out.push(']');
        },
        Value::Object(map) => {
            // serde_json's default map is sorted, but the sort here is load
            // bearing: the canonical contract must hold even if a caller
            // builds the tree through a preserve-order map.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped_string(out, key);
                out.push(':');
                // Key presence is guaranteed: `keys` came from this map.
                if let Some(v) = map.get(*key) {
                    write_canonical(out, v, depth + 1)?;
                }
            }
            out.push('}');
        },
    }

    Ok(())
}

/// Writes a string with minimal JSON escaping (RFC 8259 required escapes
/// only).
fn write_escaped_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}
