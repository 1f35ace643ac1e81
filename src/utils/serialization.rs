// src/utils/serialization.rs
//! Canonical JSON serialization.
//!
//! Claim hashes are computed over a canonical byte form of the claim so that
//! any implementation, in any language, derives the same hash for the same
//! logical document. The canonical form is the JSON Canonicalization Scheme
//! (RFC 8785): object keys sorted by UTF-16 code units, no insignificant
//! whitespace, ECMAScript number formatting.

use serde::Serialize;

/// Serializes `data` to its canonical (RFC 8785) byte form.
///
/// # Errors
/// Returns `Err(serde_json::Error)` if `data` cannot be represented as JSON,
/// for example a map with non-string keys.
pub fn canonical_bytes<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(data)?;
    serde_jcs::to_vec(&value)
}
