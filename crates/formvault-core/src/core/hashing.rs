// crates/formvault-core/src/core/hashing.rs
// ============================================================================
// Module: Formvault Canonical Hashing
// Description: Canonical JSON serialization and digest helpers.
// Purpose: Provide stable hashes for aggregate snapshot integrity checks.
// Dependencies: serde_jcs, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! Aggregate snapshots persisted by stores carry a digest of their canonical
//! JSON form. Canonicalization uses JCS so logically identical trees always
//! hash identically regardless of key order or number rendering. Stores
//! verify the digest on load and fail closed on mismatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write;

use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hashing Errors
// ============================================================================

/// Canonicalization errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashingError {
    /// The value could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Canonical Hashing
// ============================================================================

/// Digest prefix identifying the hash algorithm.
const DIGEST_PREFIX: &str = "sha256:";

/// Serializes a JSON value into canonical (JCS) bytes.
///
/// # Errors
///
/// Returns [`HashingError`] when the value cannot be canonicalized, such as
/// for non-finite numbers.
pub fn canonical_json_bytes(value: &Value) -> Result<Vec<u8>, HashingError> {
    serde_jcs::to_vec(value).map_err(|err| HashingError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes into a `sha256:<hex>` digest string.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(DIGEST_PREFIX.len() + digest.len() * 2);
    out.push_str(DIGEST_PREFIX);
    for byte in digest {
        // Infallible for String targets.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Hashes a JSON value via its canonical byte form.
///
/// # Errors
///
/// Returns [`HashingError`] when canonicalization fails.
pub fn hash_value(value: &Value) -> Result<String, HashingError> {
    Ok(hash_bytes(&canonical_json_bytes(value)?))
}
