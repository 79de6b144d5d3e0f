//! Policy content hashing for token binding.

use std::io::ErrorKind;
use std::path::Path;

use crate::canonical::sha256_hex;

/// Deterministic sentinel hashed in place of a missing policy file.
pub const POLICY_NOT_FOUND: &str = "policy_not_found";

/// Deterministic sentinel hashed in place of an unreadable policy file.
pub const POLICY_READ_ERROR: &str = "policy_read_error";

/// Hashes the policy file's byte content for binding into proposals,
/// fingerprints, and tokens.
///
/// Total: a missing file yields [`POLICY_NOT_FOUND`] and any other read
/// failure yields [`POLICY_READ_ERROR`]. The sentinels are deterministic
/// so that issuance and verification agree on the binding even when the
/// policy is absent; the evaluator independently fail-closes in that
/// case.
#[must_use]
pub fn hash_policy_file(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => sha256_hex(&bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => POLICY_NOT_FOUND.to_string(),
        Err(e) => {
            tracing::warn!(policy = %path.display(), error = %e, "policy read failed while hashing");
            POLICY_READ_ERROR.to_string()
        },
    }
}
