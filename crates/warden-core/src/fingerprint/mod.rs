//! Environment fingerprinting: binding tokens to one host identity.
//!
//! The fingerprint is the canonical hash of an ordered host-identity
//! record plus the policy content hash. A token issued on one host, under
//! one policy, cannot be verified anywhere else: the kernel recomputes the
//! fingerprint at execution time and refuses on any drift.
//!
//! Two profiles are supported. `Minimal` covers the reference field set
//! (`host_os`, `host_arch`, `runtime_version`, `policy_hash`); `Extended`
//! adds the guard version and CI workflow identifiers when the host
//! exposes them. Whatever profile is active, mutating any included field
//! changes the fingerprint.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canonical::{self, CanonicalError};
use crate::policy::hash_policy_file;
use crate::proposal::GUARD_VERSION;

#[cfg(test)]
mod tests;

/// Runtime identity string baked in at compile time.
///
/// A compile-time constant keeps the fingerprint deterministic and
/// offline; a live toolchain probe would make issuance and verification
/// race the environment.
pub const RUNTIME_VERSION: &str = concat!("rust-", env!("CARGO_PKG_RUST_VERSION"));

/// Which host-identity fields participate in the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentProfile {
    /// The reference field set: OS, architecture, runtime, policy hash.
    #[default]
    Minimal,
    /// Adds guard version and CI workflow identifiers
    /// (`GITHUB_WORKFLOW`, `GITHUB_RUN_ID`, `GITHUB_SHA`) when present.
    Extended,
}

/// The ordered host-identity record the fingerprint is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    /// Operating system family (`std::env::consts::OS`).
    pub host_os: String,
    /// CPU architecture (`std::env::consts::ARCH`).
    pub host_arch: String,
    /// Runtime identity ([`RUNTIME_VERSION`]).
    pub runtime_version: String,
    /// Content hash of the active policy.
    pub policy_hash: String,
    /// Guard version; extended profile only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_version: Option<String>,
    /// CI workflow name; extended profile only, when exposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    /// CI run identifier; extended profile only, when exposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Repository commit; extended profile only, when exposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl HostIdentity {
    /// Captures the identity of the current host under the given profile.
    #[must_use]
    pub fn capture(policy_path: &Path, profile: EnvironmentProfile) -> Self {
        let mut identity = Self {
            host_os: std::env::consts::OS.to_string(),
            host_arch: std::env::consts::ARCH.to_string(),
            runtime_version: RUNTIME_VERSION.to_string(),
            policy_hash: hash_policy_file(policy_path),
            guard_version: None,
            workflow: None,
            run_id: None,
            commit: None,
        };

        if profile == EnvironmentProfile::Extended {
            identity.guard_version = Some(GUARD_VERSION.to_string());
            identity.workflow = std::env::var("GITHUB_WORKFLOW").ok();
            identity.run_id = std::env::var("GITHUB_RUN_ID").ok();
            identity.commit = std::env::var("GITHUB_SHA").ok();
        }

        identity
    }

    /// Computes the fingerprint of this identity record.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if serialization fails.
    pub fn fingerprint(&self) -> Result<String, CanonicalError> {
        canonical::canonical_hash(self)
    }
}

/// Captures the current host identity and computes its fingerprint in one
/// step.
///
/// # Errors
///
/// Returns [`CanonicalError`] if serialization fails.
pub fn environment_fingerprint(
    policy_path: &Path,
    profile: EnvironmentProfile,
) -> Result<String, CanonicalError> {
    HostIdentity::capture(policy_path, profile).fingerprint()
}
