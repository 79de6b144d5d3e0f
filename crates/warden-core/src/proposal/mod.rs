//! Canonical proposals: the immutable identity of an execution request.
//!
//! A proposal binds `(command, args, policy content, issuance window,
//! guard version)` into one record whose canonical hash is what tokens are
//! issued against and what the kernel re-derives at verification time.
//! Two structurally equal proposals hash identically; the minute-floored
//! timestamp means the hash only moves at minute boundaries, giving the
//! replay registry a coarse issuance window to reason about.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::{self, CanonicalError};
use crate::policy::hash_policy_file;

/// Implementation identity stamped into proposals and tokens.
pub const GUARD_VERSION: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));

/// An immutable record describing one execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalProposal {
    /// Bare executable name. No whitespace, no shell metacharacters.
    pub command: String,
    /// Ordered argument vector; order is significant.
    pub args: Vec<String>,
    /// Locator of the policy the request was built against.
    pub policy_path: String,
    /// Content hash of the policy at build time.
    pub policy_hash: String,
    /// Implementation identity of the gate that built this proposal.
    pub guard_version: String,
    /// Wall-clock time floored to a 60-second boundary (RFC 3339).
    pub timestamp_floor: String,
}

impl CanonicalProposal {
    /// Computes the proposal hash: SHA-256 over the canonical
    /// serialization of this record.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if serialization fails.
    pub fn canonical_hash(&self) -> Result<String, CanonicalError> {
        canonical::canonical_hash(self)
    }
}

/// Floors an instant to its minute boundary.
#[must_use]
pub fn floor_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

/// Builds the canonical proposal for a request at the current instant.
///
/// Arguments are defensively copied in order; the policy hash is computed
/// from the file's bytes (deterministic sentinels when missing or
/// unreadable).
#[must_use]
pub fn build_proposal(command: &str, args: &[String], policy_path: &Path) -> CanonicalProposal {
    build_proposal_at(command, args, policy_path, Utc::now())
}

/// Builds a canonical proposal with an explicit clock, for deterministic
/// construction and tests.
#[must_use]
pub fn build_proposal_at(
    command: &str,
    args: &[String],
    policy_path: &Path,
    now: DateTime<Utc>,
) -> CanonicalProposal {
    CanonicalProposal {
        command: command.to_string(),
        args: args.to_vec(),
        policy_path: policy_path.display().to_string(),
        policy_hash: hash_policy_file(policy_path),
        guard_version: GUARD_VERSION.to_string(),
        timestamp_floor: floor_to_minute(now).to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}
