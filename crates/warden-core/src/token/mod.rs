//! Authority token model.
//!
//! A [`VerifiedToken`] is the signed, time-bound record the authority
//! pipeline issues and the execution kernel consumes exactly once. It binds
//! a canonical proposal, the policy content, and the host environment into
//! one self-contained grant:
//!
//! - `proposal_hash`, `policy_hash`, `environment_fingerprint` tie the
//!   token to exactly one request in exactly one world state.
//! - `issuer_signature` covers the canonical serialization of every field
//!   except itself and `public_key_hex`, so any post-issuance mutation is
//!   detectable.
//! - The embedded public key is acceptable as the verifier because the
//!   token never outlives the issuing process: the environment fingerprint
//!   and TTL bound its lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{self, CanonicalError};
use crate::ident::{AuditRef, TokenId};

#[cfg(test)]
mod tests;

/// Default token lifetime in seconds.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// The decision carried by an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    /// Execution is authorized; the kernel may spawn.
    Allow,
    /// Held for human approval; the kernel refuses at step 2.
    Hold,
}

impl Decision {
    /// Stable uppercase name used in records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate operating mode.
///
/// `Strict` stops at the gate on a policy miss. `Permissive` issues a HOLD
/// token (or, with explicit opt-in, an audited ALLOW) that still flows
/// through the kernel's full verification chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateMode {
    /// Policy miss blocks at the gate. The fail-closed default.
    #[default]
    Strict,
    /// Policy miss produces a HOLD token for downstream approval.
    Permissive,
}

impl GateMode {
    /// Stable uppercase name used in records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "STRICT",
            Self::Permissive => "PERMISSIVE",
        }
    }

    /// Parses a mode string, silently coercing unknown values to `Strict`.
    ///
    /// Unknown modes must not widen authority, so the coercion direction is
    /// fixed: anything unrecognized is STRICT.
    #[must_use]
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "PERMISSIVE" => Self::Permissive,
            _ => Self::Strict,
        }
    }
}

impl std::fmt::Display for GateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraints recorded inside a token's scope block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConstraints {
    /// Content hash of the policy the token was issued under.
    pub policy_version: String,
    /// Gate mode active at issuance.
    pub gate_mode: String,
    /// Implementation identity of the issuing gate.
    pub guard_version: String,
    /// Present and `true` only for audited permissive permits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audited_permit: Option<bool>,
}

/// The structured scope block of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenScope {
    /// The authorized action. Always `"execute"` for this gate.
    pub action: String,
    /// The resource the action applies to: the bare command name.
    pub resource: String,
    /// Issuance constraints.
    pub constraints: ScopeConstraints,
}

/// A signed, single-use authority token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedToken {
    /// Time-ordered unique token identifier.
    pub token_id: TokenId,
    /// Time-ordered reference shared by this attempt's audit records.
    pub audit_ref: AuditRef,
    /// Canonical hash of the bound proposal.
    pub proposal_hash: String,
    /// Content hash of the bound policy file.
    pub policy_hash: String,
    /// Fingerprint of the issuing host environment.
    pub environment_fingerprint: String,
    /// The pipeline's decision.
    pub decision: Decision,
    /// Issuance instant.
    pub issued_at: DateTime<Utc>,
    /// Expiry instant (`issued_at` + TTL).
    pub expires_at: DateTime<Utc>,
    /// Structured scope block.
    pub scope: TokenScope,
    /// Gate mode active at issuance.
    pub gate_mode: GateMode,
    /// Ed25519 signature (hex) over the canonical serialization of every
    /// other field except `public_key_hex`.
    pub issuer_signature: String,
    /// Ephemeral Ed25519 verifying key (hex), valid for this process
    /// lifetime only.
    pub public_key_hex: String,
}

/// Field names excluded from the signed payload.
const UNSIGNED_FIELDS: [&str; 2] = ["issuer_signature", "public_key_hex"];

impl VerifiedToken {
    /// Reconstructs the exact byte payload the issuer signed: the canonical
    /// serialization of this token with `issuer_signature` and
    /// `public_key_hex` removed.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] if the token cannot be serialized.
    pub fn signing_payload(&self) -> Result<Vec<u8>, CanonicalError> {
        let mut tree = serde_json::to_value(self)
            .map_err(|e| CanonicalError::Serialize(e.to_string()))?;
        if let Value::Object(map) = &mut tree {
            for field in UNSIGNED_FIELDS {
                map.remove(field);
            }
        }
        canonical::value_to_canonical_bytes(&tree)
    }

    /// True when `now` is past the token's expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// True when this token is an audited permissive permit.
    #[must_use]
    pub fn is_audited_permit(&self) -> bool {
        self.scope.constraints.audited_permit == Some(true)
    }
}
