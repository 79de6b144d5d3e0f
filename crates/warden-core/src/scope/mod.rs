//! Scope ladder and human-approval token store.
//!
//! Policy rules carry a scope class describing the blast radius of the
//! command they match. The ladder controls whether the pipeline may
//! auto-issue a token or must defer to a human:
//!
//! - `safe`: auto-issue permitted in both gate modes;
//! - `net`, `fs`: a human-approved token is required even when the rule
//!   matches;
//! - `admin`: blocked outright under STRICT, never auto-issued.
//!
//! The [`TokenStore`] is the bridge through which a human-approved token
//! re-enters the gate: the adapter looks up the store by proposal hash and,
//! on a hit, hands the stored token straight to the kernel. The kernel
//! still runs its full verification chain; a stored token buys no
//! shortcut past replay, binding, or signature checks.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::token::{GateMode, VerifiedToken};

#[cfg(test)]
mod tests;

/// Blast-radius classification attached to policy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeClass {
    /// No elevated access. Auto-issue permitted.
    #[default]
    Safe,
    /// Network access. Requires human approval.
    Net,
    /// Filesystem mutation outside the working tree. Requires human
    /// approval.
    Fs,
    /// Administrative action. Blocked under STRICT.
    Admin,
}

impl ScopeClass {
    /// Stable lowercase name used in policy files and records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Net => "net",
            Self::Fs => "fs",
            Self::Admin => "admin",
        }
    }

    /// True when a matched rule with this scope still needs a
    /// human-approved token.
    #[must_use]
    pub const fn requires_approval(self) -> bool {
        matches!(self, Self::Net | Self::Fs | Self::Admin)
    }
}

impl std::fmt::Display for ScopeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scope ladder permits for a matched rule under a gate mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    /// The pipeline may issue an ALLOW token without human involvement.
    AutoIssue,
    /// A human-approved token is required; absent one, the attempt holds.
    NeedsApproval,
    /// The attempt is blocked outright under the active mode.
    Blocked,
}

/// Applies the scope ladder to a matched rule's scope under a gate mode.
#[must_use]
pub const fn enforce(scope: ScopeClass, mode: GateMode) -> ScopeDecision {
    match (scope, mode) {
        (ScopeClass::Safe, _) => ScopeDecision::AutoIssue,
        (ScopeClass::Net | ScopeClass::Fs, _) => ScopeDecision::NeedsApproval,
        (ScopeClass::Admin, GateMode::Strict) => ScopeDecision::Blocked,
        // Admin under PERMISSIVE still goes through the human-approval
        // path; the audited-permit escape hatch never applies to admin.
        (ScopeClass::Admin, GateMode::Permissive) => ScopeDecision::NeedsApproval,
    }
}

/// Storage bridge for human-approved tokens, keyed by proposal hash.
///
/// Backends are interchangeable; expiry is enforced at retrieval time so a
/// stale approval can never re-enter the gate.
pub trait TokenStore {
    /// Stores an approved token under its proposal hash, replacing any
    /// prior entry.
    fn store(&mut self, proposal_hash: &str, token: VerifiedToken);

    /// Retrieves the stored token for a proposal hash.
    ///
    /// Expired tokens are purged and `None` is returned.
    fn retrieve(&mut self, proposal_hash: &str) -> Option<VerifiedToken>;

    /// Removes the stored token for a proposal hash, if any.
    fn delete(&mut self, proposal_hash: &str);

    /// True when a live (non-expired) token is stored for this proposal
    /// hash.
    fn has(&mut self, proposal_hash: &str) -> bool;
}

/// In-memory token store for single-process hosting.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: HashMap<String, VerifiedToken>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, including any not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when no tokens are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn store(&mut self, proposal_hash: &str, token: VerifiedToken) {
        self.tokens.insert(proposal_hash.to_string(), token);
    }

    fn retrieve(&mut self, proposal_hash: &str) -> Option<VerifiedToken> {
        let expired = self
            .tokens
            .get(proposal_hash)
            .is_some_and(|t| t.is_expired(Utc::now()));
        if expired {
            self.tokens.remove(proposal_hash);
            return None;
        }
        self.tokens.get(proposal_hash).cloned()
    }

    fn delete(&mut self, proposal_hash: &str) {
        self.tokens.remove(proposal_hash);
    }

    fn has(&mut self, proposal_hash: &str) -> bool {
        self.retrieve(proposal_hash).is_some()
    }
}
