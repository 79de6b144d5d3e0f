//! Typed denial taxonomy: the exhaustive set of reasons the gate refuses
//! to execute.
//!
//! Every refusal anywhere in the gate surfaces as a [`Denial`] with a
//! stable machine code ([`Denial::error_type`]). The taxonomy is stable
//! across versions: new kinds are added as new variants, never by
//! redefining existing ones.
//!
//! # Fail-Closed Semantics
//!
//! There is no "unknown -> allow" path. Unexpected conditions map to a
//! denial kind (`PIPELINE_ERROR` for pipeline faults, `VALIDATION_ERROR`
//! for malformed requests), and the caller converts the denial into a
//! non-zero exit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A typed refusal to authorize or execute a command.
///
/// The seven kernel variants correspond one-to-one with the verification
/// chain steps and fire in that fixed order; the remaining variants are
/// raised by the pre-validation adapter, the authority pipeline, and the
/// scope ladder.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Denial {
    /// Step 1: the token's TTL has elapsed.
    #[error("token expired at {expires_at}")]
    TokenExpired {
        /// RFC 3339 expiry instant carried by the token.
        expires_at: String,
    },

    /// Step 2: the presented token carries a non-ALLOW decision.
    #[error("token decision is {decision}, execution requires ALLOW")]
    DecisionNotAllow {
        /// The decision the token actually carries.
        decision: String,
    },

    /// Step 3: the token identifier is already in the replay registry.
    #[error("token {token_id} has already been used")]
    TokenReplayed {
        /// The replayed token identifier.
        token_id: String,
    },

    /// Step 4: the presented proposal does not hash to the token binding.
    #[error("proposal hash does not match token binding")]
    ProposalHashMismatch,

    /// Step 5: the policy file content changed after issuance.
    #[error("policy content changed after token issuance")]
    PolicyHashMismatch,

    /// Step 6: the host or runtime identity changed after issuance.
    #[error("environment fingerprint does not match token binding")]
    EnvFingerprintMismatch,

    /// Step 7: the issuer signature fails verification or the embedded key
    /// material is malformed.
    #[error("token signature invalid: {reason}")]
    SignatureInvalid {
        /// What failed: key parse, signature parse, or verification.
        reason: String,
    },

    /// Pre-validation: the command or an argument carries shell syntax.
    #[error("shell string rejected in {field}: {reason}")]
    ShellStringRejected {
        /// Which field was rejected (`command` or `args[i]`).
        field: String,
        /// The specific violation.
        reason: String,
    },

    /// Pre-validation: the request is structurally malformed.
    #[error("proposal validation failed: {reason}")]
    ValidationError {
        /// The structural problem.
        reason: String,
    },

    /// The authority pipeline hit an unexpected internal failure and
    /// converted it to a STOP.
    #[error("authority pipeline error: {reason}")]
    PipelineError {
        /// The absorbed failure.
        reason: String,
    },

    /// Scope ladder: the matched rule's scope is blocked outright under the
    /// active gate mode.
    #[error("scope '{scope}' is blocked under the active gate mode")]
    ScopeElevationStop {
        /// The blocking scope class.
        scope: String,
    },

    /// Scope ladder: the matched rule's scope requires a human-approved
    /// token that is not present.
    #[error("scope '{scope}' requires a human-approved token")]
    ScopeElevationHold {
        /// The elevating scope class.
        scope: String,
    },
}

impl Denial {
    /// Returns the stable machine code for this denial, as recorded in
    /// audit streams and the structured decision line.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::TokenExpired { .. } => "TOKEN_EXPIRED",
            Self::DecisionNotAllow { .. } => "DECISION_NOT_ALLOW",
            Self::TokenReplayed { .. } => "TOKEN_REPLAYED",
            Self::ProposalHashMismatch => "PROPOSAL_HASH_MISMATCH",
            Self::PolicyHashMismatch => "POLICY_HASH_MISMATCH",
            Self::EnvFingerprintMismatch => "ENV_FINGERPRINT_MISMATCH",
            Self::SignatureInvalid { .. } => "SIGNATURE_INVALID",
            Self::ShellStringRejected { .. } => "SHELL_STRING_REJECTED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::PipelineError { .. } => "PIPELINE_ERROR",
            Self::ScopeElevationStop { .. } => "SCOPE_ELEVATION_STOP",
            Self::ScopeElevationHold { .. } => "SCOPE_ELEVATION_HOLD",
        }
    }

    /// True for the seven kinds raised by the kernel verification chain.
    #[must_use]
    pub const fn is_kernel_denial(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired { .. }
                | Self::DecisionNotAllow { .. }
                | Self::TokenReplayed { .. }
                | Self::ProposalHashMismatch
                | Self::PolicyHashMismatch
                | Self::EnvFingerprintMismatch
                | Self::SignatureInvalid { .. }
        )
    }
}
