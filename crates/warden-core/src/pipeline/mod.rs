//! Authority pipeline: evaluate, mode-gate, and issue signed tokens.
//!
//! The pipeline is the only issuer of [`VerifiedToken`]s. One call runs
//! the full issuance flow:
//!
//! 1. Build the canonical proposal and compute its hash.
//! 2. Compute the environment fingerprint.
//! 3. Evaluate the policy.
//! 4. Decide per the mode matrix (evaluator verdict x gate mode x
//!    audited-permit opt-in), with the scope ladder applied to matched
//!    rules.
//! 5. STOP: append an audit record and return without a token.
//! 6. Issuance: generate a fresh ephemeral Ed25519 keypair, sign the
//!    canonical token payload, attach signature and public key, audit.
//!
//! The pipeline is total. It never panics and never returns an error:
//! any internal failure folds into a STOP outcome with a `pipeline_error`
//! reason and an audit record. Key material lives on the stack of a
//! single call, is zeroized on drop, and never persists.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use ed25519_dalek::{Signer as _, SigningKey};
use rand::RngCore as _;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::denial::Denial;
use crate::fingerprint::{EnvironmentProfile, environment_fingerprint};
use crate::ident::{AuditRef, TokenId};
use crate::policy::{self, Verdict};
use crate::proposal::{CanonicalProposal, GUARD_VERSION, build_proposal};
use crate::registry::{AuditEvent, TokenRegistry};
use crate::scope::{ScopeDecision, enforce};
use crate::token::{
    DEFAULT_TTL_SECS, Decision, GateMode, ScopeConstraints, TokenScope, VerifiedToken,
};


/// Reason string attached to audited permissive permits.
pub const AUDITED_PERMIT_REASON: &str = "AUDITED_PERMIT";

/// One authorization request, as the pipeline consumes it.
#[derive(Debug, Clone)]
pub struct AuthorityRequest {
    /// Bare executable name.
    pub command: String,
    /// Ordered argument vector.
    pub args: Vec<String>,
    /// Policy file to evaluate and bind against.
    pub policy_path: PathBuf,
    /// Active gate mode.
    pub gate_mode: GateMode,
    /// Permissive-mode opt-in: convert a policy miss into an audited
    /// ALLOW.
    pub allow_with_audit: bool,
    /// Host-identity profile for the environment fingerprint.
    pub profile: EnvironmentProfile,
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
}

impl AuthorityRequest {
    /// Creates a request with the default mode (STRICT), profile, and TTL.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>, policy_path: PathBuf) -> Self {
        Self {
            command: command.into(),
            args,
            policy_path,
            gate_mode: GateMode::Strict,
            allow_with_audit: false,
            profile: EnvironmentProfile::Minimal,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// The pipeline's verdict on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineDecision {
    /// An ALLOW token was issued.
    Allow,
    /// A HOLD token was issued.
    Hold,
    /// No token was issued; the attempt stops at the gate.
    Stop,
}

impl PipelineDecision {
    /// Stable uppercase name used in records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Hold => "HOLD",
            Self::Stop => "STOP",
        }
    }
}

impl std::fmt::Display for PipelineDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one pipeline call produces.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// ALLOW, HOLD, or STOP.
    pub decision: PipelineDecision,
    /// Canonical hash of the proposal, when one was built.
    pub proposal_hash: String,
    /// Environment fingerprint, when one was computed.
    pub environment_fingerprint: String,
    /// Human-readable reason.
    pub reason: String,
    /// Typed code for refusal outcomes.
    pub error_type: Option<String>,
    /// The issued token, on ALLOW and HOLD.
    pub token: Option<VerifiedToken>,
    /// The canonical proposal the token is bound to.
    pub proposal: Option<CanonicalProposal>,
}

/// Runs the authority pipeline for one request.
///
/// Total: every input, including internal failures, produces an outcome.
#[must_use]
pub fn authorize(request: &AuthorityRequest, registry: &TokenRegistry) -> PipelineOutcome {
    match run(request, registry) {
        Ok(outcome) => outcome,
        Err(detail) => {
            tracing::error!(command = %request.command, %detail, "pipeline error; stopping");
            let denial = Denial::PipelineError {
                reason: detail.clone(),
            };
            let outcome = PipelineOutcome {
                decision: PipelineDecision::Stop,
                proposal_hash: String::new(),
                environment_fingerprint: String::new(),
                reason: format!("pipeline_error: {detail}"),
                error_type: Some(denial.error_type().to_string()),
                token: None,
                proposal: None,
            };
            registry.append_audit(&AuditEvent {
                decision: "PIPELINE_ERROR".to_string(),
                proposal_hash: String::new(),
                token_id: None,
                policy_hash: String::new(),
                environment_fingerprint: String::new(),
                reason: outcome.reason.clone(),
                executed: false,
                error_type: outcome.error_type.clone(),
                time: Utc::now(),
            });
            outcome
        },
    }
}

fn run(request: &AuthorityRequest, registry: &TokenRegistry) -> Result<PipelineOutcome, String> {
    let proposal = build_proposal(&request.command, &request.args, &request.policy_path);
    let proposal_hash = proposal
        .canonical_hash()
        .map_err(|e| format!("proposal hash: {e}"))?;
    let env_fingerprint = environment_fingerprint(&request.policy_path, request.profile)
        .map_err(|e| format!("environment fingerprint: {e}"))?;

    let verdict = policy::evaluate(&request.command, &request.args, &request.policy_path);

    let resolution = resolve(&verdict, request.gate_mode, request.allow_with_audit);

    match resolution {
        Resolution::Stop { reason, error_type } => {
            registry.append_audit(&AuditEvent {
                decision: "STOP".to_string(),
                proposal_hash: proposal_hash.clone(),
                token_id: None,
                policy_hash: proposal.policy_hash.clone(),
                environment_fingerprint: env_fingerprint.clone(),
                reason: reason.clone(),
                executed: false,
                error_type: error_type.clone(),
                time: Utc::now(),
            });
            Ok(PipelineOutcome {
                decision: PipelineDecision::Stop,
                proposal_hash,
                environment_fingerprint: env_fingerprint,
                reason,
                error_type,
                token: None,
                proposal: Some(proposal),
            })
        },
        Resolution::Issue {
            decision,
            reason,
            error_type,
            audited_permit,
        } => {
            let token = issue_token(
                request,
                &proposal,
                &proposal_hash,
                &env_fingerprint,
                decision,
                audited_permit,
            )?;

            registry.append_audit(&AuditEvent {
                decision: format!("TOKEN_ISSUED_{}", token.decision.as_str()),
                proposal_hash: proposal_hash.clone(),
                token_id: Some(token.token_id.clone()),
                policy_hash: proposal.policy_hash.clone(),
                environment_fingerprint: env_fingerprint.clone(),
                reason: reason.clone(),
                executed: false,
                error_type: error_type.clone(),
                time: Utc::now(),
            });

            let pipeline_decision = match decision {
                Decision::Allow => PipelineDecision::Allow,
                Decision::Hold => PipelineDecision::Hold,
            };
            Ok(PipelineOutcome {
                decision: pipeline_decision,
                proposal_hash,
                environment_fingerprint: env_fingerprint,
                reason,
                error_type,
                token: Some(token),
                proposal: Some(proposal),
            })
        },
    }
}

enum Resolution {
    Stop {
        reason: String,
        error_type: Option<String>,
    },
    Issue {
        decision: Decision,
        reason: String,
        error_type: Option<String>,
        audited_permit: bool,
    },
}

/// The mode matrix, with the scope ladder applied to evaluator ALLOWs.
fn resolve(verdict: &Verdict, gate_mode: GateMode, allow_with_audit: bool) -> Resolution {
    if verdict.is_allow() {
        return match enforce(verdict.scope, gate_mode) {
            ScopeDecision::AutoIssue => Resolution::Issue {
                decision: Decision::Allow,
                reason: verdict.reason.clone(),
                error_type: None,
                audited_permit: false,
            },
            ScopeDecision::NeedsApproval => Resolution::Issue {
                decision: Decision::Hold,
                reason: format!(
                    "scope '{}' requires a human-approved token",
                    verdict.scope
                ),
                error_type: Some(
                    Denial::ScopeElevationHold {
                        scope: verdict.scope.as_str().to_string(),
                    }
                    .error_type()
                    .to_string(),
                ),
                audited_permit: false,
            },
            ScopeDecision::Blocked => Resolution::Stop {
                reason: format!("scope '{}' is blocked under STRICT", verdict.scope),
                error_type: Some(
                    Denial::ScopeElevationStop {
                        scope: verdict.scope.as_str().to_string(),
                    }
                    .error_type()
                    .to_string(),
                ),
            },
        };
    }

    match (gate_mode, allow_with_audit) {
        (GateMode::Strict, _) => Resolution::Stop {
            reason: verdict.reason.clone(),
            error_type: None,
        },
        (GateMode::Permissive, false) => Resolution::Issue {
            decision: Decision::Hold,
            reason: format!("{}; held under PERMISSIVE", verdict.reason),
            error_type: None,
            audited_permit: false,
        },
        (GateMode::Permissive, true) => Resolution::Issue {
            decision: Decision::Allow,
            reason: AUDITED_PERMIT_REASON.to_string(),
            error_type: None,
            audited_permit: true,
        },
    }
}

fn issue_token(
    request: &AuthorityRequest,
    proposal: &CanonicalProposal,
    proposal_hash: &str,
    env_fingerprint: &str,
    decision: Decision,
    audited_permit: bool,
) -> Result<VerifiedToken, String> {
    // Fresh ephemeral keypair per issuance. The seed is zeroized on drop
    // and the signing key never leaves this frame.
    let mut seed = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(&mut *seed);
    let signing_key = SigningKey::from_bytes(&seed);

    let issued_at = Utc::now();
    let mut token = VerifiedToken {
        token_id: TokenId::generate(),
        audit_ref: AuditRef::generate(),
        proposal_hash: proposal_hash.to_string(),
        policy_hash: proposal.policy_hash.clone(),
        environment_fingerprint: env_fingerprint.to_string(),
        decision,
        issued_at,
        expires_at: issued_at + Duration::seconds(request.ttl_secs),
        scope: TokenScope {
            action: "execute".to_string(),
            resource: proposal.command.clone(),
            constraints: ScopeConstraints {
                policy_version: proposal.policy_hash.clone(),
                gate_mode: request.gate_mode.as_str().to_string(),
                guard_version: GUARD_VERSION.to_string(),
                audited_permit: audited_permit.then_some(true),
            },
        },
        gate_mode: request.gate_mode,
        issuer_signature: String::new(),
        public_key_hex: String::new(),
    };

    let payload = token
        .signing_payload()
        .map_err(|e| format!("token payload: {e}"))?;
    let signature = signing_key.sign(&payload);
    token.issuer_signature = hex::encode(signature.to_bytes());
    token.public_key_hex = hex::encode(signing_key.verifying_key().to_bytes());

    Ok(token)
}
