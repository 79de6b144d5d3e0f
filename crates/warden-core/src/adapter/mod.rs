//! Pre-validation adapter for agent-originated proposals.
//!
//! Requests from agents arrive as structured JSON, never as shell
//! strings. Before any policy logic runs, this adapter enforces a strict
//! shell-rejection schema:
//!
//! - `command` must be non-empty, whitespace-free, and contain no shell
//!   metacharacters;
//! - every argument must be free of CR and LF;
//! - `args` must be an array of strings;
//! - the identity triple (`session_id`, `turn_id`, `agent_id`) must be
//!   present and non-blank, and the source tag must be `"agent"`.
//!
//! Rejections fire before evaluation so policy code never sees a shell
//! string. Audit records produced here carry a SHA-256 digest of the
//! argument vector, never the plaintext arguments.
//!
//! The adapter also owns the stored-token short-circuit: when a
//! human-approved token exists for the current proposal hash, the
//! pipeline is skipped and the stored token goes straight to the kernel,
//! which still runs its full verification chain.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::denial::Denial;
use crate::fingerprint::{EnvironmentProfile, environment_fingerprint};
use crate::ident::{AuditRef, TokenId};
use crate::kernel::ExecutionKernel;
use crate::pipeline::{AuthorityRequest, PipelineDecision, authorize};
use crate::proposal::build_proposal;
use crate::registry::{AuditEvent, TokenRegistry};
use crate::scope::TokenStore;
use crate::token::{DEFAULT_TTL_SECS, Decision, GateMode};

#[cfg(test)]
mod tests;

/// The only accepted source tag for agent proposals.
pub const SOURCE_AGENT: &str = "agent";

/// Characters rejected anywhere in a command name.
pub const FORBIDDEN_COMMAND_CHARS: &[char] = &[
    '|', '&', ';', '<', '>', '`', '$', '"', '\'', '(', ')', '\r', '\n',
];

/// An agent's raw execution proposal, before pre-validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentProposal {
    /// Requested executable name.
    pub command: String,
    /// Requested argument vector.
    #[serde(default)]
    pub args: Vec<String>,
    /// Conversation the proposal belongs to.
    pub session_id: String,
    /// Turn within the conversation.
    pub turn_id: String,
    /// The proposing agent.
    pub agent_id: String,
    /// Mandatory source tag; must equal [`SOURCE_AGENT`].
    pub source: String,
    /// Requested working directory, advisory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Environment variables the agent asks to keep, advisory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_allowlist: Vec<String>,
    /// Requested gate mode; unknown values coerce to STRICT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_mode: Option<String>,
}

/// Identity triple carried through audit trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Conversation identifier.
    pub session_id: String,
    /// Turn identifier.
    pub turn_id: String,
    /// Agent identifier.
    pub agent_id: String,
}

/// A proposal that passed the shell-rejection schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevalidatedRequest {
    /// Validated executable name.
    pub command: String,
    /// Validated argument vector.
    pub args: Vec<String>,
    /// Validated identity triple.
    pub identity: AgentIdentity,
    /// Gate mode the agent requested (coerced leniently).
    pub requested_mode: GateMode,
    /// Advisory working directory.
    pub cwd: Option<PathBuf>,
}

impl AgentProposal {
    /// Parses a raw JSON proposal, mapping structural problems to
    /// [`Denial::ValidationError`] before typed deserialization.
    ///
    /// # Errors
    ///
    /// Returns `VALIDATION_ERROR` for non-JSON input, a non-object
    /// payload, or an `args` field that is not an array of strings.
    pub fn from_json(raw: &str) -> Result<Self, Denial> {
        let tree: Value = serde_json::from_str(raw).map_err(|e| Denial::ValidationError {
            reason: format!("proposal is not valid JSON: {e}"),
        })?;

        let Value::Object(ref map) = tree else {
            return Err(Denial::ValidationError {
                reason: "proposal must be a JSON object".to_string(),
            });
        };

        // Distinguish "args is the wrong shape" from other field errors
        // so the caller sees a precise reason.
        if let Some(args) = map.get("args") {
            let ok = args
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string));
            if !ok {
                return Err(Denial::ValidationError {
                    reason: "args must be an array of strings".to_string(),
                });
            }
        }

        serde_json::from_value(tree).map_err(|e| Denial::ValidationError {
            reason: format!("proposal schema violation: {e}"),
        })
    }
}

/// Applies the shell-rejection schema to a parsed proposal.
///
/// # Errors
///
/// Returns `SHELL_STRING_REJECTED` for shell syntax in the command or
/// CR/LF in any argument, `VALIDATION_ERROR` for identity or source-tag
/// violations. No policy evaluation happens before this returns.
pub fn prevalidate(proposal: &AgentProposal) -> Result<PrevalidatedRequest, Denial> {
    if proposal.source != SOURCE_AGENT {
        return Err(Denial::ValidationError {
            reason: format!("unrecognized source tag '{}'", proposal.source),
        });
    }

    reject_shell_strings(&proposal.command, &proposal.args)?;

    for (field, value) in [
        ("session_id", &proposal.session_id),
        ("turn_id", &proposal.turn_id),
        ("agent_id", &proposal.agent_id),
    ] {
        if value.trim().is_empty() {
            return Err(Denial::ValidationError {
                reason: format!("{field} must be present and non-blank"),
            });
        }
    }

    Ok(PrevalidatedRequest {
        command: proposal.command.clone(),
        args: proposal.args.clone(),
        identity: AgentIdentity {
            session_id: proposal.session_id.clone(),
            turn_id: proposal.turn_id.clone(),
            agent_id: proposal.agent_id.clone(),
        },
        requested_mode: GateMode::parse_lenient(proposal.requested_mode.as_deref().unwrap_or("")),
        cwd: proposal.cwd.as_ref().map(PathBuf::from),
    })
}

/// Applies the shell-rejection rules to a bare command and argument
/// vector, independent of any proposal envelope.
///
/// # Errors
///
/// Returns `SHELL_STRING_REJECTED` for an empty command, whitespace or a
/// forbidden metacharacter in the command, or CR/LF in any argument.
pub fn reject_shell_strings(command: &str, args: &[String]) -> Result<(), Denial> {
    validate_command(command)?;

    for (index, arg) in args.iter().enumerate() {
        if arg.contains('\r') || arg.contains('\n') {
            return Err(Denial::ShellStringRejected {
                field: format!("args[{index}]"),
                reason: "argument contains CR or LF".to_string(),
            });
        }
    }

    Ok(())
}

fn validate_command(command: &str) -> Result<(), Denial> {
    if command.is_empty() {
        return Err(Denial::ShellStringRejected {
            field: "command".to_string(),
            reason: "command is empty".to_string(),
        });
    }
    if command.chars().any(char::is_whitespace) {
        return Err(Denial::ShellStringRejected {
            field: "command".to_string(),
            reason: "command contains whitespace".to_string(),
        });
    }
    if let Some(bad) = command.chars().find(|c| FORBIDDEN_COMMAND_CHARS.contains(c)) {
        return Err(Denial::ShellStringRejected {
            field: "command".to_string(),
            reason: format!("command contains forbidden character {bad:?}"),
        });
    }
    Ok(())
}

/// SHA-256 digest of an argument vector's canonical serialization.
///
/// Audit records carry this digest instead of plaintext arguments.
#[must_use]
pub fn args_digest(args: &[String]) -> String {
    canonical::canonical_hash(&args).unwrap_or_default()
}

/// Gate configuration for one adapter session.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Policy to evaluate and bind against.
    pub policy_path: PathBuf,
    /// Active gate mode.
    pub gate_mode: GateMode,
    /// Permissive-mode audited-permit opt-in.
    pub allow_with_audit: bool,
    /// Host-identity profile.
    pub profile: EnvironmentProfile,
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
}

impl GateConfig {
    /// Creates a STRICT configuration with default profile and TTL.
    #[must_use]
    pub fn new(policy_path: PathBuf) -> Self {
        Self {
            policy_path,
            gate_mode: GateMode::Strict,
            allow_with_audit: false,
            profile: EnvironmentProfile::Minimal,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// The adapter's structured result for one gated request.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    /// ALLOW, HOLD, or STOP. Denials surface as STOP.
    pub decision: PipelineDecision,
    /// Canonical hash of the proposal, when one was built.
    pub proposal_hash: String,
    /// Environment fingerprint, when one was computed.
    pub environment_fingerprint: String,
    /// Human-readable reason.
    pub reason: String,
    /// Typed code for refusals.
    pub error_type: Option<String>,
    /// The token involved, when one was issued or retrieved.
    pub token_id: Option<TokenId>,
    /// Audit reference of the attempt, when a token exists.
    pub audit_ref: Option<AuditRef>,
    /// Whether the spawn primitive was reached.
    pub executed: bool,
    /// Child exit code, when executed.
    pub exit_code: Option<i32>,
}

/// Runs the full gate for one agent proposal: pre-validation, stored
/// token short-circuit, authority pipeline, kernel.
///
/// Total: every path, including denials, produces a [`GateOutcome`].
pub async fn gate<S: TokenStore>(
    proposal: &AgentProposal,
    config: &GateConfig,
    store: &mut S,
    registry: &mut TokenRegistry,
    kernel: &ExecutionKernel,
) -> GateOutcome {
    let validated = match prevalidate(proposal) {
        Ok(validated) => validated,
        Err(denial) => {
            audit_rejection(registry, proposal, &denial);
            return rejection_outcome(&denial);
        },
    };

    let canonical_proposal =
        build_proposal(&validated.command, &validated.args, &config.policy_path);
    let proposal_hash = match canonical_proposal.canonical_hash() {
        Ok(hash) => hash,
        Err(e) => {
            let denial = Denial::PipelineError {
                reason: format!("proposal hash: {e}"),
            };
            audit_rejection(registry, proposal, &denial);
            return rejection_outcome(&denial);
        },
    };

    // Human-approval short-circuit. The kernel still runs all seven
    // verification steps on the stored token.
    if let Some(stored) = store.retrieve(&proposal_hash) {
        store.delete(&proposal_hash);
        let env_fingerprint = environment_fingerprint(&config.policy_path, config.profile)
            .unwrap_or_default();
        let token_id = stored.token_id.clone();
        let audit_ref = stored.audit_ref.clone();
        return match kernel
            .execute(
                registry,
                &validated.command,
                &validated.args,
                &canonical_proposal,
                &stored,
            )
            .await
        {
            Ok(receipt) => GateOutcome {
                decision: PipelineDecision::Allow,
                proposal_hash,
                environment_fingerprint: env_fingerprint,
                reason: "human-approved token consumed".to_string(),
                error_type: None,
                token_id: Some(receipt.token_id),
                audit_ref: Some(receipt.audit_ref),
                executed: true,
                exit_code: Some(receipt.exit_code),
            },
            Err(denial) => GateOutcome {
                decision: PipelineDecision::Stop,
                proposal_hash,
                environment_fingerprint: env_fingerprint,
                reason: denial.to_string(),
                error_type: Some(denial.error_type().to_string()),
                token_id: Some(token_id),
                audit_ref: Some(audit_ref),
                executed: false,
                exit_code: None,
            },
        };
    }

    let mut request = AuthorityRequest::new(
        validated.command.clone(),
        validated.args.clone(),
        config.policy_path.clone(),
    );
    request.gate_mode = config.gate_mode;
    request.allow_with_audit = config.allow_with_audit;
    request.profile = config.profile;
    request.ttl_secs = config.ttl_secs;

    let outcome = authorize(&request, registry);

    let (Some(token), Some(pipeline_proposal)) = (outcome.token.clone(), outcome.proposal.clone())
    else {
        // STOP: no token to verify, nothing to execute.
        return GateOutcome {
            decision: outcome.decision,
            proposal_hash: outcome.proposal_hash,
            environment_fingerprint: outcome.environment_fingerprint,
            reason: outcome.reason,
            error_type: outcome.error_type,
            token_id: None,
            audit_ref: None,
            executed: false,
            exit_code: None,
        };
    };

    if token.decision != Decision::Allow {
        // HOLD tokens stop here; the caller decides whether a hold is an
        // error. Presenting one to the kernel would only trade
        // HOLD for DECISION_NOT_ALLOW.
        return GateOutcome {
            decision: outcome.decision,
            proposal_hash: outcome.proposal_hash,
            environment_fingerprint: outcome.environment_fingerprint,
            reason: outcome.reason,
            error_type: outcome.error_type,
            token_id: Some(token.token_id),
            audit_ref: Some(token.audit_ref),
            executed: false,
            exit_code: None,
        };
    }

    match kernel
        .execute(
            registry,
            &validated.command,
            &validated.args,
            &pipeline_proposal,
            &token,
        )
        .await
    {
        Ok(receipt) => GateOutcome {
            decision: PipelineDecision::Allow,
            proposal_hash: outcome.proposal_hash,
            environment_fingerprint: outcome.environment_fingerprint,
            reason: outcome.reason,
            error_type: None,
            token_id: Some(receipt.token_id),
            audit_ref: Some(receipt.audit_ref),
            executed: true,
            exit_code: Some(receipt.exit_code),
        },
        Err(denial) => GateOutcome {
            decision: PipelineDecision::Stop,
            proposal_hash: outcome.proposal_hash,
            environment_fingerprint: outcome.environment_fingerprint,
            reason: denial.to_string(),
            error_type: Some(denial.error_type().to_string()),
            token_id: Some(token.token_id),
            audit_ref: Some(token.audit_ref),
            executed: false,
            exit_code: None,
        },
    }
}

fn rejection_outcome(denial: &Denial) -> GateOutcome {
    GateOutcome {
        decision: PipelineDecision::Stop,
        proposal_hash: String::new(),
        environment_fingerprint: String::new(),
        reason: denial.to_string(),
        error_type: Some(denial.error_type().to_string()),
        token_id: None,
        audit_ref: None,
        executed: false,
        exit_code: None,
    }
}

fn audit_rejection(registry: &TokenRegistry, proposal: &AgentProposal, denial: &Denial) {
    registry.append_audit(&AuditEvent {
        decision: "STOP".to_string(),
        proposal_hash: String::new(),
        token_id: None,
        policy_hash: String::new(),
        environment_fingerprint: String::new(),
        // Plaintext args never reach the audit stream.
        reason: format!("{denial}; args_sha256={}", args_digest(&proposal.args)),
        executed: false,
        error_type: Some(denial.error_type().to_string()),
        time: Utc::now(),
    });
}
