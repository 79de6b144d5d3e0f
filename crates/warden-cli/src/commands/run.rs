//! `warden run`: the full gate: prevalidation, issuance, kernel,
//! execution.

use std::path::PathBuf;

use warden_core::fingerprint::environment_fingerprint;
use warden_core::kernel::ExecutionKernel;
use warden_core::pipeline::{AuthorityRequest, PipelineDecision, authorize};
use warden_core::policy::hash_policy_file;
use warden_core::registry::TokenRegistry;
use warden_core::token::GateMode;
use warden_core::{adapter, Denial};

use super::{DecisionLine, parse_profile};

/// Options for one gated run.
pub struct RunOptions {
    pub command: String,
    pub args: Vec<String>,
    pub policy: PathBuf,
    pub gate_mode: String,
    pub allow_with_audit: bool,
    pub fail_on_hold: bool,
    pub audit_dir: PathBuf,
    pub profile: String,
    pub ttl: i64,
}

/// Runs the gate and returns the process exit code.
pub async fn execute(options: RunOptions) -> i32 {
    let gate_mode = GateMode::parse_lenient(&options.gate_mode);
    let profile = parse_profile(&options.profile);
    let mut registry = TokenRegistry::open(&options.audit_dir);
    let kernel = ExecutionKernel::new(profile);

    // Shell strings are refused before any policy logic runs.
    if let Err(denial) = adapter::reject_shell_strings(&options.command, &options.args) {
        print_rejection(&options, gate_mode, &denial);
        return 1;
    }

    let mut request = AuthorityRequest::new(
        options.command.clone(),
        options.args.clone(),
        options.policy.clone(),
    );
    request.gate_mode = gate_mode;
    request.allow_with_audit = options.allow_with_audit;
    request.profile = profile;
    request.ttl_secs = options.ttl;

    let outcome = authorize(&request, &registry);
    let policy_hash = outcome
        .proposal
        .as_ref()
        .map_or_else(|| hash_policy_file(&options.policy), |p| p.policy_hash.clone());

    match outcome.decision {
        PipelineDecision::Stop => {
            DecisionLine {
                decision: "STOP",
                proposal_hash: &outcome.proposal_hash,
                token_id: None,
                policy_hash: &policy_hash,
                environment_fingerprint: &outcome.environment_fingerprint,
                reason: &outcome.reason,
                executed: false,
                gate_mode,
                error_type: outcome.error_type.as_deref(),
            }
            .print();
            1
        },
        PipelineDecision::Hold => {
            let token = outcome.token.as_ref();
            DecisionLine {
                decision: "HOLD",
                proposal_hash: &outcome.proposal_hash,
                token_id: token.map(|t| t.token_id.as_str()),
                policy_hash: &policy_hash,
                environment_fingerprint: &outcome.environment_fingerprint,
                reason: &outcome.reason,
                executed: false,
                gate_mode,
                error_type: outcome.error_type.as_deref(),
            }
            .print();
            i32::from(options.fail_on_hold)
        },
        PipelineDecision::Allow => {
            // Issuance invariant: an ALLOW outcome always carries a token
            // and its proposal.
            let (Some(token), Some(proposal)) = (outcome.token.as_ref(), outcome.proposal.as_ref())
            else {
                tracing::error!("ALLOW outcome without token; refusing");
                return 1;
            };

            match kernel
                .execute(
                    &mut registry,
                    &options.command,
                    &options.args,
                    proposal,
                    token,
                )
                .await
            {
                Ok(receipt) => {
                    DecisionLine {
                        decision: "ALLOW",
                        proposal_hash: &outcome.proposal_hash,
                        token_id: Some(token.token_id.as_str()),
                        policy_hash: &policy_hash,
                        environment_fingerprint: &outcome.environment_fingerprint,
                        reason: &outcome.reason,
                        executed: true,
                        gate_mode,
                        error_type: None,
                    }
                    .print();
                    receipt.exit_code
                },
                Err(denial) => {
                    DecisionLine {
                        decision: "ALLOW",
                        proposal_hash: &outcome.proposal_hash,
                        token_id: Some(token.token_id.as_str()),
                        policy_hash: &policy_hash,
                        environment_fingerprint: &outcome.environment_fingerprint,
                        reason: &denial.to_string(),
                        executed: false,
                        gate_mode,
                        error_type: Some(denial.error_type()),
                    }
                    .print();
                    1
                },
            }
        },
    }
}

fn print_rejection(options: &RunOptions, gate_mode: GateMode, denial: &Denial) {
    let env_fingerprint =
        environment_fingerprint(&options.policy, parse_profile(&options.profile))
            .unwrap_or_default();
    DecisionLine {
        decision: "STOP",
        proposal_hash: "",
        token_id: None,
        policy_hash: &hash_policy_file(&options.policy),
        environment_fingerprint: &env_fingerprint,
        reason: &denial.to_string(),
        executed: false,
        gate_mode,
        error_type: Some(denial.error_type()),
    }
    .print();
}
