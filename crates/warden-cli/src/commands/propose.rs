//! `warden propose`: gate an agent proposal supplied as JSON.

use std::io::Read as _;
use std::path::PathBuf;

use warden_core::adapter::{AgentProposal, GateConfig, gate};
use warden_core::fingerprint::EnvironmentProfile;
use warden_core::kernel::ExecutionKernel;
use warden_core::pipeline::PipelineDecision;
use warden_core::policy::hash_policy_file;
use warden_core::registry::TokenRegistry;
use warden_core::scope::MemoryTokenStore;
use warden_core::token::GateMode;

use super::DecisionLine;

/// Options for gating one agent proposal.
pub struct ProposeOptions {
    pub json: Option<String>,
    pub policy: PathBuf,
    pub gate_mode: String,
    pub allow_with_audit: bool,
    pub fail_on_hold: bool,
    pub audit_dir: PathBuf,
}

/// Parses the proposal, runs the adapter gate, and returns the process
/// exit code.
pub async fn execute(options: ProposeOptions) -> i32 {
    let gate_mode = GateMode::parse_lenient(&options.gate_mode);

    let raw = match options.json {
        Some(raw) => raw,
        None => {
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                eprintln!("failed to read proposal from stdin: {e}");
                return 1;
            }
            buffer
        },
    };

    let mut registry = TokenRegistry::open(&options.audit_dir);

    let proposal = match AgentProposal::from_json(&raw) {
        Ok(proposal) => proposal,
        Err(denial) => {
            DecisionLine {
                decision: "STOP",
                proposal_hash: "",
                token_id: None,
                policy_hash: &hash_policy_file(&options.policy),
                environment_fingerprint: "",
                reason: &denial.to_string(),
                executed: false,
                gate_mode,
                error_type: Some(denial.error_type()),
            }
            .print();
            return 1;
        },
    };

    let mut config = GateConfig::new(options.policy.clone());
    config.gate_mode = gate_mode;
    config.allow_with_audit = options.allow_with_audit;

    // Human-approved tokens are stored out of process in a real
    // deployment; a per-invocation store means this surface never
    // short-circuits.
    let mut store = MemoryTokenStore::new();
    let kernel = ExecutionKernel::new(EnvironmentProfile::Minimal);

    let outcome = gate(&proposal, &config, &mut store, &mut registry, &kernel).await;

    DecisionLine {
        decision: outcome.decision.as_str(),
        proposal_hash: &outcome.proposal_hash,
        token_id: outcome.token_id.as_ref().map(warden_core::ident::TokenId::as_str),
        policy_hash: &hash_policy_file(&options.policy),
        environment_fingerprint: &outcome.environment_fingerprint,
        reason: &outcome.reason,
        executed: outcome.executed,
        gate_mode,
        error_type: outcome.error_type.as_deref(),
    }
    .print();

    match outcome.decision {
        PipelineDecision::Allow if outcome.executed => outcome.exit_code.unwrap_or(1),
        PipelineDecision::Hold => i32::from(options.fail_on_hold),
        _ => 1,
    }
}
