//! Tests for pre-validation and the adapter gate flow.

use std::path::PathBuf;

use tempfile::TempDir;

use super::*;
use crate::registry::AUDIT_LOG_FILE;
use crate::scope::MemoryTokenStore;

fn proposal(command: &str, args: &[&str]) -> AgentProposal {
    AgentProposal {
        command: command.to_string(),
        args: args.iter().map(|s| (*s).to_string()).collect(),
        session_id: "sess-1".to_string(),
        turn_id: "turn-1".to_string(),
        agent_id: "agent-1".to_string(),
        source: SOURCE_AGENT.to_string(),
        cwd: None,
        env_allowlist: Vec::new(),
        requested_mode: None,
    }
}

// =============================================================================
// Shell-string rejection
// =============================================================================

#[test]
fn clean_command_passes() {
    let validated = prevalidate(&proposal("echo", &["t1"])).unwrap();
    assert_eq!(validated.command, "echo");
    assert_eq!(validated.args, vec!["t1".to_string()]);
    assert_eq!(validated.identity.session_id, "sess-1");
}

#[test]
fn every_metacharacter_is_rejected() {
    for c in FORBIDDEN_COMMAND_CHARS {
        let denial = prevalidate(&proposal(&format!("echo{c}x"), &[])).unwrap_err();
        assert_eq!(
            denial.error_type(),
            "SHELL_STRING_REJECTED",
            "character {c:?} must be rejected"
        );
    }
}

#[test]
fn whitespace_in_command_is_rejected() {
    for command in ["echo hi", "echo\thi", "rm -rf"] {
        let denial = prevalidate(&proposal(command, &[])).unwrap_err();
        assert_eq!(denial.error_type(), "SHELL_STRING_REJECTED");
    }
}

#[test]
fn empty_command_is_rejected() {
    let denial = prevalidate(&proposal("", &[])).unwrap_err();
    assert_eq!(denial.error_type(), "SHELL_STRING_REJECTED");
}

#[test]
fn crlf_in_args_is_rejected() {
    for bad in ["line1\nline2", "cr\rhere"] {
        let denial = prevalidate(&proposal("echo", &[bad])).unwrap_err();
        assert_eq!(denial.error_type(), "SHELL_STRING_REJECTED");
        assert!(denial.to_string().contains("args[0]"));
    }
}

#[test]
fn shell_metacharacters_in_args_are_opaque() {
    // Only CR/LF are rejected in args; everything else is an opaque
    // argument handed to the OS verbatim, never to a shell.
    let validated = prevalidate(&proposal("grep", &["a|b", "$HOME"])).unwrap();
    assert_eq!(validated.args[0], "a|b");
}

// =============================================================================
// Identity and structure
// =============================================================================

#[test]
fn blank_identity_fields_are_rejected() {
    for field in ["session_id", "turn_id", "agent_id"] {
        let mut p = proposal("echo", &[]);
        match field {
            "session_id" => p.session_id = "  ".to_string(),
            "turn_id" => p.turn_id = String::new(),
            _ => p.agent_id = "\t".to_string(),
        }
        let denial = prevalidate(&p).unwrap_err();
        assert_eq!(denial.error_type(), "VALIDATION_ERROR");
        assert!(denial.to_string().contains(field));
    }
}

#[test]
fn wrong_source_tag_is_rejected() {
    let mut p = proposal("echo", &[]);
    p.source = "human".to_string();
    let denial = prevalidate(&p).unwrap_err();
    assert_eq!(denial.error_type(), "VALIDATION_ERROR");
}

#[test]
fn non_array_args_is_a_validation_error() {
    let raw = r#"{
        "command": "echo",
        "args": "t1",
        "session_id": "s",
        "turn_id": "t",
        "agent_id": "a",
        "source": "agent"
    }"#;
    let denial = AgentProposal::from_json(raw).unwrap_err();
    assert_eq!(denial.error_type(), "VALIDATION_ERROR");
    assert!(denial.to_string().contains("array of strings"));
}

#[test]
fn non_string_arg_elements_are_a_validation_error() {
    let raw = r#"{
        "command": "echo",
        "args": ["ok", 42],
        "session_id": "s",
        "turn_id": "t",
        "agent_id": "a",
        "source": "agent"
    }"#;
    let denial = AgentProposal::from_json(raw).unwrap_err();
    assert_eq!(denial.error_type(), "VALIDATION_ERROR");
}

#[test]
fn invalid_json_is_a_validation_error() {
    let denial = AgentProposal::from_json("not json").unwrap_err();
    assert_eq!(denial.error_type(), "VALIDATION_ERROR");
}

#[test]
fn valid_json_roundtrips() {
    let raw = r#"{
        "command": "echo",
        "args": ["t1"],
        "session_id": "s",
        "turn_id": "t",
        "agent_id": "a",
        "source": "agent",
        "requested_mode": "permissive"
    }"#;
    let parsed = AgentProposal::from_json(raw).unwrap();
    let validated = prevalidate(&parsed).unwrap();
    assert_eq!(validated.requested_mode, GateMode::Permissive);
}

#[test]
fn args_digest_never_exposes_plaintext() {
    let args = vec!["secret-value".to_string()];
    let digest = args_digest(&args);
    assert_eq!(digest.len(), 64);
    assert!(!digest.contains("secret"));
    // Deterministic for identical vectors.
    assert_eq!(digest, args_digest(&["secret-value".to_string()]));
}

// =============================================================================
// Gate flow
// =============================================================================

struct GateFixture {
    _dir: TempDir,
    config: GateConfig,
    store: MemoryTokenStore,
    registry: TokenRegistry,
    kernel: ExecutionKernel,
    audit_dir: PathBuf,
}

fn gate_fixture(policy: &str) -> GateFixture {
    let dir = TempDir::new().unwrap();
    let policy_path = dir.path().join("policy.yaml");
    std::fs::write(&policy_path, policy).unwrap();
    let audit_dir = dir.path().join("audit");
    GateFixture {
        config: GateConfig::new(policy_path),
        store: MemoryTokenStore::new(),
        registry: TokenRegistry::open(&audit_dir),
        kernel: ExecutionKernel::new(EnvironmentProfile::Minimal),
        audit_dir,
        _dir: dir,
    }
}

const TRUE_POLICY: &str = "default: DENY\nrules:\n  - command: 'true'\n";

#[tokio::test]
async fn allowed_proposal_executes_end_to_end() {
    let mut fix = gate_fixture(TRUE_POLICY);
    let outcome = gate(
        &proposal("true", &[]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;

    assert_eq!(outcome.decision, PipelineDecision::Allow);
    assert!(outcome.executed);
    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.token_id.is_some());
}

#[tokio::test]
async fn rejected_proposal_never_reaches_policy_or_kernel() {
    let mut fix = gate_fixture(TRUE_POLICY);
    let outcome = gate(
        &proposal("true; rm -rf /", &[]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;

    assert_eq!(outcome.decision, PipelineDecision::Stop);
    assert_eq!(outcome.error_type.as_deref(), Some("SHELL_STRING_REJECTED"));
    assert!(!outcome.executed);

    // The rejection was audited with hashed args only.
    let log = std::fs::read_to_string(fix.audit_dir.join(AUDIT_LOG_FILE)).unwrap();
    assert!(log.contains("SHELL_STRING_REJECTED"));
    assert!(log.contains("args_sha256="));
}

#[tokio::test]
async fn policy_miss_stops_under_strict() {
    let mut fix = gate_fixture(TRUE_POLICY);
    let outcome = gate(
        &proposal("rm", &["-rf", "/"]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;

    assert_eq!(outcome.decision, PipelineDecision::Stop);
    assert!(outcome.token_id.is_none());
    assert!(!outcome.executed);
}

#[tokio::test]
async fn hold_token_is_returned_not_executed() {
    let mut fix = gate_fixture(TRUE_POLICY);
    fix.config.gate_mode = GateMode::Permissive;

    let outcome = gate(
        &proposal("rm", &["-rf", "/"]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;

    assert_eq!(outcome.decision, PipelineDecision::Hold);
    assert!(outcome.token_id.is_some());
    assert!(!outcome.executed);
    assert_eq!(outcome.exit_code, None);
}

#[tokio::test]
async fn stored_token_short_circuits_the_pipeline() {
    let mut fix = gate_fixture(TRUE_POLICY);

    // A prior attempt produced an ALLOW token that a human then stored.
    let first = gate(
        &proposal("true", &[]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;
    assert!(first.executed);

    // Issue a second token for the same proposal and store it as the
    // human-approved grant.
    let mut request = AuthorityRequest::new(
        "true",
        Vec::new(),
        fix.config.policy_path.clone(),
    );
    request.gate_mode = GateMode::Strict;
    let approved = authorize(&request, &fix.registry).token.unwrap();
    fix.store
        .store(&approved.proposal_hash, approved.clone());

    let outcome = gate(
        &proposal("true", &[]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;

    assert!(outcome.executed);
    assert_eq!(outcome.token_id, Some(approved.token_id));
    assert_eq!(outcome.reason, "human-approved token consumed");
    // Consumed: the stored grant is single-use.
    assert!(!fix.store.has(&approved.proposal_hash));
}

#[tokio::test]
async fn stored_token_still_passes_through_kernel_verification() {
    let mut fix = gate_fixture(TRUE_POLICY);

    let request = AuthorityRequest::new("true", Vec::new(), fix.config.policy_path.clone());
    let mut approved = authorize(&request, &fix.registry).token.unwrap();
    let proposal_hash = approved.proposal_hash.clone();
    // A tampered stored token must be caught by the kernel.
    approved.environment_fingerprint = "0".repeat(64);
    fix.store.store(&proposal_hash, approved);

    let outcome = gate(
        &proposal("true", &[]),
        &fix.config,
        &mut fix.store,
        &mut fix.registry,
        &fix.kernel,
    )
    .await;

    assert_eq!(outcome.decision, PipelineDecision::Stop);
    assert_eq!(
        outcome.error_type.as_deref(),
        Some("ENV_FINGERPRINT_MISMATCH")
    );
    assert!(!outcome.executed);
}
