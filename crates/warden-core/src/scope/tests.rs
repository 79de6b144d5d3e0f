//! Tests for the scope ladder and token store.

use chrono::{Duration, Utc};

use super::*;
use crate::ident::{AuditRef, TokenId};
use crate::token::{Decision, ScopeConstraints, TokenScope};

fn token_expiring_in(secs: i64) -> VerifiedToken {
    let issued_at = Utc::now();
    VerifiedToken {
        token_id: TokenId::generate(),
        audit_ref: AuditRef::generate(),
        proposal_hash: "p".repeat(64),
        policy_hash: "q".repeat(64),
        environment_fingerprint: "e".repeat(64),
        decision: Decision::Allow,
        issued_at,
        expires_at: issued_at + Duration::seconds(secs),
        scope: TokenScope {
            action: "execute".to_string(),
            resource: "echo".to_string(),
            constraints: ScopeConstraints {
                policy_version: "q".repeat(64),
                gate_mode: "STRICT".to_string(),
                guard_version: "warden/test".to_string(),
                audited_permit: None,
            },
        },
        gate_mode: GateMode::Strict,
        issuer_signature: "00".repeat(64),
        public_key_hex: "11".repeat(32),
    }
}

#[test]
fn safe_auto_issues_in_both_modes() {
    assert_eq!(enforce(ScopeClass::Safe, GateMode::Strict), ScopeDecision::AutoIssue);
    assert_eq!(
        enforce(ScopeClass::Safe, GateMode::Permissive),
        ScopeDecision::AutoIssue
    );
}

#[test]
fn net_and_fs_require_approval() {
    for scope in [ScopeClass::Net, ScopeClass::Fs] {
        for mode in [GateMode::Strict, GateMode::Permissive] {
            assert_eq!(enforce(scope, mode), ScopeDecision::NeedsApproval);
        }
    }
}

#[test]
fn admin_is_blocked_under_strict() {
    assert_eq!(enforce(ScopeClass::Admin, GateMode::Strict), ScopeDecision::Blocked);
    assert_eq!(
        enforce(ScopeClass::Admin, GateMode::Permissive),
        ScopeDecision::NeedsApproval
    );
}

#[test]
fn scope_parses_from_policy_strings() {
    assert_eq!(
        serde_yaml::from_str::<ScopeClass>("net").unwrap(),
        ScopeClass::Net
    );
    assert_eq!(
        serde_yaml::from_str::<ScopeClass>("admin").unwrap(),
        ScopeClass::Admin
    );
    assert!(serde_yaml::from_str::<ScopeClass>("root").is_err());
}

#[test]
fn store_roundtrip() {
    let mut store = MemoryTokenStore::new();
    let token = token_expiring_in(300);
    let hash = token.proposal_hash.clone();

    assert!(!store.has(&hash));
    store.store(&hash, token.clone());
    assert!(store.has(&hash));
    assert_eq!(store.retrieve(&hash).unwrap().token_id, token.token_id);

    store.delete(&hash);
    assert!(store.retrieve(&hash).is_none());
}

#[test]
fn expired_tokens_are_purged_on_retrieval() {
    let mut store = MemoryTokenStore::new();
    let token = token_expiring_in(-10);
    let hash = token.proposal_hash.clone();

    store.store(&hash, token);
    assert_eq!(store.len(), 1);
    assert!(store.retrieve(&hash).is_none());
    assert!(store.is_empty());
}

#[test]
fn store_replaces_prior_entry() {
    let mut store = MemoryTokenStore::new();
    let first = token_expiring_in(300);
    let second = token_expiring_in(300);
    let hash = "h".repeat(64);

    store.store(&hash, first);
    store.store(&hash, second.clone());
    assert_eq!(store.retrieve(&hash).unwrap().token_id, second.token_id);
    assert_eq!(store.len(), 1);
}
