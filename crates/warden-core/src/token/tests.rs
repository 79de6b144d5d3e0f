//! Tests for the token model.

use chrono::{Duration, Utc};

use super::*;

fn sample_token() -> VerifiedToken {
    let issued_at = Utc::now();
    VerifiedToken {
        token_id: TokenId::generate(),
        audit_ref: AuditRef::generate(),
        proposal_hash: "p".repeat(64),
        policy_hash: "q".repeat(64),
        environment_fingerprint: "e".repeat(64),
        decision: Decision::Allow,
        issued_at,
        expires_at: issued_at + Duration::seconds(DEFAULT_TTL_SECS),
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
fn signing_payload_excludes_signature_and_key() {
    let token = sample_token();
    let payload = String::from_utf8(token.signing_payload().unwrap()).unwrap();
    assert!(!payload.contains("issuer_signature"));
    assert!(!payload.contains("public_key_hex"));
    assert!(payload.contains("proposal_hash"));
    assert!(payload.contains("expires_at"));
}

#[test]
fn signing_payload_is_insensitive_to_signature_fields() {
    let token = sample_token();
    let mut resigned = token.clone();
    resigned.issuer_signature = "ff".repeat(64);
    resigned.public_key_hex = "22".repeat(32);
    assert_eq!(
        token.signing_payload().unwrap(),
        resigned.signing_payload().unwrap()
    );
}

#[test]
fn signing_payload_changes_with_any_signed_field() {
    let token = sample_token();
    let mut mutated = token.clone();
    mutated.expires_at = mutated.expires_at + Duration::seconds(3600);
    assert_ne!(
        token.signing_payload().unwrap(),
        mutated.signing_payload().unwrap()
    );
}

#[test]
fn expiry_is_inclusive_of_the_boundary() {
    let token = sample_token();
    assert!(!token.is_expired(token.expires_at));
    assert!(token.is_expired(token.expires_at + Duration::seconds(1)));
}

#[test]
fn gate_mode_coerces_unknown_to_strict() {
    assert_eq!(GateMode::parse_lenient("PERMISSIVE"), GateMode::Permissive);
    assert_eq!(GateMode::parse_lenient("permissive"), GateMode::Permissive);
    assert_eq!(GateMode::parse_lenient("STRICT"), GateMode::Strict);
    assert_eq!(GateMode::parse_lenient("yolo"), GateMode::Strict);
    assert_eq!(GateMode::parse_lenient(""), GateMode::Strict);
}

#[test]
fn decisions_serialize_uppercase() {
    assert_eq!(serde_json::to_string(&Decision::Allow).unwrap(), r#""ALLOW""#);
    assert_eq!(serde_json::to_string(&Decision::Hold).unwrap(), r#""HOLD""#);
    assert_eq!(
        serde_json::to_string(&GateMode::Permissive).unwrap(),
        r#""PERMISSIVE""#
    );
}

#[test]
fn audited_permit_flag_roundtrips() {
    let mut token = sample_token();
    assert!(!token.is_audited_permit());
    token.scope.constraints.audited_permit = Some(true);
    assert!(token.is_audited_permit());

    let json = serde_json::to_string(&sample_token()).unwrap();
    assert!(!json.contains("audited_permit"));
}
