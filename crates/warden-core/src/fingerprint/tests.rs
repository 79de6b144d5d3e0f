//! Tests for environment fingerprinting.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::*;

fn fixture_policy(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("policy.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"default: DENY\nrules:\n  - command: echo\n")
        .unwrap();
    path
}

fn base_identity() -> HostIdentity {
    HostIdentity {
        host_os: "linux".to_string(),
        host_arch: "x86_64".to_string(),
        runtime_version: RUNTIME_VERSION.to_string(),
        policy_hash: "a".repeat(64),
        guard_version: None,
        workflow: None,
        run_id: None,
        commit: None,
    }
}

#[test]
fn fingerprint_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = fixture_policy(&dir);

    let first = environment_fingerprint(&path, EnvironmentProfile::Minimal).unwrap();
    let second = environment_fingerprint(&path, EnvironmentProfile::Minimal).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
}

#[test]
fn every_minimal_field_is_load_bearing() {
    let base = base_identity();
    let base_fp = base.fingerprint().unwrap();

    let mutations: Vec<HostIdentity> = vec![
        HostIdentity {
            host_os: "darwin".to_string(),
            ..base.clone()
        },
        HostIdentity {
            host_arch: "aarch64".to_string(),
            ..base.clone()
        },
        HostIdentity {
            runtime_version: "rust-0.0".to_string(),
            ..base.clone()
        },
        HostIdentity {
            policy_hash: "b".repeat(64),
            ..base.clone()
        },
    ];

    for mutated in mutations {
        assert_ne!(
            mutated.fingerprint().unwrap(),
            base_fp,
            "mutation of {mutated:?} must change the fingerprint"
        );
    }
}

#[test]
fn every_extended_field_is_load_bearing() {
    let extended = HostIdentity {
        guard_version: Some("warden/0.1.0".to_string()),
        workflow: Some("ci".to_string()),
        run_id: Some("12345".to_string()),
        commit: Some("deadbeef".to_string()),
        ..base_identity()
    };
    let base_fp = extended.fingerprint().unwrap();

    let mutations: Vec<HostIdentity> = vec![
        HostIdentity {
            guard_version: Some("warden/9.9.9".to_string()),
            ..extended.clone()
        },
        HostIdentity {
            workflow: Some("release".to_string()),
            ..extended.clone()
        },
        HostIdentity {
            run_id: Some("12346".to_string()),
            ..extended.clone()
        },
        HostIdentity {
            commit: Some("cafef00d".to_string()),
            ..extended.clone()
        },
        HostIdentity {
            workflow: None,
            ..extended.clone()
        },
    ];

    for mutated in mutations {
        assert_ne!(mutated.fingerprint().unwrap(), base_fp);
    }
}

#[test]
fn policy_content_binds_into_the_fingerprint() {
    let dir = TempDir::new().unwrap();
    let path = fixture_policy(&dir);

    let before = environment_fingerprint(&path, EnvironmentProfile::Minimal).unwrap();
    std::fs::write(&path, "default: ALLOW\nrules: []\n").unwrap();
    let after = environment_fingerprint(&path, EnvironmentProfile::Minimal).unwrap();

    assert_ne!(before, after);
}

#[test]
fn missing_policy_still_fingerprints_deterministically() {
    let path = Path::new("/nonexistent/policy.yaml");
    let first = environment_fingerprint(path, EnvironmentProfile::Minimal).unwrap();
    let second = environment_fingerprint(path, EnvironmentProfile::Minimal).unwrap();
    assert_eq!(first, second);
}

#[test]
fn profiles_produce_distinct_fingerprints() {
    let dir = TempDir::new().unwrap();
    let path = fixture_policy(&dir);

    let minimal = environment_fingerprint(&path, EnvironmentProfile::Minimal).unwrap();
    let extended = environment_fingerprint(&path, EnvironmentProfile::Extended).unwrap();
    assert_ne!(minimal, extended);
}

#[test]
fn minimal_capture_omits_extended_fields() {
    let dir = TempDir::new().unwrap();
    let path = fixture_policy(&dir);

    let identity = HostIdentity::capture(&path, EnvironmentProfile::Minimal);
    assert!(identity.guard_version.is_none());
    assert!(identity.workflow.is_none());

    let json = serde_json::to_string(&identity).unwrap();
    assert!(!json.contains("guard_version"));
}
