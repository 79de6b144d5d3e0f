//! Subcommand implementations.

pub mod eval;
pub mod policy;
pub mod propose;
pub mod run;

use serde_json::{Value, json};
use warden_core::canonical;
use warden_core::token::GateMode;

/// The structured decision line printed to stdout, one per gated request.
///
/// Keys are emitted in canonical (sorted) order so downstream tooling can
/// rely on a stable layout.
pub(crate) struct DecisionLine<'a> {
    pub decision: &'a str,
    pub proposal_hash: &'a str,
    pub token_id: Option<&'a str>,
    pub policy_hash: &'a str,
    pub environment_fingerprint: &'a str,
    pub reason: &'a str,
    pub executed: bool,
    pub gate_mode: GateMode,
    pub error_type: Option<&'a str>,
}

impl DecisionLine<'_> {
    pub(crate) fn render(&self) -> Option<String> {
        let tree = json!({
            "decision": self.decision,
            "proposal_hash": self.proposal_hash,
            "token_id": self.token_id.map_or(Value::Null, |t| Value::String(t.to_string())),
            "policy_hash": self.policy_hash,
            "environment_fingerprint": self.environment_fingerprint,
            "reason": self.reason,
            "executed": self.executed,
            "gate_mode": self.gate_mode.as_str(),
            "error_type": self.error_type.map_or(Value::Null, |e| Value::String(e.to_string())),
        });

        match canonical::value_to_canonical_bytes(&tree) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::error!(error = %e, "decision line serialization failed");
                None
            },
        }
    }

    pub(crate) fn print(&self) {
        if let Some(line) = self.render() {
            println!("{line}");
        }
    }
}

/// Maps a profile flag to a fingerprint profile. Unknown values fall back
/// to the minimal profile rather than widening the field set.
pub(crate) fn parse_profile(value: &str) -> warden_core::EnvironmentProfile {
    match value.trim().to_ascii_lowercase().as_str() {
        "extended" => warden_core::EnvironmentProfile::Extended,
        _ => warden_core::EnvironmentProfile::Minimal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line<'a>(token_id: Option<&'a str>, error_type: Option<&'a str>) -> DecisionLine<'a> {
        DecisionLine {
            decision: "STOP",
            proposal_hash: "ph",
            token_id,
            policy_hash: "qh",
            environment_fingerprint: "ef",
            reason: "no rule matched",
            executed: false,
            gate_mode: GateMode::Strict,
            error_type,
        }
    }

    #[test]
    fn decision_line_keys_are_sorted() {
        let rendered = line(None, None).render().unwrap();
        assert!(rendered.starts_with("{\"decision\":"));

        let positions: Vec<usize> = [
            "\"decision\"",
            "\"environment_fingerprint\"",
            "\"error_type\"",
            "\"executed\"",
            "\"gate_mode\"",
            "\"policy_hash\"",
            "\"proposal_hash\"",
            "\"reason\"",
            "\"token_id\"",
        ]
        .iter()
        .map(|key| rendered.find(key).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(rendered.contains("\"token_id\":null"));
        assert!(rendered.contains("\"error_type\":null"));
    }

    #[test]
    fn decision_line_is_single_line_json() {
        let rendered = line(Some("tok-1"), Some("TOKEN_EXPIRED")).render().unwrap();
        assert!(!rendered.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["token_id"], "tok-1");
        assert_eq!(parsed["error_type"], "TOKEN_EXPIRED");
        assert_eq!(parsed["gate_mode"], "STRICT");
    }

    #[test]
    fn unknown_profile_falls_back_to_minimal() {
        assert_eq!(
            parse_profile("extended"),
            warden_core::EnvironmentProfile::Extended
        );
        assert_eq!(
            parse_profile("everything"),
            warden_core::EnvironmentProfile::Minimal
        );
    }
}
