//! `warden eval`: policy dry-run with no issuance and no execution.

use std::path::Path;

use serde_json::json;
use warden_core::canonical;
use warden_core::policy;

/// Evaluates the policy and prints the verdict. Returns `0` for ALLOW,
/// `1` for DENY.
pub fn execute(command: &str, args: &[String], policy_path: &Path) -> i32 {
    let verdict = policy::evaluate(command, args, policy_path);

    let tree = json!({
        "decision": verdict.decision.as_str(),
        "reason": verdict.reason,
        "scope": verdict.scope.as_str(),
        "matched_rule": verdict.matched_rule,
        "policy_hash": policy::hash_policy_file(policy_path),
    });
    match canonical::value_to_canonical_bytes(&tree) {
        Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
        Err(e) => tracing::error!(error = %e, "verdict serialization failed"),
    }

    i32::from(!verdict.is_allow())
}
