//! `warden policy lint`: load a policy and report structural findings.

use std::path::Path;

use warden_core::policy::{PolicyDocument, lint};

/// Lints the policy file. Returns `0` when the document loads (findings
/// are informational), `1` when it cannot load at all.
pub fn lint_policy(policy_path: &Path) -> i32 {
    let document = match PolicyDocument::load(policy_path) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("policy does not load (the gate will fail closed): {e}");
            return 1;
        },
    };

    let warnings = lint(&document);
    if warnings.is_empty() {
        println!(
            "ok: {} rule(s), default {}",
            document.rules.len(),
            document.default
        );
    } else {
        for warning in &warnings {
            println!("warning: {warning}");
        }
        println!(
            "{} finding(s) in {} rule(s)",
            warnings.len(),
            document.rules.len()
        );
    }

    0
}
