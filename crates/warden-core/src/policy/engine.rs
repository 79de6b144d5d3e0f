//! Ordered first-match policy evaluation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::schema::{PolicyDecision, PolicyDocument, PolicyRule};
use crate::scope::ScopeClass;

/// Per-element wildcard sentinel in rule argument arrays.
pub const WILDCARD: &str = "*";

/// Reason attached to verdicts produced by a broken or missing policy.
pub const FAIL_CLOSED_REASON: &str = "no valid policy; fail-closed";

/// Reason attached to verdicts where no rule matched.
pub const NO_RULE_MATCHED_REASON: &str = "no rule matched";

/// The outcome of one policy evaluation.
///
/// Evaluation is total: every input produces a verdict, and every failure
/// mode folds into a DENY.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// ALLOW or DENY.
    pub decision: PolicyDecision,
    /// Human-readable reason, stable for the fail-closed and no-match
    /// cases.
    pub reason: String,
    /// Scope of the matched rule; `safe` when no rule matched.
    pub scope: ScopeClass,
    /// Zero-based index of the matched rule, if any.
    pub matched_rule: Option<usize>,
}

impl Verdict {
    /// True when the verdict allows execution.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.decision == PolicyDecision::Allow
    }

    fn fail_closed() -> Self {
        Self {
            decision: PolicyDecision::Deny,
            reason: FAIL_CLOSED_REASON.to_string(),
            scope: ScopeClass::Safe,
            matched_rule: None,
        }
    }
}

/// Evaluates a command request against the policy at `policy_path`.
///
/// Total: any load failure yields a fail-closed DENY verdict rather than
/// an error.
#[must_use]
pub fn evaluate(command: &str, args: &[String], policy_path: &Path) -> Verdict {
    match PolicyDocument::load(policy_path) {
        Ok(document) => evaluate_document(&document, command, args),
        Err(error) => {
            tracing::warn!(policy = %policy_path.display(), %error, "policy load failed; denying");
            Verdict::fail_closed()
        },
    }
}

/// Evaluates a command request against an already-loaded document.
///
/// Rules are walked in order; the first match wins and its scope is
/// recorded. No match returns the document default with a stable reason.
#[must_use]
pub fn evaluate_document(document: &PolicyDocument, command: &str, args: &[String]) -> Verdict {
    for (index, rule) in document.rules.iter().enumerate() {
        if rule_matches(rule, command, args) {
            return Verdict {
                decision: PolicyDecision::Allow,
                reason: format!("rule {index} matched"),
                scope: rule.scope,
                matched_rule: Some(index),
            };
        }
    }

    Verdict {
        decision: document.default,
        reason: NO_RULE_MATCHED_REASON.to_string(),
        scope: ScopeClass::Safe,
        matched_rule: None,
    }
}

/// A rule matches when commands are byte-equal and the argument constraint
/// is satisfied.
fn rule_matches(rule: &PolicyRule, command: &str, args: &[String]) -> bool {
    if rule.command != command {
        return false;
    }

    match rule.args.as_deref() {
        // No constraint: any argument vector.
        None => true,
        // Single-element wildcard: any argument vector.
        Some([w]) if w == WILDCARD => true,
        // Positional equality with per-element wildcard.
        Some(pattern) => {
            pattern.len() == args.len()
                && pattern
                    .iter()
                    .zip(args)
                    .all(|(p, a)| p == WILDCARD || p == a)
        },
    }
}
