//! Structural policy diagnostics.
//!
//! Lint findings are informational only and never affect evaluation; they
//! exist so an operator can notice rules that can never fire before the
//! gate runs in anger.

use super::engine::WILDCARD;
use super::schema::{PolicyDocument, PolicyRule};

/// One structural finding about a policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyWarning {
    /// Zero-based index of the rule the finding is about.
    pub rule_index: usize,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule {}: {}", self.rule_index, self.message)
    }
}

/// Reports rules with empty command strings and rules fully shadowed by an
/// earlier rule.
#[must_use]
pub fn lint(document: &PolicyDocument) -> Vec<PolicyWarning> {
    let mut warnings = Vec::new();

    for (index, rule) in document.rules.iter().enumerate() {
        if rule.command.trim().is_empty() {
            warnings.push(PolicyWarning {
                rule_index: index,
                message: "empty command can never match".to_string(),
            });
            continue;
        }

        if let Some(earlier_index) = document.rules[..index]
            .iter()
            .position(|earlier| covers(earlier, rule))
        {
            warnings.push(PolicyWarning {
                rule_index: index,
                message: format!(
                    "shadowed by rule {earlier_index}: every request it matches is already \
                     matched earlier"
                ),
            });
        }
    }

    warnings
}

/// True when every request `later` could match is already matched by
/// `earlier`.
fn covers(earlier: &PolicyRule, later: &PolicyRule) -> bool {
    if earlier.command != later.command {
        return false;
    }

    if matches_any_argv(earlier.args.as_deref()) {
        return true;
    }

    // `earlier` is a fixed-shape pattern. It covers `later` only when
    // `later` is also fixed-shape, lengths agree, and each position is
    // either equal or wildcarded in `earlier`.
    if matches_any_argv(later.args.as_deref()) {
        return false;
    }

    match (earlier.args.as_deref(), later.args.as_deref()) {
        (Some(e), Some(l)) => {
            e.len() == l.len()
                && e.iter()
                    .zip(l)
                    .all(|(ep, lp)| ep == WILDCARD || (lp != WILDCARD && ep == lp))
        },
        _ => false,
    }
}

fn matches_any_argv(args: Option<&[String]>) -> bool {
    match args {
        None => true,
        Some([w]) => w == WILDCARD,
        Some(_) => false,
    }
}
