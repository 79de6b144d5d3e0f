//! Policy document schema and fail-closed loader.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::ScopeClass;

/// Errors that can occur while loading a policy document.
///
/// Callers on the evaluation path never see these: the evaluator absorbs
/// them into a DENY verdict. They surface only through explicit loading
/// (e.g. the `policy lint` surface).
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("failed to read policy file '{path}': {source}")]
    Io {
        /// The path that failed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The policy file is not a valid policy document.
    #[error("failed to parse policy file '{path}': {source}")]
    Parse {
        /// The path that failed.
        path: String,
        /// The underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// The decision a policy evaluation can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    /// The request matched an allowing rule (or the document default).
    #[serde(rename = "ALLOW", alias = "allow")]
    Allow,
    /// The request is denied.
    #[serde(rename = "DENY", alias = "deny")]
    Deny,
}

impl PolicyDecision {
    /// Stable uppercase name used in records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        }
    }
}

impl std::fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered rule of a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    /// Bare executable name, matched by byte equality.
    pub command: String,

    /// Argument constraint.
    ///
    /// Absent means any argument vector. `["*"]` also matches any vector.
    /// Any other array requires positional equality, with `*` matching any
    /// single argument at its position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Blast-radius scope of commands this rule admits.
    #[serde(default)]
    pub scope: ScopeClass,

    /// Informational description; never affects matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A loaded policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    /// Decision applied when no rule matches.
    pub default: PolicyDecision,

    /// Ordered rule list; earlier rules mask later ones.
    pub rules: Vec<PolicyRule>,
}

impl PolicyDocument {
    /// Loads and parses a policy document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] on read or parse failure. The evaluation
    /// path converts any such error into a fail-closed DENY.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| PolicyError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
