//! Policy loading, content hashing, and deny-by-default evaluation.
//!
//! The policy is a declarative YAML document: a `default` decision plus an
//! ordered rule list. Evaluation walks the rules in order and the first
//! match wins; no match falls back to the document default. Loading is
//! fail-closed: any failure (missing file, parse error, malformed
//! `default`, non-sequence `rules`) yields a DENY verdict rather than an
//! error the caller could mishandle.
//!
//! # Security Properties
//!
//! - **Default-deny**: unmatched requests receive the document default,
//!   and a broken document always denies.
//! - **Deterministic**: same policy bytes + same request always produce the
//!   same verdict.
//! - **No interpretation**: commands are matched by byte equality; the
//!   evaluator never decomposes pipes, expands globs, or substitutes
//!   variables.

mod engine;
mod hash;
mod lint;
mod schema;


pub use engine::{
    FAIL_CLOSED_REASON, NO_RULE_MATCHED_REASON, Verdict, WILDCARD, evaluate, evaluate_document,
};
pub use hash::{POLICY_NOT_FOUND, POLICY_READ_ERROR, hash_policy_file};
pub use lint::{PolicyWarning, lint};
pub use schema::{PolicyDecision, PolicyDocument, PolicyError, PolicyRule};
