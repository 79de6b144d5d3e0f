//! Replay-prevention registry and append-only audit sinks.
//!
//! The registry is the at-most-once enforcement point: a token identifier
//! enters the in-memory used set *before* the kernel spawns, so a replayed
//! token is refused even if the spawn hangs or the process crashes
//! afterwards. Two append-only JSON Lines streams live alongside it:
//!
//! - `used_tokens.jsonl`: one record per consumed token;
//! - `log.jsonl`: one record per gate event (STOP, HOLD, issuance,
//!   kernel outcomes, pipeline errors).
//!
//! Persistence is best-effort. An I/O failure is logged and swallowed; the
//! in-memory set remains authoritative for the current process, and a
//! persistence failure never unblocks a replay. Hydration tolerates a
//! truncated final line and never rewrites disk.
//!
//! Replay keying: the set is keyed on `token_id` alone, so a *fresh* token
//! for an identical proposal within the same minute window is accepted.
//! The stricter `(proposal_hash, environment_fingerprint)` keying is a
//! deliberate non-choice, recorded in DESIGN.md.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ident::{AuditRef, TokenId};
use crate::token::TokenScope;


/// File name of the consumed-token stream.
pub const USED_TOKENS_FILE: &str = "used_tokens.jsonl";

/// File name of the event stream.
pub const AUDIT_LOG_FILE: &str = "log.jsonl";

/// One consumed-token record, persisted at `mark_used` time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedTokenRecord {
    /// The consumed token.
    pub token_id: TokenId,
    /// Consumption instant.
    pub used_at: DateTime<Utc>,
    /// Audit reference shared with the attempt's event records.
    pub audit_ref: AuditRef,
    /// Proposal binding of the consumed token.
    pub proposal_hash: String,
    /// Policy binding of the consumed token.
    pub policy_hash: String,
    /// Environment binding of the consumed token.
    pub env_fingerprint: String,
    /// The authorized command.
    pub command: String,
    /// Structured scope block of the consumed token.
    pub scope: TokenScope,
    /// Implementation identity of the issuing gate.
    pub guard_version: String,
    /// Token expiry, used to age records out of the in-memory set on
    /// hydration.
    pub expires_at: DateTime<Utc>,
}

/// One gate event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Decision or event tag (`STOP`, `HOLD`, `TOKEN_ISSUED_ALLOW`, ...).
    pub decision: String,
    /// Proposal hash of the attempt, when one was computed.
    pub proposal_hash: String,
    /// Token identifier, when a token exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
    /// Policy binding at event time.
    pub policy_hash: String,
    /// Environment binding at event time.
    pub environment_fingerprint: String,
    /// Human-readable reason.
    pub reason: String,
    /// Whether the spawn primitive was reached.
    pub executed: bool,
    /// Typed denial code, for refusals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Event instant.
    pub time: DateTime<Utc>,
}

/// In-memory used-token set plus append-only persistence.
#[derive(Debug)]
pub struct TokenRegistry {
    used: HashSet<String>,
    used_path: PathBuf,
    log_path: PathBuf,
}

impl TokenRegistry {
    /// Opens a registry rooted at `audit_dir`, hydrating the in-memory set
    /// from any prior `used_tokens.jsonl`.
    ///
    /// Hydration drops records whose `expires_at` has passed (they can no
    /// longer pass the kernel's TTL step) and ignores unparseable lines.
    /// Construction is total: directory or read failures degrade to an
    /// empty set with a warning, never to a panic or error.
    #[must_use]
    pub fn open(audit_dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(audit_dir) {
            tracing::warn!(dir = %audit_dir.display(), error = %e, "audit dir creation failed");
        }

        let used_path = audit_dir.join(USED_TOKENS_FILE);
        let log_path = audit_dir.join(AUDIT_LOG_FILE);
        let used = hydrate(&used_path, Utc::now());

        Self {
            used,
            used_path,
            log_path,
        }
    }

    /// True when the token identifier has already been consumed.
    #[must_use]
    pub fn is_used(&self, token_id: &TokenId) -> bool {
        self.used.contains(token_id.as_str())
    }

    /// Number of identifiers currently in the in-memory set.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Marks a token consumed: in-memory set first (cannot fail), then a
    /// best-effort durable record.
    ///
    /// Called before the spawn primitive for every successful
    /// verification; the ordering is what makes replay enforcement hold
    /// across spawn hangs and crashes.
    pub fn mark_used(&mut self, record: &UsedTokenRecord) {
        self.used.insert(record.token_id.as_str().to_string());
        append_line(&self.used_path, record);
    }

    /// Appends an event record to the log stream, best-effort.
    pub fn append_audit(&self, event: &AuditEvent) {
        append_line(&self.log_path, event);
    }
}

fn hydrate(used_path: &Path, now: DateTime<Utc>) -> HashSet<String> {
    let mut used = HashSet::new();

    let contents = match std::fs::read_to_string(used_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return used,
        Err(e) => {
            tracing::warn!(path = %used_path.display(), error = %e, "used-token hydration failed");
            return used;
        },
    };

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<UsedTokenRecord>(line) {
            Ok(record) => {
                if record.expires_at >= now {
                    used.insert(record.token_id.as_str().to_string());
                }
            },
            // A truncated or foreign line is skipped, not fatal: the
            // stream is append-only and a crash mid-write is expected.
            Err(e) => {
                tracing::debug!(path = %used_path.display(), error = %e, "skipping malformed line");
            },
        }
    }

    used
}

fn append_line<T: Serialize>(path: &Path, record: &T) {
    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "audit record serialization failed");
            return;
        },
    };

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));

    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "audit append failed");
    }
}
