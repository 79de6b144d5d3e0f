//! Time-ordered identifiers for tokens and audit references.
//!
//! Identifiers are UUIDv7: a leading millisecond-resolution timestamp, the
//! version nibble, the variant pair, and cryptographically random
//! remainder. Within the same process, identifiers sort lexicographically
//! by creation time at millisecond resolution, which keeps audit streams
//! naturally ordered.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of an issued authority token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

/// Unique reference tying audit records for one authorization attempt
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRef(String);

impl TokenId {
    /// Generates a fresh time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AuditRef {
    /// Generates a fresh time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AuditRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TokenId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<String> for AuditRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn token_ids_are_unique() {
        let a = TokenId::generate();
        let b = TokenId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn token_ids_order_by_creation_time() {
        let earlier = TokenId::generate();
        // UUIDv7 timestamps are millisecond resolution; step past one tick.
        thread::sleep(Duration::from_millis(2));
        let later = TokenId::generate();
        assert!(earlier < later);
    }

    #[test]
    fn audit_refs_order_by_creation_time() {
        let earlier = AuditRef::generate();
        thread::sleep(Duration::from_millis(2));
        let later = AuditRef::generate();
        assert!(earlier < later);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TokenId::from("0190b5a1-0000-7000-8000-000000000000".to_string());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""0190b5a1-0000-7000-8000-000000000000""#);
    }
}
