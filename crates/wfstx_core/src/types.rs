//! Core type definitions for wfstx.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque credential returned to the client that acquired a lock.
///
/// Presenting the token is the only way to mutate or release the features
/// it covers. Tokens carry no embedded meaning.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps a client-presented lock id.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that a client-presented lock id could be a token at all.
    ///
    /// Well-formed ids are non-empty and contain no whitespace.
    #[must_use]
    pub fn is_well_formed(lock_id: &str) -> bool {
        !lock_id.is_empty() && !lock_id.chars().any(char::is_whitespace)
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockToken({})", self.0)
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// All-or-nothing versus best-effort semantics, for both lock
/// acquisition (`lockAction`) and post-transaction release
/// (`releaseAction`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AllSome {
    /// Every feature or nothing.
    #[default]
    All,
    /// As many features as possible.
    Some,
}

impl fmt::Display for AllSome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllSome::All => f.write_str("ALL"),
            AllSome::Some => f.write_str("SOME"),
        }
    }
}

/// How an inserted feature's identifier is assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdGeneration {
    /// Ignore any caller id; the store assigns a new one.
    #[default]
    GenerateNew,
    /// Insert under the caller id; fail if it already exists.
    UseExisting,
    /// Insert under the caller id; overwrite the feature if it exists.
    ReplaceDuplicate,
}

/// Whether a query returns features or only their count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Return matching features.
    #[default]
    Results,
    /// Return only the number of matching features.
    Hits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_and_well_formed() {
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert_ne!(a, b);
        assert!(LockToken::is_well_formed(a.as_str()));
    }

    #[test]
    fn malformed_lock_ids() {
        assert!(!LockToken::is_well_formed(""));
        assert!(!LockToken::is_well_formed("abc def"));
        assert!(LockToken::is_well_formed("abc-def"));
    }

    #[test]
    fn enum_defaults() {
        assert_eq!(AllSome::default(), AllSome::All);
        assert_eq!(IdGeneration::default(), IdGeneration::GenerateNew);
        assert_eq!(ResultType::default(), ResultType::Results);
    }

    #[test]
    fn all_some_wire_names() {
        assert_eq!(serde_json::to_string(&AllSome::Some).unwrap(), "\"SOME\"");
        assert_eq!(AllSome::All.to_string(), "ALL");
    }
}
