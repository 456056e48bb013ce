use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::credentials::tokens_match;

/// Token currently bound to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Opaque token handed to the participant.
    pub token: String,
    /// Unix milliseconds of issuance; expiry is measured from here.
    pub created_at: i64,
}

/// At most one session token per participant, keyed by lower-cased name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRegistry {
    tokens: IndexMap<String, SessionRecord>,
}

impl SessionRegistry {
    /// Bind `token` to `name`, replacing any previous token.
    pub fn insert(&mut self, name: &str, token: String, now: i64) {
        self.tokens.insert(
            fold(name),
            SessionRecord {
                token,
                created_at: now,
            },
        );
    }

    /// Whether `token` is the live token for `name` at `now`.
    ///
    /// A token is live while `now - created_at <= ttl_ms`.
    pub fn validate(&self, name: &str, token: &str, now: i64, ttl_ms: i64) -> bool {
        self.tokens.get(&fold(name)).is_some_and(|record| {
            tokens_match(token, &record.token) && !is_expired(record, now, ttl_ms)
        })
    }

    /// Drop the token bound to `name`. Returns whether one existed.
    pub fn revoke(&mut self, name: &str) -> bool {
        self.tokens.shift_remove(&fold(name)).is_some()
    }

    /// Remove every expired token, returning how many were dropped.
    pub fn purge_expired(&mut self, now: i64, ttl_ms: i64) -> usize {
        let before = self.tokens.len();
        self.tokens
            .retain(|_, record| !is_expired(record, now, ttl_ms));
        before - self.tokens.len()
    }

    /// Stored record for `name`, expired or not.
    pub fn get(&self, name: &str) -> Option<&SessionRecord> {
        self.tokens.get(&fold(name))
    }

    /// Number of stored tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is stored.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_expired(record: &SessionRecord, now: i64, ttl_ms: i64) -> bool {
    now.saturating_sub(record.created_at) > ttl_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;
    const TTL: i64 = 6 * 60 * 60 * 1000;

    #[test]
    fn lookup_is_case_insensitive_and_token_exact() {
        let mut sessions = SessionRegistry::default();
        sessions.insert("Alice", "tok-1".into(), T0);

        assert!(sessions.validate("alice", "tok-1", T0, TTL));
        assert!(sessions.validate(" ALICE ", "tok-1", T0, TTL));
        assert!(!sessions.validate("alice", "TOK-1", T0, TTL));
        assert!(!sessions.validate("alice", "tok-", T0, TTL));
        assert!(!sessions.validate("alice", "tok-12", T0, TTL));
        assert!(!sessions.validate("alice", "", T0, TTL));
        assert!(!sessions.validate("bob", "tok-1", T0, TTL));
    }

    #[test]
    fn expiry_boundary() {
        let mut sessions = SessionRegistry::default();
        sessions.insert("alice", "tok".into(), T0);

        assert!(sessions.validate("alice", "tok", T0 + TTL - 1, TTL));
        assert!(!sessions.validate("alice", "tok", T0 + TTL + 1, TTL));
    }

    #[test]
    fn new_token_replaces_previous() {
        let mut sessions = SessionRegistry::default();
        sessions.insert("alice", "old".into(), T0);
        sessions.insert("Alice", "new".into(), T0 + 10);

        assert_eq!(sessions.len(), 1);
        assert!(!sessions.validate("alice", "old", T0 + 10, TTL));
        assert!(sessions.validate("alice", "new", T0 + 10, TTL));
        assert_eq!(sessions.get("ALICE").map(|r| r.created_at), Some(T0 + 10));
    }

    #[test]
    fn revoke_and_purge() {
        let mut sessions = SessionRegistry::default();
        sessions.insert("alice", "a".into(), T0);
        sessions.insert("bob", "b".into(), T0 + TTL);

        assert_eq!(sessions.purge_expired(T0 + TTL + 1, TTL), 1);
        assert!(sessions.get("alice").is_none());
        assert!(sessions.revoke("Bob"));
        assert!(!sessions.revoke("bob"));
        assert!(sessions.is_empty());
    }
}
