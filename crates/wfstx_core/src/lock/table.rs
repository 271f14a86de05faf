//! Lock table: the registry of live feature locks.
//!
//! The table itself is plain data. Synchronization and policy live in
//! [`super::LockManager`], which holds the table behind one `RwLock`.

use crate::types::LockToken;
use crate::FeatureId;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// One currently-locked feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// The locked feature.
    pub feature_id: FeatureId,
    /// The token that holds the lock.
    pub token: LockToken,
    /// When the lock lapses.
    pub expires_at: Instant,
}

impl LockRecord {
    /// Returns true if the lock is still in force at `now`.
    #[must_use]
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Bookkeeping for one issued token.
#[derive(Debug, Clone)]
pub(crate) struct TokenEntry {
    /// Features currently locked under this token.
    pub features: BTreeSet<FeatureId>,
    /// Expiry the client asked for, if any. Only explicit expiries are
    /// renewed on a partial release.
    pub original_ttl: Option<Duration>,
    /// Lifetime actually applied.
    pub ttl: Duration,
    /// When the token and its locks lapse.
    pub expires_at: Instant,
}

/// Feature id -> lock record, plus token -> locked features.
///
/// Invariants:
/// - a feature id maps to at most one record
/// - every record's token has an entry listing that feature
/// - a record's `expires_at` equals its token entry's `expires_at`
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    records: HashMap<FeatureId, LockRecord>,
    tokens: HashMap<LockToken, TokenEntry>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, feature_id: &FeatureId) -> Option<&LockRecord> {
        self.records.get(feature_id)
    }

    pub fn token(&self, token: &LockToken) -> Option<&TokenEntry> {
        self.tokens.get(token)
    }

    /// Returns the holder of a live lock on `feature_id`.
    pub fn live_holder(&self, feature_id: &FeatureId, now: Instant) -> Option<&LockToken> {
        self.records
            .get(feature_id)
            .filter(|record| record.is_live(now))
            .map(|record| &record.token)
    }

    /// Registers a new token with no features.
    pub fn open_token(
        &mut self,
        token: LockToken,
        ttl: Duration,
        original_ttl: Option<Duration>,
        now: Instant,
    ) {
        self.tokens.insert(
            token,
            TokenEntry {
                features: BTreeSet::new(),
                original_ttl,
                ttl,
                expires_at: now + ttl,
            },
        );
    }

    /// Locks a feature under an already opened token.
    ///
    /// The caller guarantees the feature has no live record.
    pub fn lock(&mut self, token: &LockToken, feature_id: FeatureId) {
        let Some(entry) = self.tokens.get_mut(token) else {
            return;
        };
        entry.features.insert(feature_id.clone());
        let record = LockRecord {
            feature_id: feature_id.clone(),
            token: token.clone(),
            expires_at: entry.expires_at,
        };
        self.records.insert(feature_id, record);
    }

    /// Drops the lock on one feature if `token` holds it.
    pub fn unlock(&mut self, token: &LockToken, feature_id: &FeatureId) -> bool {
        let held = self
            .records
            .get(feature_id)
            .is_some_and(|record| &record.token == token);
        if !held {
            return false;
        }
        self.records.remove(feature_id);
        if let Some(entry) = self.tokens.get_mut(token) {
            entry.features.remove(feature_id);
        }
        true
    }

    /// Removes a token and every lock it holds. Returns the features freed.
    pub fn remove_token(&mut self, token: &LockToken) -> Option<BTreeSet<FeatureId>> {
        let entry = self.tokens.remove(token)?;
        for feature_id in &entry.features {
            self.records.remove(feature_id);
        }
        Some(entry.features)
    }

    /// Pushes a token's expiry (and that of its records) to `now + ttl`.
    pub fn extend(&mut self, token: &LockToken, ttl: Duration, now: Instant) -> bool {
        let Some(entry) = self.tokens.get_mut(token) else {
            return false;
        };
        entry.expires_at = now + ttl;
        for feature_id in &entry.features {
            if let Some(record) = self.records.get_mut(feature_id) {
                record.expires_at = entry.expires_at;
            }
        }
        true
    }

    /// Removes the token holding `feature_id` if its lock has lapsed.
    pub fn purge_if_expired(&mut self, feature_id: &FeatureId, now: Instant) -> usize {
        let expired = self
            .records
            .get(feature_id)
            .filter(|record| !record.is_live(now))
            .map(|record| record.token.clone());
        match expired {
            Some(token) => self.remove_token(&token).map_or(0, |freed| freed.len()),
            None => 0,
        }
    }

    /// Removes every lapsed token and its records.
    ///
    /// Returns the number of feature locks removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<LockToken> = self
            .tokens
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();
        expired
            .iter()
            .filter_map(|token| self.remove_token(token))
            .map(|freed| freed.len())
            .sum()
    }

    /// Empties the table. Returns the number of feature locks dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.records.len();
        self.records.clear();
        self.tokens.clear();
        dropped
    }

    pub fn lock_count(&self) -> usize {
        self.records.len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(s: &str) -> FeatureId {
        FeatureId::new(s)
    }

    #[test]
    fn lock_and_unlock() {
        let now = Instant::now();
        let mut table = LockTable::new();
        let token = LockToken::generate();
        table.open_token(token.clone(), Duration::from_secs(10), None, now);
        table.lock(&token, fid("a"));

        assert_eq!(table.live_holder(&fid("a"), now), Some(&token));
        assert!(table.unlock(&token, &fid("a")));
        assert!(table.record(&fid("a")).is_none());
        assert!(table.token(&token).unwrap().features.is_empty());
    }

    #[test]
    fn unlock_with_wrong_token_is_refused() {
        let now = Instant::now();
        let mut table = LockTable::new();
        let token = LockToken::generate();
        table.open_token(token.clone(), Duration::from_secs(10), None, now);
        table.lock(&token, fid("a"));

        assert!(!table.unlock(&LockToken::generate(), &fid("a")));
        assert_eq!(table.lock_count(), 1);
    }

    #[test]
    fn expired_records_have_no_holder() {
        let now = Instant::now();
        let mut table = LockTable::new();
        let token = LockToken::generate();
        table.open_token(token.clone(), Duration::from_secs(1), None, now);
        table.lock(&token, fid("a"));

        let later = now + Duration::from_secs(1);
        assert!(table.live_holder(&fid("a"), later).is_none());
        assert_eq!(table.purge_expired(later), 1);
        assert_eq!(table.token_count(), 0);
    }

    #[test]
    fn extend_moves_every_record() {
        let now = Instant::now();
        let mut table = LockTable::new();
        let token = LockToken::generate();
        table.open_token(token.clone(), Duration::from_secs(1), None, now);
        table.lock(&token, fid("a"));
        table.lock(&token, fid("b"));

        let later = now + Duration::from_millis(900);
        assert!(table.extend(&token, Duration::from_secs(1), later));
        let expected = later + Duration::from_secs(1);
        assert_eq!(table.record(&fid("a")).unwrap().expires_at, expected);
        assert_eq!(table.record(&fid("b")).unwrap().expires_at, expected);
    }

    #[test]
    fn purge_if_expired_removes_whole_token() {
        let now = Instant::now();
        let mut table = LockTable::new();
        let token = LockToken::generate();
        table.open_token(token.clone(), Duration::from_secs(1), None, now);
        table.lock(&token, fid("a"));
        table.lock(&token, fid("b"));

        assert_eq!(table.purge_if_expired(&fid("a"), now), 0);
        let later = now + Duration::from_secs(2);
        assert_eq!(table.purge_if_expired(&fid("a"), later), 2);
        assert_eq!(table.lock_count(), 0);
    }
}
