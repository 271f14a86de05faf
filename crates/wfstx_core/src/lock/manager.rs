//! Lock manager.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::table::{LockRecord, LockTable};
use crate::types::{AllSome, LockToken};
use crate::FeatureId;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOutcome {
    /// Token covering exactly `locked`.
    pub token: LockToken,
    /// Features locked by this call.
    pub locked: BTreeSet<FeatureId>,
    /// Features already under someone else's live lock, left untouched.
    pub already_locked: BTreeSet<FeatureId>,
}

/// Acquires, validates and releases feature locks.
///
/// The lock manager provides:
/// - ALL/SOME acquisition over a feature set, atomic per call
/// - Token validation that never honors a lapsed lock
/// - ALL/SOME release, renewing the survivors' expiry on partial release
/// - Expiry sweeping, lazily on acquisition and through [`Self::sweep`]
///
/// ## Concurrency
///
/// One `RwLock` guards the whole table. Acquire, release and sweep take the
/// write lock, so the check-then-lock step of an ALL acquisition cannot
/// interleave with another acquisition. `validate` and `resolve` take the
/// read lock and compare against the clock without mutating anything.
pub struct LockManager {
    table: RwLock<LockTable>,
    clock: Arc<dyn Clock>,
    default_expiry: Duration,
    max_expiry: Option<Duration>,
}

impl LockManager {
    /// Creates a lock manager using the expiry settings of `config`.
    pub fn new(clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            table: RwLock::new(LockTable::new()),
            clock,
            default_expiry: config.default_lock_expiry,
            max_expiry: config.max_lock_expiry,
        }
    }

    fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        let ttl = requested.unwrap_or(self.default_expiry);
        self.max_expiry.map_or(ttl, |max| ttl.min(max))
    }

    /// Locks every feature of `ids` that has no live lock, under a fresh
    /// token.
    ///
    /// `ttl = None` applies the configured default expiry; such locks are not
    /// renewed by a partial release.
    pub fn try_acquire(
        &self,
        ids: &BTreeSet<FeatureId>,
        ttl: Option<Duration>,
    ) -> AcquireOutcome {
        let mut table = self.table.write();
        let (free, already_locked) = self.partition(&mut table, ids);
        self.grant(&mut table, free, already_locked, ttl)
    }

    /// Acquires locks under an ALL or SOME policy.
    ///
    /// The conflict check and the locking happen under one write lock, so two
    /// overlapping ALL acquisitions can never both succeed.
    ///
    /// # Errors
    ///
    /// Under `ALL`, returns [`CoreError::LockConflict`] if any feature is
    /// already locked; nothing is locked by the call. Under `SOME` this
    /// never fails.
    pub fn acquire_with_policy(
        &self,
        ids: &BTreeSet<FeatureId>,
        ttl: Option<Duration>,
        policy: AllSome,
    ) -> CoreResult<AcquireOutcome> {
        let mut table = self.table.write();
        let (free, already_locked) = self.partition(&mut table, ids);
        if policy == AllSome::All && !already_locked.is_empty() {
            debug!(conflicts = already_locked.len(), "ALL acquisition refused");
            return Err(CoreError::lock_conflict(already_locked));
        }
        Ok(self.grant(&mut table, free, already_locked, ttl))
    }

    /// Splits `ids` into free and live-locked features, purging lapsed locks
    /// on the way.
    fn partition(
        &self,
        table: &mut LockTable,
        ids: &BTreeSet<FeatureId>,
    ) -> (BTreeSet<FeatureId>, BTreeSet<FeatureId>) {
        let now = self.clock.now();
        let mut free = BTreeSet::new();
        let mut already_locked = BTreeSet::new();
        for id in ids {
            table.purge_if_expired(id, now);
            if table.live_holder(id, now).is_some() {
                already_locked.insert(id.clone());
            } else {
                free.insert(id.clone());
            }
        }
        (free, already_locked)
    }

    fn grant(
        &self,
        table: &mut LockTable,
        free: BTreeSet<FeatureId>,
        already_locked: BTreeSet<FeatureId>,
        ttl: Option<Duration>,
    ) -> AcquireOutcome {
        let now = self.clock.now();
        let token = LockToken::generate();
        table.open_token(token.clone(), self.effective_ttl(ttl), ttl, now);
        for id in &free {
            table.lock(&token, id.clone());
        }

        debug!(
            token = %token,
            locked = free.len(),
            already_locked = already_locked.len(),
            "acquired feature locks"
        );
        AcquireOutcome {
            token,
            locked: free,
            already_locked,
        }
    }

    /// Returns true iff `token` holds a live lock on `feature_id`.
    #[must_use]
    pub fn validate(&self, token: &LockToken, feature_id: &FeatureId) -> bool {
        let table = self.table.read();
        let now = self.clock.now();
        table.live_holder(feature_id, now) == Some(token)
    }

    /// Returns true if `token` was issued and has not lapsed.
    #[must_use]
    pub fn resolve(&self, token: &LockToken) -> bool {
        let table = self.table.read();
        let now = self.clock.now();
        table
            .token(token)
            .is_some_and(|entry| entry.expires_at > now)
    }

    /// Returns the features of `ids` under a live lock not held by `token`.
    #[must_use]
    pub fn locked_by_others(
        &self,
        token: Option<&LockToken>,
        ids: &BTreeSet<FeatureId>,
    ) -> BTreeSet<FeatureId> {
        let table = self.table.read();
        let now = self.clock.now();
        ids.iter()
            .filter(|id| {
                table
                    .live_holder(id, now)
                    .is_some_and(|holder| Some(holder) != token)
            })
            .cloned()
            .collect()
    }

    /// Releases locks held by `token`.
    ///
    /// - `ALL` frees every feature the token holds and retires the token.
    /// - `SOME` frees only `touched`; if the token was acquired with an
    ///   explicit expiry, the remaining locks get that expiry again from now.
    ///
    /// Returns the number of feature locks freed. Unknown tokens free nothing.
    pub fn release(
        &self,
        token: &LockToken,
        policy: AllSome,
        touched: &BTreeSet<FeatureId>,
    ) -> usize {
        let mut table = self.table.write();
        let now = self.clock.now();

        let freed = match policy {
            AllSome::All => table.remove_token(token).map_or(0, |freed| freed.len()),
            AllSome::Some => {
                let freed = touched.iter().filter(|id| table.unlock(token, id)).count();
                let renewal = table
                    .token(token)
                    .filter(|entry| entry.original_ttl.is_some())
                    .map(|entry| entry.ttl);
                if let Some(ttl) = renewal {
                    table.extend(token, ttl, now);
                }
                freed
            }
        };

        debug!(token = %token, policy = %policy, freed, "released feature locks");
        freed
    }

    /// Retires a live token and frees every feature it holds.
    ///
    /// Returns exactly the features freed by this call.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownLock`] if the token is unknown or lapsed.
    pub fn release_all(&self, token: &LockToken) -> CoreResult<BTreeSet<FeatureId>> {
        let mut table = self.table.write();
        let now = self.clock.now();

        if !table.token(token).is_some_and(|entry| entry.expires_at > now) {
            return Err(CoreError::unknown_lock(token.as_str()));
        }
        let freed = table.remove_token(token).unwrap_or_default();

        debug!(token = %token, freed = freed.len(), "released lock");
        Ok(freed)
    }

    /// Resets the expiry of a live token's locks.
    ///
    /// Returns the features the token still holds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownLock`] if the token is unknown or lapsed.
    pub fn renew(&self, token: &LockToken) -> CoreResult<BTreeSet<FeatureId>> {
        let mut table = self.table.write();
        let now = self.clock.now();

        let (ttl, features) = match table.token(token) {
            Some(entry) if entry.expires_at > now => (entry.ttl, entry.features.clone()),
            _ => return Err(CoreError::unknown_lock(token.as_str())),
        };
        table.extend(token, ttl, now);

        debug!(token = %token, features = features.len(), "renewed feature locks");
        Ok(features)
    }

    /// Removes every lapsed lock. Returns the number of feature locks removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        self.table.write().purge_expired(now)
    }

    /// Drops every lock. Returns the number of feature locks dropped.
    pub fn clear(&self) -> usize {
        self.table.write().clear()
    }

    /// Returns the lock record of a feature, live or not yet swept.
    #[must_use]
    pub fn record(&self, feature_id: &FeatureId) -> Option<LockRecord> {
        self.table.read().record(feature_id).cloned()
    }

    /// Returns the features currently held by a token.
    #[must_use]
    pub fn features_of(&self, token: &LockToken) -> BTreeSet<FeatureId> {
        self.table
            .read()
            .token(token)
            .map(|entry| entry.features.clone())
            .unwrap_or_default()
    }

    /// Returns the number of lock records in the table.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.table.read().lock_count()
    }

    /// Returns the number of tokens in the table.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.table.read().token_count()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("lock_count", &self.lock_count())
            .field("token_count", &self.token_count())
            .finish_non_exhaustive()
    }
}
