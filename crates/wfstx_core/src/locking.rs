//! Lock requests: `LockFeature` and `GetFeatureWithLock`.
//!
//! Both select features with queries against the store and lock them under
//! one fresh token. Unlike transaction actions, every failure here fails
//! the whole request.

use crate::error::{CoreError, CoreResult};
use crate::lock::{AcquireOutcome, LockManager};
use crate::types::{AllSome, LockToken, ResultType};
use crate::FeatureId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};
use wfstx_storage::{Feature, FeatureStore, Filter};

/// Selects features of one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Feature type to query.
    pub type_name: String,
    /// Selection within the type.
    #[serde(default = "Query::all")]
    pub filter: Filter,
}

impl Query {
    /// Creates a query.
    #[must_use]
    pub fn new(type_name: impl Into<String>, filter: Filter) -> Self {
        Self {
            type_name: type_name.into(),
            filter,
        }
    }

    fn all() -> Filter {
        Filter::All
    }
}

/// Fetch features and lock them in one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetFeatureWithLockRequest {
    /// Client correlation string.
    #[serde(default)]
    pub handle: Option<String>,
    /// Queries whose results are locked, in order.
    pub queries: Vec<Query>,
    /// Lock lifetime in seconds; the configured default when absent.
    #[serde(default, with = "crate::config::opt_secs")]
    pub expiry: Option<Duration>,
    /// ALL or SOME; the configured default when absent.
    #[serde(default)]
    pub lock_action: Option<AllSome>,
    /// Whether to return features or only their count.
    #[serde(default)]
    pub result_type: ResultType,
    /// Upper bound on the number of features fetched and locked.
    #[serde(default)]
    pub max_features: Option<usize>,
}

/// Result of a `GetFeatureWithLock` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetFeatureWithLockResponse {
    /// Token covering `locked`.
    pub lock_id: LockToken,
    /// Number of features the queries returned.
    pub number_matched: usize,
    /// The features, empty for [`ResultType::Hits`].
    pub features: Vec<Feature>,
    /// Features locked by this request.
    pub locked: BTreeSet<FeatureId>,
    /// Features left to their current holders (SOME only).
    pub not_locked: BTreeSet<FeatureId>,
}

/// One selection of a `LockFeature` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockSpec {
    /// Client correlation string.
    #[serde(default)]
    pub handle: Option<String>,
    /// Feature type to lock in.
    pub type_name: String,
    /// Selection within the type.
    #[serde(default = "Query::all")]
    pub filter: Filter,
}

/// Lock features without fetching them, or renew an existing lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockFeatureRequest {
    /// Client correlation string.
    #[serde(default)]
    pub handle: Option<String>,
    /// An existing lock to renew instead of acquiring a new one.
    #[serde(default)]
    pub lock_id: Option<String>,
    /// Selections to lock.
    #[serde(default)]
    pub locks: Vec<LockSpec>,
    /// Lock lifetime in seconds; the configured default when absent.
    #[serde(default, with = "crate::config::opt_secs")]
    pub expiry: Option<Duration>,
    /// ALL or SOME; the configured default when absent.
    #[serde(default)]
    pub lock_action: Option<AllSome>,
}

/// Result of a `LockFeature` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFeatureResponse {
    /// Token covering `locked`.
    pub lock_id: LockToken,
    /// Features held by the token.
    pub locked: BTreeSet<FeatureId>,
    /// Features left to their current holders (SOME only).
    pub not_locked: BTreeSet<FeatureId>,
}

impl From<AcquireOutcome> for LockFeatureResponse {
    fn from(outcome: AcquireOutcome) -> Self {
        Self {
            lock_id: outcome.token,
            locked: outcome.locked,
            not_locked: outcome.already_locked,
        }
    }
}

/// Answers lock requests against a store and a lock manager.
pub struct LockCoordinator<'a> {
    store: &'a dyn FeatureStore,
    locks: &'a LockManager,
    default_action: AllSome,
}

impl<'a> LockCoordinator<'a> {
    /// Creates a coordinator; `default_action` applies when a request names
    /// no lock action.
    pub fn new(
        store: &'a dyn FeatureStore,
        locks: &'a LockManager,
        default_action: AllSome,
    ) -> Self {
        Self {
            store,
            locks,
            default_action,
        }
    }

    /// Fetches the features of every query and locks them.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] for a request without queries, an empty
    ///   type name or a zero expiry
    /// - [`CoreError::Storage`] if a query fails
    /// - [`CoreError::LockConflict`] under ALL when a feature is locked
    ///   elsewhere; nothing is locked and no features are returned
    pub fn get_feature_with_lock(
        &self,
        request: &GetFeatureWithLockRequest,
    ) -> CoreResult<GetFeatureWithLockResponse> {
        if request.queries.is_empty() {
            return Err(CoreError::validation("GetFeatureWithLock needs a query"));
        }
        check_expiry(request.expiry)?;

        let mut features = Vec::new();
        for query in &request.queries {
            check_type(&query.type_name)?;
            features.extend(self.store.fetch(&query.type_name, &query.filter)?);
        }
        if let Some(max) = request.max_features {
            features.truncate(max);
        }

        let ids: BTreeSet<FeatureId> = features.iter().filter_map(|f| f.id.clone()).collect();
        let outcome = self.acquire(&ids, request.expiry, request.lock_action, &request.handle)?;

        let number_matched = features.len();
        if request.result_type == ResultType::Hits {
            features.clear();
        }
        Ok(GetFeatureWithLockResponse {
            lock_id: outcome.token,
            number_matched,
            features,
            locked: outcome.locked,
            not_locked: outcome.already_locked,
        })
    }

    /// Locks the features selected by every lock spec, or renews the lock
    /// named by `lock_id`.
    ///
    /// A renewal ignores the lock specs and reports the features the token
    /// still holds.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] for a malformed lock id, a request without
    ///   lock specs, an empty type name or a zero expiry
    /// - [`CoreError::UnknownLock`] when renewing an unknown or lapsed lock
    /// - [`CoreError::Storage`] if a selection fails
    /// - [`CoreError::LockConflict`] under ALL when a feature is locked
    ///   elsewhere
    pub fn lock_feature(&self, request: &LockFeatureRequest) -> CoreResult<LockFeatureResponse> {
        if let Some(lock_id) = request.lock_id.as_deref() {
            if !LockToken::is_well_formed(lock_id) {
                return Err(CoreError::validation(format!("malformed lock id {lock_id:?}")));
            }
            let token = LockToken::new(lock_id);
            let locked = self.locks.renew(&token)?;
            return Ok(LockFeatureResponse {
                lock_id: token,
                locked,
                not_locked: BTreeSet::new(),
            });
        }

        if request.locks.is_empty() {
            return Err(CoreError::validation("LockFeature needs a lock selection"));
        }
        check_expiry(request.expiry)?;

        let mut ids = BTreeSet::new();
        for spec in &request.locks {
            check_type(&spec.type_name)?;
            ids.extend(self.store.read(&spec.type_name, &spec.filter)?);
        }
        self.acquire(&ids, request.expiry, request.lock_action, &request.handle)
            .map(LockFeatureResponse::from)
    }

    fn acquire(
        &self,
        ids: &BTreeSet<FeatureId>,
        expiry: Option<Duration>,
        lock_action: Option<AllSome>,
        handle: &Option<String>,
    ) -> CoreResult<AcquireOutcome> {
        let policy = lock_action.unwrap_or(self.default_action);
        match self.locks.acquire_with_policy(ids, expiry, policy) {
            Ok(outcome) => {
                debug!(
                    ?handle,
                    %policy,
                    token = %outcome.token,
                    locked = outcome.locked.len(),
                    "lock request granted"
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!(?handle, %policy, error = %err, "lock request refused");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for LockCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("default_action", &self.default_action)
            .finish_non_exhaustive()
    }
}

fn check_type(type_name: &str) -> CoreResult<()> {
    if type_name.trim().is_empty() {
        return Err(CoreError::validation("feature type name is empty"));
    }
    Ok(())
}

fn check_expiry(expiry: Option<Duration>) -> CoreResult<()> {
    if expiry.is_some_and(|e| e.is_zero()) {
        return Err(CoreError::validation("lock expiry must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use std::sync::Arc;
    use wfstx_storage::InMemoryFeatureStore;

    fn setup() -> (InMemoryFeatureStore, LockManager, Arc<ManualClock>) {
        let store = InMemoryFeatureStore::with_types(["roads", "rivers"]);
        for (id, kind) in [("roads.a", "lane"), ("roads.b", "lane"), ("roads.c", "highway")] {
            store
                .insert(
                    "roads",
                    &Feature::new().property("kind", kind),
                    Some(&FeatureId::new(id)),
                )
                .unwrap();
        }
        let clock = Arc::new(ManualClock::new());
        let locks = LockManager::new(clock.clone(), &EngineConfig::default());
        (store, locks, clock)
    }

    fn lanes() -> Query {
        Query::new("roads", Filter::property_equals("kind", "lane"))
    }

    #[test]
    fn get_feature_with_lock_returns_and_locks() {
        let (store, locks, _) = setup();
        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let request = GetFeatureWithLockRequest {
            queries: vec![lanes()],
            ..Default::default()
        };

        let response = coordinator.get_feature_with_lock(&request).unwrap();
        assert_eq!(response.number_matched, 2);
        assert_eq!(response.features.len(), 2);
        assert_eq!(response.locked.len(), 2);
        assert!(locks.validate(&response.lock_id, &FeatureId::new("roads.a")));
    }

    #[test]
    fn all_conflict_returns_nothing() {
        let (store, locks, _) = setup();
        let held: BTreeSet<FeatureId> = [FeatureId::new("roads.b")].into_iter().collect();
        locks.try_acquire(&held, None);

        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let request = GetFeatureWithLockRequest {
            queries: vec![lanes()],
            ..Default::default()
        };
        let err = coordinator.get_feature_with_lock(&request).unwrap_err();
        assert!(matches!(err, CoreError::LockConflict { .. }));
        assert!(locks.record(&FeatureId::new("roads.a")).is_none());
    }

    #[test]
    fn some_reports_split() {
        let (store, locks, _) = setup();
        let held: BTreeSet<FeatureId> = [FeatureId::new("roads.b")].into_iter().collect();
        locks.try_acquire(&held, None);

        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let request = GetFeatureWithLockRequest {
            queries: vec![lanes()],
            lock_action: Some(AllSome::Some),
            result_type: ResultType::Hits,
            ..Default::default()
        };
        let response = coordinator.get_feature_with_lock(&request).unwrap();
        assert_eq!(response.number_matched, 2);
        assert!(response.features.is_empty());
        assert_eq!(response.locked, [FeatureId::new("roads.a")].into_iter().collect());
        assert_eq!(response.not_locked, held);
    }

    #[test]
    fn max_features_limits_locking() {
        let (store, locks, _) = setup();
        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let request = GetFeatureWithLockRequest {
            queries: vec![Query::new("roads", Filter::All)],
            max_features: Some(1),
            ..Default::default()
        };
        let response = coordinator.get_feature_with_lock(&request).unwrap();
        assert_eq!(response.locked.len(), 1);
        assert_eq!(locks.lock_count(), 1);
    }

    #[test]
    fn lock_feature_over_several_specs() {
        let (store, locks, _) = setup();
        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let request = LockFeatureRequest {
            locks: vec![
                LockSpec {
                    handle: Some("l1".into()),
                    type_name: "roads".into(),
                    filter: Filter::ids(["roads.c"]),
                },
                LockSpec {
                    handle: None,
                    type_name: "rivers".into(),
                    filter: Filter::All,
                },
            ],
            expiry: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let response = coordinator.lock_feature(&request).unwrap();
        assert_eq!(response.locked, [FeatureId::new("roads.c")].into_iter().collect());
        assert!(response.not_locked.is_empty());
    }

    #[test]
    fn lock_feature_renews_existing_lock() {
        let (store, locks, clock) = setup();
        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let first = coordinator
            .lock_feature(&LockFeatureRequest {
                locks: vec![LockSpec {
                    handle: None,
                    type_name: "roads".into(),
                    filter: Filter::ids(["roads.a"]),
                }],
                expiry: Some(Duration::from_secs(60)),
                ..Default::default()
            })
            .unwrap();

        clock.advance(Duration::from_secs(50));
        let renewed = coordinator
            .lock_feature(&LockFeatureRequest {
                lock_id: Some(first.lock_id.to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(renewed.lock_id, first.lock_id);
        assert_eq!(renewed.locked, first.locked);

        clock.advance(Duration::from_secs(50));
        assert!(locks.validate(&first.lock_id, &FeatureId::new("roads.a")));
    }

    #[test]
    fn renewing_unknown_lock_fails() {
        let (store, locks, _) = setup();
        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        let request = LockFeatureRequest {
            lock_id: Some("missing".into()),
            ..Default::default()
        };
        assert!(matches!(
            coordinator.lock_feature(&request),
            Err(CoreError::UnknownLock { .. })
        ));
    }

    #[test]
    fn invalid_requests() {
        let (store, locks, _) = setup();
        let coordinator = LockCoordinator::new(&store, &locks, AllSome::All);
        assert!(matches!(
            coordinator.lock_feature(&LockFeatureRequest::default()),
            Err(CoreError::Validation { .. })
        ));
        let zero_expiry = GetFeatureWithLockRequest {
            queries: vec![lanes()],
            expiry: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(matches!(
            coordinator.get_feature_with_lock(&zero_expiry),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn request_expiry_reads_seconds() {
        let request: GetFeatureWithLockRequest = serde_json::from_str(
            r#"{"queries": [{"type_name": "roads"}], "expiry": 120, "lock_action": "SOME"}"#,
        )
        .unwrap();
        assert_eq!(request.expiry, Some(Duration::from_secs(120)));
        assert_eq!(request.queries[0].filter, Filter::All);
        assert_eq!(request.lock_action, Some(AllSome::Some));
    }
}
