//! Test fixtures and service helpers.
//!
//! Provides a feature service over a seeded in-memory store, driven by a
//! manual clock so expiry can be tested without sleeping.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use wfstx_core::{
    AllSome, EngineConfig, Feature, FeatureId, FeatureService, FeatureStore, Filter,
    LockFeatureRequest, LockSpec, LockToken, ManualClock,
};
use wfstx_storage::InMemoryFeatureStore;

/// Feature type every fixture registers.
pub const ROADS: &str = "roads";

/// A feature service with handles on its store and clock.
pub struct TestService {
    /// The service instance.
    pub service: FeatureService,
    /// The store behind the service.
    pub store: Arc<InMemoryFeatureStore>,
    /// The clock the lock manager reads.
    pub clock: Arc<ManualClock>,
}

impl TestService {
    /// Creates a service over an empty `roads` type, sweeper off.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::new().sweep_interval(Duration::ZERO))
    }

    /// Creates a service with `count` roads, `roads.0` .. `roads.<count-1>`.
    pub fn seeded(count: usize) -> Self {
        let fixture = Self::new();
        for i in 0..count {
            fixture
                .store
                .insert(
                    ROADS,
                    &Feature::new().property("index", i),
                    Some(&seed_id(i)),
                )
                .expect("Failed to seed feature");
        }
        fixture
    }

    /// Creates a service over an empty `roads` type with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryFeatureStore::with_types([ROADS]));
        let clock = Arc::new(ManualClock::new());
        let service = FeatureService::with_clock(store.clone(), config, clock.clone())
            .expect("Failed to start feature service");
        Self {
            service,
            store,
            clock,
        }
    }

    /// Returns the ids of every road.
    pub fn road_ids(&self) -> BTreeSet<FeatureId> {
        self.store
            .read(ROADS, &Filter::All)
            .expect("In-memory read cannot fail")
    }

    /// Locks the given roads under ALL and returns the token.
    pub fn lock(&self, ids: &[&str]) -> LockToken {
        self.service
            .lock_feature(&lock_request(Filter::ids(ids.iter().copied()), AllSome::All))
            .expect("Failed to lock features")
            .lock_id
    }

    /// Moves the service clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl Default for TestService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestService {
    type Target = FeatureService;

    fn deref(&self) -> &Self::Target {
        &self.service
    }
}

/// Id of the `i`-th seeded road.
pub fn seed_id(i: usize) -> FeatureId {
    FeatureId::new(format!("{ROADS}.{i}"))
}

/// Builds an id set.
pub fn feature_ids(names: &[&str]) -> BTreeSet<FeatureId> {
    names.iter().map(|n| FeatureId::new(*n)).collect()
}

/// Builds a single-spec `LockFeature` request over roads.
pub fn lock_request(filter: Filter, action: AllSome) -> LockFeatureRequest {
    LockFeatureRequest {
        locks: vec![LockSpec {
            handle: None,
            type_name: ROADS.to_string(),
            filter,
        }],
        lock_action: Some(action),
        ..Default::default()
    }
}

/// Runs a test against a service seeded with `count` roads.
///
/// # Example
///
/// ```rust
/// use wfstx_testkit::with_seeded_service;
///
/// with_seeded_service(3, |fixture| {
///     assert_eq!(fixture.road_ids().len(), 3);
/// });
/// ```
pub fn with_seeded_service<F, R>(count: usize, f: F) -> R
where
    F: FnOnce(&TestService) -> R,
{
    let fixture = TestService::seeded(count);
    f(&fixture)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A seeded service with every road locked under one token.
    pub fn fully_locked(count: usize) -> (TestService, LockToken) {
        let fixture = TestService::seeded(count);
        let token = fixture
            .service
            .lock_feature(&lock_request(Filter::All, AllSome::All))
            .expect("Failed to lock roads")
            .lock_id;
        (fixture, token)
    }
}
