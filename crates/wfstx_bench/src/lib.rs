//! Benchmark utilities.

use rand::seq::index::sample;
use std::sync::Arc;
use std::time::Duration;
use wfstx_core::{
    AllSome, EngineConfig, Feature, FeatureId, FeatureService, FeatureStore, Filter,
    LockFeatureRequest, LockSpec,
};
use wfstx_storage::InMemoryFeatureStore;

/// Feature type the benchmarks use.
pub const ROADS: &str = "roads";

/// Creates a service over `count` roads with the sweeper off.
pub fn seeded_service(count: usize) -> FeatureService {
    let store = Arc::new(InMemoryFeatureStore::with_types([ROADS]));
    for i in 0..count {
        store
            .insert(
                ROADS,
                &Feature::new().property("lanes", i % 4),
                Some(&road_id(i)),
            )
            .unwrap();
    }
    FeatureService::new(store, EngineConfig::new().sweep_interval(Duration::ZERO)).unwrap()
}

/// Id of the `i`-th seeded road.
pub fn road_id(i: usize) -> FeatureId {
    FeatureId::new(format!("{ROADS}.{i}"))
}

/// Picks `amount` distinct road ids out of `count` at random.
pub fn random_ids(count: usize, amount: usize) -> Vec<FeatureId> {
    let mut rng = rand::thread_rng();
    sample(&mut rng, count, amount.min(count))
        .into_iter()
        .map(road_id)
        .collect()
}

/// Builds a `LockFeature` request over the given roads.
pub fn lock_request(ids: &[FeatureId], action: AllSome) -> LockFeatureRequest {
    LockFeatureRequest {
        locks: vec![LockSpec {
            handle: None,
            type_name: ROADS.to_string(),
            filter: Filter::ids(ids.iter().cloned()),
        }],
        lock_action: Some(action),
        ..Default::default()
    }
}
