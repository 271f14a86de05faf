//! Stress tests for the lock manager and transaction path.
//!
//! These drive a shared service from many threads and check that lock
//! ownership stays exclusive under contention.

use crate::fixtures::{lock_request, seed_id, ROADS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wfstx_core::{
    Action, AllSome, CoreError, Feature, FeatureService, FeatureStore, Filter, Property,
    TransactionRequest,
};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of seeded features competed for.
    pub feature_count: usize,
    /// Features locked per operation.
    pub window: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            threads: 4,
            feature_count: 16,
            window: 3,
        }
    }
}

/// Outcome of a lock contention run.
#[derive(Debug, Clone)]
pub struct ContentionResult {
    /// Lock-and-write cycles; a refused ALL acquisition counts as failed.
    pub result: StressTestResult,
    /// ALL acquisitions refused because another thread held a feature.
    pub conflicts: usize,
    /// Times a feature was observed under a token other than the holder's,
    /// or overwritten by another thread while locked. Must be zero.
    pub exclusivity_violations: usize,
}

fn window_ids(config: &StressConfig, thread: usize, op: usize) -> Vec<String> {
    let count = config.feature_count.max(1);
    let start = (thread * 7 + op * 3) % count;
    (0..config.window.min(count))
        .map(|k| seed_id((start + k) % count).into_string())
        .collect()
}

/// Seeds `config.feature_count` roads into the service's store.
pub fn seed_roads(service: &FeatureService, config: &StressConfig) {
    for i in 0..config.feature_count {
        // Already seeded ids are fine to skip.
        let _ = service
            .store()
            .insert(ROADS, &Feature::new(), Some(&seed_id(i)));
    }
}

/// Threads repeatedly lock a window of features under ALL, stamp them with
/// their own name, check nobody else wrote in between, then clear the stamp
/// in a locked transaction that releases the window.
pub fn stress_lock_contention(
    service: Arc<FeatureService>,
    config: &StressConfig,
) -> ContentionResult {
    seed_roads(&service, config);

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let service = Arc::clone(&service);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let conflicts = Arc::clone(&conflicts);
            let violations = Arc::clone(&violations);
            let config = config.clone();

            thread::spawn(move || {
                let me = format!("worker-{t}");
                for op in 0..config.operations {
                    let ids = window_ids(&config, t, op);
                    let request = lock_request(Filter::ids(ids.iter().cloned()), AllSome::All);
                    let lock = match service.lock_feature(&request) {
                        Ok(lock) => lock,
                        Err(CoreError::LockConflict { .. }) => {
                            conflicts.fetch_add(1, Ordering::Relaxed);
                            failed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    };

                    let foreign = lock.locked.iter().filter(|id| {
                        service
                            .locks()
                            .record(id)
                            .map_or(true, |record| record.token != lock.lock_id)
                    });
                    violations.fetch_add(foreign.count(), Ordering::Relaxed);

                    let filter = Filter::ids(ids.iter().cloned());
                    let stamp = [Property::set("holder", me.as_str())];
                    if service.store().update(ROADS, &filter, &stamp).is_err() {
                        let _ = service.release_lock(lock.lock_id.as_str());
                        failed.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    let overwritten = service
                        .store()
                        .fetch(ROADS, &filter)
                        .map(|features| {
                            features
                                .iter()
                                .filter(|f| {
                                    f.get("holder").and_then(|v| v.as_str()) != Some(me.as_str())
                                })
                                .count()
                        })
                        .unwrap_or(0);
                    violations.fetch_add(overwritten, Ordering::Relaxed);

                    // Clearing the stamp under the token releases every lock.
                    let clear = TransactionRequest::new()
                        .lock_id(lock.lock_id.as_str())
                        .action(Action::Update {
                            handle: None,
                            type_name: ROADS.to_string(),
                            properties: vec![Property::remove("holder")],
                            filter,
                        });
                    if service.transaction(&clear).is_ok_and(|r| r.is_success()) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        let _ = service.release_lock(lock.lock_id.as_str());
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    ContentionResult {
        result: StressTestResult::new(
            successful.load(Ordering::Relaxed),
            failed.load(Ordering::Relaxed),
            start.elapsed(),
        ),
        conflicts: conflicts.load(Ordering::Relaxed),
        exclusivity_violations: violations.load(Ordering::Relaxed),
    }
}

/// Threads run tokenless insert/update/delete batches against their own
/// features while sharing the service.
pub fn stress_concurrent_transactions(
    service: Arc<FeatureService>,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let service = Arc::clone(&service);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let operations = config.operations;

            thread::spawn(move || {
                let owner = format!("worker-{t}");
                for op in 0..operations {
                    let mine = Filter::property_equals("owner", owner.as_str());
                    let request = TransactionRequest::new()
                        .handle(format!("{owner}-{op}"))
                        .action(Action::Insert {
                            handle: Some("ins".into()),
                            type_name: ROADS.to_string(),
                            features: vec![Feature::new().property("owner", owner.as_str())],
                            id_policy: None,
                        })
                        .action(Action::Update {
                            handle: Some("upd".into()),
                            type_name: ROADS.to_string(),
                            properties: vec![Property::set("op", op)],
                            filter: mine.clone(),
                        })
                        .action(Action::Delete {
                            handle: Some("del".into()),
                            type_name: ROADS.to_string(),
                            filter: mine,
                        });

                    match service.transaction(&request) {
                        Ok(response) if response.is_success() => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestService;
    use std::collections::BTreeSet;
    use wfstx_core::{EngineConfig, FeatureId};
    use wfstx_storage::{InMemoryFeatureStore, StoreError, StoreResult};

    fn shared_service() -> Arc<FeatureService> {
        Arc::new(TestService::new().service)
    }

    /// Store whose property updates always fail.
    struct FrozenStore(InMemoryFeatureStore);

    impl FeatureStore for FrozenStore {
        fn read(&self, type_name: &str, filter: &Filter) -> StoreResult<BTreeSet<FeatureId>> {
            self.0.read(type_name, filter)
        }
        fn fetch(&self, type_name: &str, filter: &Filter) -> StoreResult<Vec<Feature>> {
            self.0.fetch(type_name, filter)
        }
        fn insert(
            &self,
            type_name: &str,
            feature: &Feature,
            id: Option<&FeatureId>,
        ) -> StoreResult<FeatureId> {
            self.0.insert(type_name, feature, id)
        }
        fn replace(&self, type_name: &str, id: &FeatureId, feature: &Feature) -> StoreResult<()> {
            self.0.replace(type_name, id, feature)
        }
        fn update(&self, _: &str, _: &Filter, _: &[Property]) -> StoreResult<usize> {
            Err(StoreError::Backend("updates are frozen".into()))
        }
        fn delete(&self, type_name: &str, filter: &Filter) -> StoreResult<usize> {
            self.0.delete(type_name, filter)
        }
        fn exists(&self, id: &FeatureId) -> StoreResult<bool> {
            self.0.exists(id)
        }
    }

    #[test]
    fn contention_never_breaks_exclusivity() {
        let config = StressConfig {
            operations: 100,
            threads: 4,
            feature_count: 6,
            window: 3,
        };
        let service = shared_service();
        let outcome = stress_lock_contention(Arc::clone(&service), &config);

        assert_eq!(outcome.exclusivity_violations, 0);
        assert_eq!(outcome.result.total_ops, config.operations * config.threads);
        assert!(outcome.result.successful_ops > 0);
        assert_eq!(service.locks().lock_count(), 0);
    }

    #[test]
    fn failed_stamp_is_not_a_violation() {
        let store = FrozenStore(InMemoryFeatureStore::with_types([ROADS]));
        let config = EngineConfig::new().sweep_interval(Duration::ZERO);
        let service = Arc::new(FeatureService::new(Arc::new(store), config).unwrap());
        let stress = StressConfig {
            operations: 20,
            threads: 2,
            feature_count: 4,
            window: 2,
        };

        let outcome = stress_lock_contention(Arc::clone(&service), &stress);
        assert_eq!(outcome.exclusivity_violations, 0);
        assert_eq!(outcome.result.successful_ops, 0);
        assert_eq!(outcome.result.failed_ops, 40);
        assert_eq!(service.locks().lock_count(), 0);
    }

    #[test]
    fn concurrent_transactions_all_succeed() {
        let config = StressConfig {
            operations: 50,
            threads: 4,
            ..StressConfig::default()
        };
        let service = shared_service();
        let result = stress_concurrent_transactions(Arc::clone(&service), &config);

        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
        assert!(service.store().read(ROADS, &Filter::All).unwrap().is_empty());
    }
}
