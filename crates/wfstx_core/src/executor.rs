//! Action executor: applies one write action against the store.

use crate::action::{Action, ActionErrorCode, ActionReport, MutationCounts};
use crate::identifier::{correlate, IdAssignment, IdentifierReconciler, ReconcileError};
use crate::lock::LockManager;
use crate::native::{NativeError, NativeRegistry};
use crate::types::{IdGeneration, LockToken};
use crate::FeatureId;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use wfstx_storage::{Feature, FeatureStore, Filter, Property, StoreError};

/// Why an action is being refused, before it becomes an `ActionFailure`.
#[derive(Debug)]
struct Rejection {
    code: ActionErrorCode,
    message: String,
}

impl Rejection {
    fn new(code: ActionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<StoreError> for Rejection {
    fn from(err: StoreError) -> Self {
        Self::new(ActionErrorCode::StorageFailure, err.to_string())
    }
}

impl From<ReconcileError> for Rejection {
    fn from(err: ReconcileError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

type Applied = Result<ActionReport, Rejection>;

fn join_ids(ids: &BTreeSet<FeatureId>) -> String {
    ids.iter().map(FeatureId::as_str).collect::<Vec<_>>().join(", ")
}

/// Applies single actions, enforcing lock ownership before any mutation.
///
/// The executor never fails: every problem, including store errors, comes
/// back as a failed [`ActionReport`] so sibling actions keep running.
#[derive(Clone, Copy)]
pub struct ActionExecutor<'a> {
    store: &'a dyn FeatureStore,
    locks: &'a LockManager,
    natives: &'a NativeRegistry,
}

impl<'a> ActionExecutor<'a> {
    /// Creates an executor over the given collaborators.
    pub fn new(
        store: &'a dyn FeatureStore,
        locks: &'a LockManager,
        natives: &'a NativeRegistry,
    ) -> Self {
        Self {
            store,
            locks,
            natives,
        }
    }

    /// Applies `action`, the `position`-th action of its transaction.
    ///
    /// With a `lock_token`, every existing feature the action targets must be
    /// held by that token. Without one, the action fails if any targeted
    /// feature is locked by anybody.
    pub fn apply(
        &self,
        action: &Action,
        position: usize,
        lock_token: Option<&LockToken>,
    ) -> ActionReport {
        let applied = match action {
            Action::Insert {
                handle,
                type_name,
                features,
                id_policy,
            } => self.insert(
                type_name,
                features,
                id_policy.unwrap_or_default(),
                handle.as_deref(),
                lock_token,
            ),
            Action::Update {
                type_name,
                properties,
                filter,
                ..
            } => self.update(type_name, properties, filter, lock_token),
            Action::Delete {
                type_name, filter, ..
            } => self.delete(type_name, filter, lock_token),
            Action::Replace {
                type_name,
                feature,
                filter,
                ..
            } => self.replace(type_name, feature, filter, lock_token),
            Action::Native {
                vendor_id,
                safe_to_ignore,
                command,
                ..
            } => self.native(vendor_id, command, *safe_to_ignore),
        };

        match applied {
            Ok(report) => {
                debug!(
                    position,
                    kind = %action.kind(),
                    touched = report.touched.len(),
                    "action applied"
                );
                report
            }
            Err(rejection) => {
                let locator = action.locator(position);
                warn!(
                    locator = %locator,
                    code = %rejection.code,
                    message = %rejection.message,
                    "action failed"
                );
                ActionReport::failed(rejection.code, rejection.message, locator)
            }
        }
    }

    /// Verifies the caller may mutate `ids`.
    fn check_locks(
        &self,
        ids: &BTreeSet<FeatureId>,
        lock_token: Option<&LockToken>,
    ) -> Result<(), Rejection> {
        match lock_token {
            None => {
                let locked = self.locks.locked_by_others(None, ids);
                if locked.is_empty() {
                    Ok(())
                } else {
                    Err(Rejection::new(
                        ActionErrorCode::FeatureLocked,
                        format!("features are locked: {}", join_ids(&locked)),
                    ))
                }
            }
            Some(token) => {
                let not_held: BTreeSet<FeatureId> = ids
                    .iter()
                    .filter(|id| !self.locks.validate(token, id))
                    .cloned()
                    .collect();
                if not_held.is_empty() {
                    Ok(())
                } else {
                    Err(Rejection::new(
                        ActionErrorCode::LockNotHeld,
                        format!("lock {token} does not hold: {}", join_ids(&not_held)),
                    ))
                }
            }
        }
    }

    fn require_type(type_name: &str) -> Result<(), Rejection> {
        if type_name.trim().is_empty() {
            return Err(Rejection::new(
                ActionErrorCode::InvalidAction,
                "feature type name is empty",
            ));
        }
        Ok(())
    }

    /// Resolves the targets of an update/delete/replace and checks locks.
    ///
    /// `None` means nothing matched, which is a successful no-op.
    fn targets(
        &self,
        type_name: &str,
        filter: &Filter,
        lock_token: Option<&LockToken>,
    ) -> Result<Option<BTreeSet<FeatureId>>, Rejection> {
        Self::require_type(type_name)?;
        let ids = self.store.read(type_name, filter)?;
        if ids.is_empty() {
            return Ok(None);
        }
        self.check_locks(&ids, lock_token)?;
        Ok(Some(ids))
    }

    fn insert(
        &self,
        type_name: &str,
        features: &[Feature],
        policy: IdGeneration,
        handle: Option<&str>,
        lock_token: Option<&LockToken>,
    ) -> Applied {
        Self::require_type(type_name)?;
        if features.is_empty() {
            return Err(Rejection::new(
                ActionErrorCode::InvalidAction,
                "insert carries no features",
            ));
        }

        let plan =
            IdentifierReconciler::new(self.store).reconcile(type_name, policy, features)?;
        let overwritten: BTreeSet<FeatureId> =
            plan.iter().filter_map(IdAssignment::overwritten).cloned().collect();
        if !overwritten.is_empty() {
            self.check_locks(&overwritten, lock_token)?;
        }

        let mut report = ActionReport::noop();
        let mut created = Vec::with_capacity(features.len());
        for (feature, assignment) in features.iter().zip(plan) {
            match assignment {
                IdAssignment::Generate => {
                    created.push(self.store.insert(type_name, feature, None)?);
                }
                IdAssignment::Use(id) => {
                    created.push(self.store.insert(type_name, feature, Some(&id))?);
                }
                IdAssignment::Overwrite(id) => {
                    self.store.replace(type_name, &id, feature)?;
                    report.counts.replaced += 1;
                    report.touched.insert(id);
                }
            }
        }

        report.counts.inserted = created.len();
        report.touched.extend(created.iter().cloned());
        report.correlations = correlate(&created, handle);
        Ok(report)
    }

    fn update(
        &self,
        type_name: &str,
        properties: &[Property],
        filter: &Filter,
        lock_token: Option<&LockToken>,
    ) -> Applied {
        let Some(ids) = self.targets(type_name, filter, lock_token)? else {
            return Ok(ActionReport::noop());
        };
        let updated = self
            .store
            .update(type_name, &Filter::Ids(ids.clone()), properties)?;
        Ok(ActionReport {
            counts: MutationCounts {
                updated,
                ..MutationCounts::default()
            },
            touched: ids,
            ..ActionReport::noop()
        })
    }

    fn delete(&self, type_name: &str, filter: &Filter, lock_token: Option<&LockToken>) -> Applied {
        let Some(ids) = self.targets(type_name, filter, lock_token)? else {
            return Ok(ActionReport::noop());
        };
        let deleted = self.store.delete(type_name, &Filter::Ids(ids.clone()))?;
        Ok(ActionReport {
            counts: MutationCounts {
                deleted,
                ..MutationCounts::default()
            },
            touched: ids,
            ..ActionReport::noop()
        })
    }

    fn replace(
        &self,
        type_name: &str,
        feature: &Feature,
        filter: &Filter,
        lock_token: Option<&LockToken>,
    ) -> Applied {
        let Some(ids) = self.targets(type_name, filter, lock_token)? else {
            return Ok(ActionReport::noop());
        };
        for id in &ids {
            self.store.replace(type_name, id, feature)?;
        }
        Ok(ActionReport {
            counts: MutationCounts {
                replaced: ids.len(),
                ..MutationCounts::default()
            },
            touched: ids,
            ..ActionReport::noop()
        })
    }

    fn native(&self, vendor_id: &str, command: &str, safe_to_ignore: bool) -> Applied {
        match self.natives.dispatch(vendor_id, command) {
            Ok(()) => Ok(ActionReport::noop()),
            Err(NativeError::Unrecognized { .. }) if safe_to_ignore => {
                debug!(vendor_id, "ignoring unrecognized native command");
                Ok(ActionReport::noop())
            }
            Err(err @ NativeError::Unrecognized { .. }) => Err(Rejection::new(
                ActionErrorCode::UnrecognizedNativeCommand,
                err.to_string(),
            )),
            Err(err @ NativeError::Failed(_)) => Err(Rejection::new(
                ActionErrorCode::NativeCommandFailed,
                err.to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for ActionExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("locks", self.locks)
            .field("natives", self.natives)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionResult;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::types::AllSome;
    use serde_json::json;
    use std::sync::Arc;
    use wfstx_storage::{InMemoryFeatureStore, StoreResult};

    struct Fixture {
        store: InMemoryFeatureStore,
        locks: LockManager,
        natives: NativeRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let store = InMemoryFeatureStore::with_types(["roads"]);
            for (id, kind) in [("roads.a", "lane"), ("roads.b", "highway")] {
                store
                    .insert(
                        "roads",
                        &Feature::new().property("kind", kind),
                        Some(&FeatureId::new(id)),
                    )
                    .unwrap();
            }
            Self {
                store,
                locks: LockManager::new(Arc::new(ManualClock::new()), &EngineConfig::default()),
                natives: NativeRegistry::new(),
            }
        }

        fn executor(&self) -> ActionExecutor<'_> {
            ActionExecutor::new(&self.store, &self.locks, &self.natives)
        }

        fn lock(&self, ids: &[&str]) -> LockToken {
            let ids = ids.iter().map(|id| FeatureId::new(*id)).collect();
            self.locks
                .acquire_with_policy(&ids, None, AllSome::All)
                .unwrap()
                .token
        }
    }

    fn failure_code(report: &ActionReport) -> ActionErrorCode {
        report.result.failure().map(|f| f.code).expect("expected failure")
    }

    fn delete_where(kind: &str) -> Action {
        Action::Delete {
            handle: Some("d1".into()),
            type_name: "roads".into(),
            filter: Filter::property_equals("kind", kind),
        }
    }

    #[test]
    fn insert_generates_ids_and_correlates() {
        let fx = Fixture::new();
        let action = Action::Insert {
            handle: Some("ins".into()),
            type_name: "roads".into(),
            features: vec![Feature::new(), Feature::new()],
            id_policy: None,
        };

        let report = fx.executor().apply(&action, 0, None);
        assert!(report.result.is_success());
        assert_eq!(report.counts.inserted, 2);
        assert_eq!(report.correlations.len(), 2);
        assert!(report.correlations.iter().all(|c| c.handle.as_deref() == Some("ins")));
        assert_eq!(fx.store.count("roads"), 4);
    }

    #[test]
    fn insert_use_existing_duplicate_writes_nothing() {
        let fx = Fixture::new();
        let action = Action::Insert {
            handle: None,
            type_name: "roads".into(),
            features: vec![Feature::with_id("roads.new"), Feature::with_id("roads.a")],
            id_policy: Some(IdGeneration::UseExisting),
        };

        let report = fx.executor().apply(&action, 4, None);
        assert_eq!(failure_code(&report), ActionErrorCode::DuplicateIdentifier);
        assert_eq!(report.result.failure().unwrap().locator, "action[4]");
        assert!(!fx.store.exists(&FeatureId::new("roads.new")).unwrap());
    }

    #[test]
    fn insert_replace_duplicate_overwrites() {
        let fx = Fixture::new();
        let action = Action::Insert {
            handle: None,
            type_name: "roads".into(),
            features: vec![Feature::with_id("roads.a").property("kind", "bridge")],
            id_policy: Some(IdGeneration::ReplaceDuplicate),
        };

        let report = fx.executor().apply(&action, 0, None);
        assert!(report.result.is_success());
        assert_eq!(report.counts.replaced, 1);
        assert_eq!(report.counts.inserted, 0);
        assert!(report.correlations.is_empty());
        let stored = fx.store.get("roads", &FeatureId::new("roads.a")).unwrap();
        assert_eq!(stored.get("kind"), Some(&json!("bridge")));
    }

    #[test]
    fn insert_replace_duplicate_refuses_id_of_another_type() {
        let fx = Fixture::new();
        fx.store.register_type("rivers");
        fx.store
            .insert("rivers", &Feature::new(), Some(&FeatureId::new("x1")))
            .unwrap();
        let action = Action::Insert {
            handle: Some("i".into()),
            type_name: "roads".into(),
            features: vec![Feature::with_id("r9"), Feature::with_id("x1")],
            id_policy: Some(IdGeneration::ReplaceDuplicate),
        };

        let report = fx.executor().apply(&action, 0, None);
        assert_eq!(failure_code(&report), ActionErrorCode::DuplicateIdentifier);
        assert!(!fx.store.exists(&FeatureId::new("r9")).unwrap());
        assert_eq!(fx.store.count("roads"), 2);
        assert_eq!(fx.store.count("rivers"), 1);
    }

    #[test]
    fn insert_replace_duplicate_repeat_fails_with_or_without_token() {
        let fx = Fixture::new();
        let action = Action::Insert {
            handle: None,
            type_name: "roads".into(),
            features: vec![Feature::with_id("roads.n"), Feature::with_id("roads.n")],
            id_policy: Some(IdGeneration::ReplaceDuplicate),
        };
        let token = fx.lock(&["roads.b"]);

        for lock_token in [None, Some(&token)] {
            let report = fx.executor().apply(&action, 0, lock_token);
            assert_eq!(failure_code(&report), ActionErrorCode::DuplicateIdentifier);
            assert!(!fx.store.exists(&FeatureId::new("roads.n")).unwrap());
        }
    }

    #[test]
    fn insert_replace_duplicate_respects_locks() {
        let fx = Fixture::new();
        fx.lock(&["roads.a"]);
        let action = Action::Insert {
            handle: None,
            type_name: "roads".into(),
            features: vec![Feature::with_id("roads.a")],
            id_policy: Some(IdGeneration::ReplaceDuplicate),
        };

        let report = fx.executor().apply(&action, 0, None);
        assert_eq!(failure_code(&report), ActionErrorCode::FeatureLocked);
    }

    #[test]
    fn insert_into_unknown_type_is_storage_failure() {
        let fx = Fixture::new();
        let action = Action::Insert {
            handle: Some("i".into()),
            type_name: "rivers".into(),
            features: vec![Feature::new()],
            id_policy: None,
        };
        let report = fx.executor().apply(&action, 0, None);
        assert_eq!(failure_code(&report), ActionErrorCode::StorageFailure);
    }

    #[test]
    fn empty_insert_is_invalid() {
        let fx = Fixture::new();
        let action = Action::Insert {
            handle: None,
            type_name: "roads".into(),
            features: vec![],
            id_policy: None,
        };
        let report = fx.executor().apply(&action, 0, None);
        assert_eq!(failure_code(&report), ActionErrorCode::InvalidAction);
    }

    #[test]
    fn update_matching_nothing_is_success() {
        let fx = Fixture::new();
        let action = Action::Update {
            handle: None,
            type_name: "roads".into(),
            properties: vec![Property::set("lanes", 3)],
            filter: Filter::property_equals("kind", "ferry"),
        };
        let report = fx.executor().apply(&action, 0, None);
        assert_eq!(report, ActionReport::noop());
    }

    #[test]
    fn delete_on_unknown_type_is_success() {
        let fx = Fixture::new();
        let action = Action::Delete {
            handle: None,
            type_name: "rivers".into(),
            filter: Filter::All,
        };
        assert!(fx.executor().apply(&action, 0, None).result.is_success());
    }

    #[test]
    fn locked_feature_blocks_tokenless_action() {
        let fx = Fixture::new();
        fx.lock(&["roads.a"]);

        let report = fx.executor().apply(&delete_where("lane"), 0, None);
        let failure = report.result.failure().unwrap();
        assert_eq!(failure.code, ActionErrorCode::FeatureLocked);
        assert_eq!(failure.locator, "d1");
        assert!(failure.message.contains("roads.a"));
        assert_eq!(fx.store.count("roads"), 2);
    }

    #[test]
    fn token_must_hold_every_target() {
        let fx = Fixture::new();
        let token = fx.lock(&["roads.a"]);
        let action = Action::Update {
            handle: None,
            type_name: "roads".into(),
            properties: vec![Property::set("lanes", 1)],
            filter: Filter::All,
        };

        let report = fx.executor().apply(&action, 0, Some(&token));
        assert_eq!(failure_code(&report), ActionErrorCode::LockNotHeld);
        let untouched = fx.store.get("roads", &FeatureId::new("roads.a")).unwrap();
        assert_eq!(untouched.get("lanes"), None);
    }

    #[test]
    fn token_holder_may_delete() {
        let fx = Fixture::new();
        let token = fx.lock(&["roads.a"]);

        let report = fx.executor().apply(&delete_where("lane"), 0, Some(&token));
        assert!(report.result.is_success());
        assert_eq!(report.counts.deleted, 1);
        assert!(report.touched.contains(&FeatureId::new("roads.a")));
    }

    #[test]
    fn replace_keeps_ids() {
        let fx = Fixture::new();
        let action = Action::Replace {
            handle: None,
            type_name: "roads".into(),
            feature: Feature::new().property("kind", "tunnel"),
            filter: Filter::ids(["roads.b"]),
        };
        let report = fx.executor().apply(&action, 0, None);
        assert_eq!(report.counts.replaced, 1);
        let stored = fx.store.get("roads", &FeatureId::new("roads.b")).unwrap();
        assert_eq!(stored.get("kind"), Some(&json!("tunnel")));
    }

    #[test]
    fn native_dispatch_rules() {
        let mut fx = Fixture::new();
        fx.natives.register("acme", |command: &str| match command {
            "OK" => Ok(()),
            _ => Err(NativeError::Failed("nope".into())),
        });
        let native = |vendor: &str, command: &str, safe| Action::Native {
            handle: None,
            vendor_id: vendor.into(),
            safe_to_ignore: safe,
            command: command.into(),
        };
        let ex = fx.executor();

        assert!(ex.apply(&native("acme", "OK", false), 0, None).result.is_success());
        assert!(ex.apply(&native("other", "X", true), 0, None).result.is_success());
        assert_eq!(
            failure_code(&ex.apply(&native("other", "X", false), 0, None)),
            ActionErrorCode::UnrecognizedNativeCommand
        );
        assert_eq!(
            failure_code(&ex.apply(&native("acme", "BAD", true), 0, None)),
            ActionErrorCode::NativeCommandFailed
        );
    }

    struct BrokenStore;

    impl FeatureStore for BrokenStore {
        fn read(&self, _: &str, _: &Filter) -> StoreResult<BTreeSet<FeatureId>> {
            Err(StoreError::backend("disk on fire"))
        }
        fn fetch(&self, _: &str, _: &Filter) -> StoreResult<Vec<Feature>> {
            Err(StoreError::backend("disk on fire"))
        }
        fn insert(&self, _: &str, _: &Feature, _: Option<&FeatureId>) -> StoreResult<FeatureId> {
            Err(StoreError::backend("disk on fire"))
        }
        fn replace(&self, _: &str, _: &FeatureId, _: &Feature) -> StoreResult<()> {
            Err(StoreError::backend("disk on fire"))
        }
        fn update(&self, _: &str, _: &Filter, _: &[Property]) -> StoreResult<usize> {
            Err(StoreError::backend("disk on fire"))
        }
        fn delete(&self, _: &str, _: &Filter) -> StoreResult<usize> {
            Err(StoreError::backend("disk on fire"))
        }
        fn exists(&self, _: &FeatureId) -> StoreResult<bool> {
            Err(StoreError::backend("disk on fire"))
        }
    }

    #[test]
    fn storage_errors_become_failures() {
        let locks = LockManager::new(Arc::new(ManualClock::new()), &EngineConfig::default());
        let natives = NativeRegistry::new();
        let ex = ActionExecutor::new(&BrokenStore, &locks, &natives);

        let report = ex.apply(&delete_where("lane"), 0, None);
        let failure = report.result.failure().unwrap();
        assert_eq!(failure.code, ActionErrorCode::StorageFailure);
        assert!(failure.message.contains("disk on fire"));
        assert!(matches!(report.result, ActionResult::Failure(_)));
    }
}
