//! Property tests of the locking and transaction invariants.

use proptest::prelude::*;
use std::collections::BTreeSet;
use wfstx_core::{
    ActionResult, AllSome, CoreError, FeatureId, Filter, LockFeatureResponse, TransactionRequest,
    TransactionStatus,
};
use wfstx_testkit::prelude::*;

const POOL: usize = 8;

fn lock_ids(
    fixture: &TestService,
    ids: &BTreeSet<FeatureId>,
    action: AllSome,
) -> Result<LockFeatureResponse, CoreError> {
    fixture.lock_feature(&lock_request(Filter::Ids(ids.clone()), action))
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn overlapping_all_acquisitions_exclude_each_other(
        first in id_set_strategy(POOL, 4),
        second in id_set_strategy(POOL, 4),
    ) {
        let fixture = TestService::seeded(POOL);
        prop_assert!(lock_ids(&fixture, &first, AllSome::All).is_ok());

        let overlaps = !first.is_disjoint(&second);
        let outcome = lock_ids(&fixture, &second, AllSome::All);
        prop_assert_eq!(outcome.is_err(), overlaps);
        if let Err(CoreError::LockConflict { already_locked }) = outcome {
            let expected: Vec<_> = first.intersection(&second).cloned().collect();
            prop_assert_eq!(already_locked, expected);
        }
    }

    #[test]
    fn some_splits_exactly(
        held in id_set_strategy(POOL, 4),
        wanted in id_set_strategy(POOL, 4),
    ) {
        let fixture = TestService::seeded(POOL);
        lock_ids(&fixture, &held, AllSome::All).unwrap();

        let response = lock_ids(&fixture, &wanted, AllSome::Some).unwrap();
        let expected_locked: BTreeSet<_> = wanted.difference(&held).cloned().collect();
        let expected_skipped: BTreeSet<_> = wanted.intersection(&held).cloned().collect();
        prop_assert_eq!(response.locked, expected_locked);
        prop_assert_eq!(response.not_locked, expected_skipped);
    }

    #[test]
    fn release_leaves_nothing_behind(ids in id_set_strategy(POOL, 5)) {
        let fixture = TestService::seeded(POOL);
        let lock = lock_ids(&fixture, &ids, AllSome::All).unwrap();

        fixture.release_lock(lock.lock_id.as_str()).unwrap();
        prop_assert_eq!(fixture.locks().lock_count(), 0);
        prop_assert_eq!(fixture.locks().token_count(), 0);

        let again = lock_ids(&fixture, &ids, AllSome::All).unwrap();
        prop_assert_eq!(again.locked, ids);
    }

    #[test]
    fn expired_locks_never_validate(
        ids in id_set_strategy(POOL, 3),
        expiry in expiry_strategy(),
    ) {
        let fixture = TestService::seeded(POOL);
        let mut request = lock_request(Filter::Ids(ids.clone()), AllSome::All);
        request.expiry = Some(expiry);
        let lock = fixture.lock_feature(&request).unwrap();

        fixture.advance(expiry);
        for id in &ids {
            prop_assert!(!fixture.locks().validate(&lock.lock_id, id));
        }
        prop_assert!(lock_ids(&fixture, &ids, AllSome::All).is_ok());
    }

    #[test]
    fn summary_counts_only_successes(actions in action_batch_strategy(POOL, 1, 8)) {
        let fixture = TestService::seeded(POOL);
        let mut request = TransactionRequest::new();
        request.actions = actions.clone();
        let response = fixture.transaction(&request).unwrap();

        prop_assert_eq!(response.action_results.len(), actions.len());
        let failures = response
            .action_results
            .iter()
            .filter(|r| matches!(r, ActionResult::Failure(_)))
            .count();
        prop_assert_eq!(response.results.len(), failures);

        let expected = match failures {
            0 => TransactionStatus::Success,
            n if n == actions.len() => TransactionStatus::Failed,
            _ => TransactionStatus::Partial,
        };
        prop_assert_eq!(response.status, expected);
        prop_assert_eq!(
            response.insert_correlations.len(),
            response.summary.total_inserted
        );

        // A failed action must leave the store as it found it, so the total
        // number of roads moves by exactly inserted - deleted.
        let live = fixture.road_ids().len();
        prop_assert_eq!(
            live + response.summary.total_deleted,
            POOL + response.summary.total_inserted
        );
    }
}
