//! Property-based test generators using proptest.
//!
//! Strategies produce feature ids, id sets and action batches addressed to
//! the seeded `roads` type of [`crate::TestService`].

use crate::fixtures::{seed_id, ROADS};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;
use wfstx_core::{Action, AllSome, Feature, FeatureId, Filter, IdGeneration, Property};

/// Strategy for ids of seeded roads, `roads.0` .. `roads.<pool-1>`.
pub fn seeded_id_strategy(pool: usize) -> impl Strategy<Value = FeatureId> {
    (0..pool.max(1)).prop_map(seed_id)
}

/// Strategy for non-empty sets of seeded road ids.
pub fn id_set_strategy(
    pool: usize,
    max_len: usize,
) -> impl Strategy<Value = BTreeSet<FeatureId>> {
    let pool = pool.max(1);
    prop::collection::btree_set(seeded_id_strategy(pool), 1..=max_len.clamp(1, pool))
}

/// Strategy for ALL/SOME.
pub fn all_some_strategy() -> impl Strategy<Value = AllSome> {
    prop_oneof![Just(AllSome::All), Just(AllSome::Some)]
}

/// Strategy for lock lifetimes between 1 s and 10 min.
pub fn expiry_strategy() -> impl Strategy<Value = Duration> {
    (1u64..=600).prop_map(Duration::from_secs)
}

/// Strategy for property assignments.
pub fn property_strategy() -> impl Strategy<Value = Property> {
    (
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        prop::option::of(any::<i64>()),
    )
        .prop_map(|(name, value)| match value {
            Some(value) => Property::set(name, value),
            None => Property::remove(name),
        })
}

/// Strategy for identifier policies.
pub fn id_policy_strategy() -> impl Strategy<Value = Option<IdGeneration>> {
    prop_oneof![
        Just(None),
        Just(Some(IdGeneration::GenerateNew)),
        Just(Some(IdGeneration::UseExisting)),
        Just(Some(IdGeneration::ReplaceDuplicate)),
    ]
}

/// Strategy for one action over seeded roads.
///
/// Inserts carry seeded ids, so `UseExisting` and `ReplaceDuplicate` hit
/// both fresh and live ids.
pub fn action_strategy(pool: usize) -> impl Strategy<Value = Action> {
    let handle =
        || prop::option::of(prop::string::string_regex("h[0-9]{1,3}").expect("Invalid regex"));
    let ids = || id_set_strategy(pool * 2, 3).prop_map(Filter::Ids);

    prop_oneof![
        2 => (
            handle(),
            prop::collection::vec(seeded_id_strategy(pool * 2), 1..3),
            id_policy_strategy()
        )
            .prop_map(|(handle, ids, id_policy)| Action::Insert {
                handle,
                type_name: ROADS.to_string(),
                features: ids.into_iter().map(Feature::with_id).collect(),
                id_policy,
            }),
        3 => (handle(), prop::collection::vec(property_strategy(), 1..3), ids())
            .prop_map(|(handle, properties, filter)| Action::Update {
                handle,
                type_name: ROADS.to_string(),
                properties,
                filter,
            }),
        1 => (handle(), ids()).prop_map(|(handle, filter)| Action::Delete {
            handle,
            type_name: ROADS.to_string(),
            filter,
        }),
        1 => (handle(), ids()).prop_map(|(handle, filter)| Action::Replace {
            handle,
            type_name: ROADS.to_string(),
            feature: Feature::new().property("replaced", true),
            filter,
        }),
    ]
}

/// Strategy for a batch of actions.
pub fn action_batch_strategy(
    pool: usize,
    min_actions: usize,
    max_actions: usize,
) -> impl Strategy<Value = Vec<Action>> {
    prop::collection::vec(action_strategy(pool), min_actions..max_actions)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn seeded_ids_stay_in_pool(id in seeded_id_strategy(5)) {
            let index: usize = id.as_str().trim_start_matches("roads.").parse().unwrap();
            prop_assert!(index < 5);
        }

        #[test]
        fn id_sets_are_bounded(ids in id_set_strategy(10, 4)) {
            prop_assert!(!ids.is_empty());
            prop_assert!(ids.len() <= 4);
        }

        #[test]
        fn actions_target_roads(action in action_strategy(4)) {
            prop_assert!(action.kind() != wfstx_core::ActionKind::Native);
        }
    }
}
