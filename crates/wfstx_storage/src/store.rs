//! Feature store trait definition.

use crate::error::StoreResult;
use crate::feature::{Feature, FeatureId, Property};
use crate::filter::Filter;
use std::collections::BTreeSet;

/// The persistence collaborator the transaction engine writes through.
///
/// Stores own filter evaluation and id assignment. The engine only decides
/// *which* calls to make and in what order; it never inspects how features
/// are kept.
///
/// # Invariants
///
/// - `insert` with `id = None` returns an id not currently in use
/// - `insert` with `id = Some(..)` fails with [`StoreError::DuplicateId`]
///   if the id is live
/// - `read`, `update` and `delete` on an unknown type behave as on an empty
///   type (zero matches, no error)
/// - Stores must be `Send + Sync`; every call may come from any worker
///
/// # Implementors
///
/// - [`super::InMemoryFeatureStore`] - reference store for tests and demos
///
/// [`StoreError::DuplicateId`]: crate::StoreError::DuplicateId
pub trait FeatureStore: Send + Sync {
    /// Returns the ids of the features of `type_name` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn read(&self, type_name: &str, filter: &Filter) -> StoreResult<BTreeSet<FeatureId>>;

    /// Returns the features of `type_name` matching `filter`, ids filled in,
    /// ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn fetch(&self, type_name: &str, filter: &Filter) -> StoreResult<Vec<Feature>>;

    /// Creates a feature and returns its id.
    ///
    /// With `id = None` the store generates a fresh id; the feature body's own
    /// `id` field is ignored either way.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The feature type is unknown
    /// - `id` is already in use
    /// - The backing store fails
    fn insert(&self, type_name: &str, feature: &Feature, id: Option<&FeatureId>)
        -> StoreResult<FeatureId>;

    /// Overwrites the properties of an existing feature, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the feature does not exist in `type_name` or the
    /// backing store fails.
    fn replace(&self, type_name: &str, id: &FeatureId, feature: &Feature) -> StoreResult<()>;

    /// Applies property assignments to every feature matching `filter`.
    ///
    /// Returns the number of features changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn update(&self, type_name: &str, filter: &Filter, properties: &[Property])
        -> StoreResult<usize>;

    /// Deletes every feature matching `filter`.
    ///
    /// Returns the number of features removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn delete(&self, type_name: &str, filter: &Filter) -> StoreResult<usize>;

    /// Checks whether a feature id is live in any type.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn exists(&self, id: &FeatureId) -> StoreResult<bool>;
}
