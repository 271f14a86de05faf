//! Identifier reconciliation for inserts.
//!
//! Decides, before anything is written, how each feature of an insert gets
//! its id: a store-generated one, the caller's own, or the caller's own
//! overwriting an existing feature.

use crate::action::{ActionErrorCode, InsertCorrelation};
use crate::types::IdGeneration;
use crate::FeatureId;
use std::collections::BTreeSet;
use thiserror::Error;
use wfstx_storage::{Feature, FeatureStore, Filter, StoreError};

/// How one inserted feature is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdAssignment {
    /// Let the store assign a fresh id.
    Generate,
    /// Create the feature under the caller's id.
    Use(FeatureId),
    /// Overwrite the existing feature with the caller's id.
    Overwrite(FeatureId),
}

impl IdAssignment {
    /// Returns the id of an existing feature this assignment overwrites.
    #[must_use]
    pub fn overwritten(&self) -> Option<&FeatureId> {
        match self {
            IdAssignment::Overwrite(id) => Some(id),
            _ => None,
        }
    }
}

/// Why an insert's identifiers cannot be reconciled.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The policy needs a caller id and the feature has none.
    #[error("feature {position} of the insert carries no id")]
    MissingIdentifier {
        /// Index of the feature within the insert payload.
        position: usize,
    },

    /// The caller id is already in use.
    #[error("feature id {0} already exists")]
    Duplicate(FeatureId),

    /// The store could not answer an existence check.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ReconcileError {
    /// Maps the error onto a per-action failure code.
    #[must_use]
    pub fn code(&self) -> ActionErrorCode {
        match self {
            ReconcileError::MissingIdentifier { .. } => ActionErrorCode::MissingIdentifier,
            ReconcileError::Duplicate(_) => ActionErrorCode::DuplicateIdentifier,
            ReconcileError::Storage(_) => ActionErrorCode::StorageFailure,
        }
    }
}

/// Resolves insert identifiers against a store.
#[derive(Clone, Copy)]
pub struct IdentifierReconciler<'a> {
    store: &'a dyn FeatureStore,
}

impl<'a> IdentifierReconciler<'a> {
    /// Creates a reconciler checking ids against `store`.
    pub fn new(store: &'a dyn FeatureStore) -> Self {
        Self { store }
    }

    /// Plans the id of every feature of an insert into `type_name`, in order.
    ///
    /// - `GenerateNew` ignores caller ids.
    /// - `UseExisting` requires caller ids that are neither live nor repeated
    ///   within the payload.
    /// - `ReplaceDuplicate` requires caller ids; ids live in `type_name` are
    ///   overwritten.
    ///
    /// Under either caller-id policy, an id repeated within the payload or
    /// held by a feature of another type is a duplicate.
    ///
    /// # Errors
    ///
    /// Returns the first violation found; no assignment is returned for a
    /// payload that cannot be inserted in full.
    pub fn reconcile(
        &self,
        type_name: &str,
        policy: IdGeneration,
        features: &[Feature],
    ) -> Result<Vec<IdAssignment>, ReconcileError> {
        if policy == IdGeneration::GenerateNew {
            return Ok(vec![IdAssignment::Generate; features.len()]);
        }

        let mut seen = BTreeSet::new();
        let mut plan = Vec::with_capacity(features.len());
        for (position, feature) in features.iter().enumerate() {
            let id = feature
                .id
                .clone()
                .ok_or(ReconcileError::MissingIdentifier { position })?;

            if !seen.insert(id.clone()) {
                return Err(ReconcileError::Duplicate(id));
            }

            let assignment = if !self.store.exists(&id)? {
                IdAssignment::Use(id)
            } else if policy == IdGeneration::ReplaceDuplicate && self.holds(type_name, &id)? {
                IdAssignment::Overwrite(id)
            } else {
                return Err(ReconcileError::Duplicate(id));
            };
            plan.push(assignment);
        }
        Ok(plan)
    }

    fn holds(&self, type_name: &str, id: &FeatureId) -> Result<bool, StoreError> {
        let found = self
            .store
            .read(type_name, &Filter::Ids(BTreeSet::from([id.clone()])))?;
        Ok(!found.is_empty())
    }
}

impl std::fmt::Debug for IdentifierReconciler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierReconciler").finish_non_exhaustive()
    }
}

/// Tags created feature ids with the insert's handle, preserving order.
#[must_use]
pub fn correlate(created: &[FeatureId], handle: Option<&str>) -> Vec<InsertCorrelation> {
    created
        .iter()
        .map(|id| InsertCorrelation {
            feature_id: id.clone(),
            handle: handle.map(str::to_string),
        })
        .collect()
}
