//! Error types for feature store operations.

use crate::feature::FeatureId;
use thiserror::Error;

/// Result type for feature store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a feature store can report.
///
/// The transaction engine never lets these escape an action: they are
/// mapped into a per-action failure at the action boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The feature type is not known to the store.
    #[error("unknown feature type: {0}")]
    UnknownFeatureType(String),

    /// A feature with this id already exists.
    #[error("duplicate feature id: {0}")]
    DuplicateId(FeatureId),

    /// No feature with this id exists in the given type.
    #[error("feature not found: {id} in {type_name}")]
    NotFound {
        /// Feature type that was searched.
        type_name: String,
        /// The id that was not found.
        id: FeatureId,
    },

    /// The backing store failed.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a backend failure error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
