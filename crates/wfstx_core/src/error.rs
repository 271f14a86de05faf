//! Error types for the wfstx engine.
//!
//! These are *request-level* errors: they abort a whole transaction before
//! any action runs, or fail a lock request outright. Failures local to a
//! single action are reported through [`crate::ActionFailure`] instead.

use crate::FeatureId;
use thiserror::Error;
use wfstx_storage::StoreError;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that reject a whole request.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request is malformed.
    #[error("invalid request: {message}")]
    Validation {
        /// Description of what is wrong.
        message: String,
    },

    /// The lock id is unknown or has expired.
    #[error("unknown or expired lock id: {lock_id}")]
    UnknownLock {
        /// The lock id the caller presented.
        lock_id: String,
    },

    /// Some requested features are locked by another holder (ALL policy).
    #[error("cannot lock all features: {} already locked", already_locked.len())]
    LockConflict {
        /// Features that were already under someone else's lock.
        already_locked: Vec<FeatureId>,
    },

    /// Storage failed while answering a lock or query request.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The service has been shut down.
    #[error("service is closed")]
    ServiceClosed,
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unknown lock error.
    pub fn unknown_lock(lock_id: impl Into<String>) -> Self {
        Self::UnknownLock {
            lock_id: lock_id.into(),
        }
    }

    /// Creates a lock conflict error.
    pub fn lock_conflict(already_locked: impl IntoIterator<Item = FeatureId>) -> Self {
        Self::LockConflict {
            already_locked: already_locked.into_iter().collect(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the caller is at fault (the request could succeed if
    /// changed or retried later).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation { .. }
                | CoreError::UnknownLock { .. }
                | CoreError::LockConflict { .. }
        )
    }
}
