//! Transaction coordinator.

use crate::action::{Action, ActionReport, ActionResult, MutationCounts};
use crate::error::{CoreError, CoreResult};
use crate::executor::ActionExecutor;
use crate::lock::LockManager;
use crate::native::NativeRegistry;
use crate::transaction::response::{
    TransactionRequest, TransactionResponse, TransactionStatus, TransactionSummary,
};
use crate::transaction::state::TransactionState;
use crate::types::{AllSome, LockToken};
use std::collections::BTreeSet;
use tracing::{debug, warn};
use wfstx_storage::FeatureStore;

/// Runs a transaction request from admission to lock release.
///
/// The coordinator provides:
/// - Lock id admission: malformed ids reject, unknown ids reject when an
///   action needs them
/// - Strictly ordered execution with per-action failure isolation
/// - Summary, overall status and insert correlations
/// - Release of the presented lock under ALL or SOME
pub struct TransactionCoordinator<'a> {
    store: &'a dyn FeatureStore,
    locks: &'a LockManager,
    natives: &'a NativeRegistry,
    default_release: AllSome,
}

impl<'a> TransactionCoordinator<'a> {
    /// Creates a coordinator.
    pub fn new(
        store: &'a dyn FeatureStore,
        locks: &'a LockManager,
        natives: &'a NativeRegistry,
        default_release: AllSome,
    ) -> Self {
        Self {
            store,
            locks,
            natives,
            default_release,
        }
    }

    /// Executes `request`.
    ///
    /// Failures of individual actions are reported in the response; they do
    /// not stop later actions and are never returned as errors.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a malformed lock id and
    /// [`CoreError::UnknownLock`] for an unknown or expired one when an
    /// action targets existing features. No action runs in either case.
    pub fn execute(&self, request: &TransactionRequest) -> CoreResult<TransactionResponse> {
        let mut state = TransactionState::new(request.actions.len());

        let token = match self.admit(request) {
            Ok(token) => token,
            Err(err) => {
                state.reject()?;
                warn!(handle = ?request.handle, error = %err, "transaction rejected");
                return Err(err);
            }
        };

        let executor = ActionExecutor::new(self.store, self.locks, self.natives);
        let mut counts = MutationCounts::default();
        let mut touched = BTreeSet::new();
        let mut insert_correlations = Vec::new();
        let mut failures = Vec::new();
        let mut action_results = Vec::with_capacity(request.actions.len());

        for (position, action) in request.actions.iter().enumerate() {
            state.begin_action(position)?;
            let ActionReport {
                result,
                counts: action_counts,
                touched: action_touched,
                correlations,
            } = executor.apply(action, position, token.as_ref());

            match &result {
                ActionResult::Success => {
                    counts.absorb(action_counts);
                    touched.extend(action_touched);
                    insert_correlations.extend(correlations);
                }
                ActionResult::Failure(failure) => failures.push(failure.clone()),
            }
            action_results.push(result);
        }

        state.summarize()?;
        let status = TransactionStatus::from_results(&action_results);

        if let Some(token) = &token {
            let policy = request.release_action.unwrap_or(self.default_release);
            self.locks.release(token, policy, &touched);
        }
        state.release()?;

        debug!(
            handle = ?request.handle,
            ?status,
            actions = action_results.len(),
            failed = failures.len(),
            "transaction complete"
        );
        Ok(TransactionResponse {
            handle: request.handle.clone(),
            status,
            summary: TransactionSummary::from(counts),
            results: failures,
            insert_correlations,
            action_results,
        })
    }

    /// Resolves the presented lock id, if any.
    fn admit(&self, request: &TransactionRequest) -> CoreResult<Option<LockToken>> {
        let Some(lock_id) = request.lock_id.as_deref() else {
            return Ok(None);
        };
        if !LockToken::is_well_formed(lock_id) {
            return Err(CoreError::validation(format!("malformed lock id {lock_id:?}")));
        }

        let token = LockToken::new(lock_id);
        if self.locks.resolve(&token) {
            return Ok(Some(token));
        }
        if request.actions.iter().any(Action::targets_existing) {
            return Err(CoreError::unknown_lock(lock_id));
        }
        debug!(lock_id, "ignoring unresolved lock id; no action needs it");
        Ok(None)
    }
}

impl std::fmt::Debug for TransactionCoordinator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("default_release", &self.default_release)
            .finish_non_exhaustive()
    }
}
