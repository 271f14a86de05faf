//! Transaction request and response types.

use crate::action::{Action, ActionFailure, ActionResult, InsertCorrelation, MutationCounts};
use crate::types::AllSome;
use serde::{Deserialize, Serialize};

/// A batch of write actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Client correlation string, echoed in the response.
    #[serde(default)]
    pub handle: Option<String>,
    /// Token of a previous lock request, authorizing changes to its features.
    #[serde(default)]
    pub lock_id: Option<String>,
    /// What to release after execution; the configured default when absent.
    #[serde(default)]
    pub release_action: Option<AllSome>,
    /// Actions, executed in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl TransactionRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request handle.
    #[must_use]
    pub fn handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Presents a lock id.
    #[must_use]
    pub fn lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }

    /// Sets the release action.
    #[must_use]
    pub fn release_action(mut self, action: AllSome) -> Self {
        self.release_action = Some(action);
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Totals over the successful actions of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Features created.
    pub total_inserted: usize,
    /// Features updated.
    pub total_updated: usize,
    /// Features deleted.
    pub total_deleted: usize,
    /// Features replaced.
    pub total_replaced: usize,
}

impl From<MutationCounts> for TransactionSummary {
    fn from(counts: MutationCounts) -> Self {
        Self {
            total_inserted: counts.inserted,
            total_updated: counts.updated,
            total_deleted: counts.deleted,
            total_replaced: counts.replaced,
        }
    }
}

/// Overall outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    /// No action failed.
    Success,
    /// Every action failed.
    Failed,
    /// Some actions failed, some did not.
    Partial,
}

impl TransactionStatus {
    /// Derives the status from per-action results.
    #[must_use]
    pub fn from_results(results: &[ActionResult]) -> Self {
        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed == 0 {
            TransactionStatus::Success
        } else if failed == results.len() {
            TransactionStatus::Failed
        } else {
            TransactionStatus::Partial
        }
    }
}

/// Report of a transaction that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// The request handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Overall status.
    pub status: TransactionStatus,
    /// Totals over successful actions.
    pub summary: TransactionSummary,
    /// Failed actions, in execution order.
    pub results: Vec<ActionFailure>,
    /// Created features, in creation order.
    pub insert_correlations: Vec<InsertCorrelation>,
    /// Result of every action, by position.
    pub action_results: Vec<ActionResult>,
}

impl TransactionResponse {
    /// Returns true if no action failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }
}
