//! Transaction phase tracking.

use crate::error::{CoreError, CoreResult};
use std::fmt;
use tracing::debug;

/// Phase of a transaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    /// Request accepted, lock id not yet checked.
    Received,
    /// Executing the action at this position.
    Executing(usize),
    /// Every action ran; the summary is built.
    Summarized,
    /// Locks released (or nothing to release). Terminal.
    Released,
    /// Refused before any action ran. Terminal.
    Rejected,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionPhase::Received => f.write_str("received"),
            TransactionPhase::Executing(position) => write!(f, "executing[{position}]"),
            TransactionPhase::Summarized => f.write_str("summarized"),
            TransactionPhase::Released => f.write_str("released"),
            TransactionPhase::Rejected => f.write_str("rejected"),
        }
    }
}

/// Phase machine of one transaction.
///
/// Actions must be entered strictly in order, and every transition out of
/// order is refused.
#[derive(Debug)]
pub struct TransactionState {
    phase: TransactionPhase,
    action_count: usize,
}

impl TransactionState {
    /// Creates the state of a transaction with `action_count` actions.
    #[must_use]
    pub fn new(action_count: usize) -> Self {
        Self {
            phase: TransactionPhase::Received,
            action_count,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> TransactionPhase {
        self.phase
    }

    /// Returns true once the transaction is released or rejected.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            TransactionPhase::Released | TransactionPhase::Rejected
        )
    }

    /// Enters execution of the action at `position`.
    pub fn begin_action(&mut self, position: usize) -> CoreResult<()> {
        let in_order = match self.phase {
            TransactionPhase::Received => position == 0,
            TransactionPhase::Executing(current) => position == current + 1,
            _ => false,
        };
        if !in_order || position >= self.action_count {
            return Err(self.refuse(TransactionPhase::Executing(position)));
        }
        self.advance(TransactionPhase::Executing(position));
        Ok(())
    }

    /// Marks every action as run.
    pub fn summarize(&mut self) -> CoreResult<()> {
        let done = match self.phase {
            TransactionPhase::Received => self.action_count == 0,
            TransactionPhase::Executing(current) => current + 1 == self.action_count,
            _ => false,
        };
        if !done {
            return Err(self.refuse(TransactionPhase::Summarized));
        }
        self.advance(TransactionPhase::Summarized);
        Ok(())
    }

    /// Marks the post-transaction lock release as done.
    pub fn release(&mut self) -> CoreResult<()> {
        if self.phase != TransactionPhase::Summarized {
            return Err(self.refuse(TransactionPhase::Released));
        }
        self.advance(TransactionPhase::Released);
        Ok(())
    }

    /// Rejects the transaction before any action runs.
    pub fn reject(&mut self) -> CoreResult<()> {
        if self.phase != TransactionPhase::Received {
            return Err(self.refuse(TransactionPhase::Rejected));
        }
        self.advance(TransactionPhase::Rejected);
        Ok(())
    }

    fn advance(&mut self, next: TransactionPhase) {
        debug!(from = %self.phase, to = %next, "transaction phase");
        self.phase = next;
    }

    fn refuse(&self, next: TransactionPhase) -> CoreError {
        CoreError::invalid_operation(format!(
            "transaction cannot move from {} to {next}",
            self.phase
        ))
    }
}
