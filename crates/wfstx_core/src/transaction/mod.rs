//! Transaction execution.
//!
//! A transaction is a batch of write actions run strictly in order:
//! - **Admission**: a presented lock id is checked before anything runs
//! - **Isolation**: a failed action never stops the ones after it
//! - **Reporting**: per-action results, totals and insert correlations
//! - **Release**: the presented lock is released, ALL or SOME
//!
//! There is no rollback. Mutations of successful actions stay applied even
//! when siblings fail.

mod coordinator;
mod response;
mod state;

pub use coordinator::TransactionCoordinator;
pub use response::{TransactionRequest, TransactionResponse, TransactionStatus, TransactionSummary};
pub use state::{TransactionPhase, TransactionState};
