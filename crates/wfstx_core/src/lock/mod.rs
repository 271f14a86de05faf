//! Feature locking.
//!
//! Locks are optimistic, token-based and expiring:
//! - **Acquire**: lock a feature set under a fresh token, ALL or SOME
//! - **Validate**: check a token still holds a feature before mutating it
//! - **Release**: drop all of a token's locks, or only the touched ones
//! - **Expire**: lapsed locks never validate and are swept away

mod manager;
mod sweeper;
mod table;

pub use manager::{AcquireOutcome, LockManager};
pub use sweeper::LockSweeper;
pub use table::LockRecord;
