//! # wfstx Core
//!
//! Transaction execution and feature-locking engine for a transactional
//! web feature service (WFS-T).
//!
//! This crate provides:
//! - Batches of insert, update, delete, replace and native actions, run in
//!   order with per-action failure isolation
//! - Optimistic, expiring, token-based feature locks (ALL/SOME)
//! - `LockFeature` and `GetFeatureWithLock` request handling
//! - Identifier policies for inserts (generate, use, replace duplicate)
//!
//! Storage is a collaborator behind [`FeatureStore`]; the engine decides
//! which store calls to make and never rolls them back.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use wfstx_core::{
//!     Action, EngineConfig, FeatureService, Filter, LockFeatureRequest, LockSpec,
//!     TransactionRequest,
//! };
//! use wfstx_storage::{Feature, FeatureId, FeatureStore, InMemoryFeatureStore};
//!
//! let store = InMemoryFeatureStore::with_types(["roads"]);
//! store
//!     .insert("roads", &Feature::new(), Some(&FeatureId::new("roads.1")))
//!     .unwrap();
//! let service = FeatureService::new(Arc::new(store), EngineConfig::default()).unwrap();
//!
//! // Lock the feature, then delete it under the lock.
//! let lock = service
//!     .lock_feature(&LockFeatureRequest {
//!         locks: vec![LockSpec {
//!             handle: None,
//!             type_name: "roads".into(),
//!             filter: Filter::ids(["roads.1"]),
//!         }],
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! let request = TransactionRequest::new()
//!     .lock_id(lock.lock_id.as_str())
//!     .action(Action::Delete {
//!         handle: Some("d1".into()),
//!         type_name: "roads".into(),
//!         filter: Filter::ids(["roads.1"]),
//!     });
//! let response = service.transaction(&request).unwrap();
//! assert_eq!(response.summary.total_deleted, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod clock;
mod config;
mod error;
mod executor;
mod identifier;
mod lock;
mod locking;
mod native;
mod service;
mod transaction;
mod types;

pub use action::{
    Action, ActionErrorCode, ActionFailure, ActionKind, ActionReport, ActionResult,
    InsertCorrelation, MutationCounts,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{CoreError, CoreResult};
pub use executor::ActionExecutor;
pub use identifier::{correlate, IdAssignment, IdentifierReconciler, ReconcileError};
pub use lock::{AcquireOutcome, LockManager, LockRecord, LockSweeper};
pub use locking::{
    GetFeatureWithLockRequest, GetFeatureWithLockResponse, LockCoordinator, LockFeatureRequest,
    LockFeatureResponse, LockSpec, Query,
};
pub use native::{NativeError, NativeHandler, NativeRegistry};
pub use service::FeatureService;
pub use transaction::{
    TransactionCoordinator, TransactionPhase, TransactionRequest, TransactionResponse,
    TransactionState, TransactionStatus, TransactionSummary,
};
pub use types::{AllSome, IdGeneration, LockToken, ResultType};

// Re-export the storage model the engine is expressed in.
pub use wfstx_storage::{Feature, FeatureId, FeatureStore, Filter, Property};

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
