//! Feature service: the engine's entry point.

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::{LockManager, LockSweeper};
use crate::locking::{
    GetFeatureWithLockRequest, GetFeatureWithLockResponse, LockCoordinator, LockFeatureRequest,
    LockFeatureResponse,
};
use crate::native::{NativeHandler, NativeRegistry};
use crate::transaction::{TransactionCoordinator, TransactionRequest, TransactionResponse};
use crate::types::LockToken;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use wfstx_storage::FeatureStore;

/// A transactional, lockable feature service over one store.
///
/// The service owns the lock table for its whole lifetime. Construct it
/// once, register native handlers, then share it (`Arc<FeatureService>`)
/// between request workers.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use wfstx_core::{Action, EngineConfig, Feature, FeatureService, TransactionRequest};
/// use wfstx_storage::InMemoryFeatureStore;
///
/// let store = Arc::new(InMemoryFeatureStore::with_types(["roads"]));
/// let service = FeatureService::new(store, EngineConfig::default()).unwrap();
///
/// let request = TransactionRequest::new().action(Action::Insert {
///     handle: Some("a1".into()),
///     type_name: "roads".into(),
///     features: vec![Feature::new().property("name", "Main St")],
///     id_policy: None,
/// });
/// let response = service.transaction(&request).unwrap();
/// assert_eq!(response.summary.total_inserted, 1);
/// ```
pub struct FeatureService {
    store: Arc<dyn FeatureStore>,
    locks: Arc<LockManager>,
    natives: NativeRegistry,
    config: EngineConfig,
    sweeper: Mutex<Option<LockSweeper>>,
    closed: AtomicBool,
}

impl FeatureService {
    /// Creates a service on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock sweeper cannot be started.
    pub fn new(store: Arc<dyn FeatureStore>, config: EngineConfig) -> CoreResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates a service on the given clock.
    ///
    /// A zero `sweep_interval` leaves the sweeper off; lapsed locks are then
    /// only purged lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock sweeper cannot be started.
    pub fn with_clock(
        store: Arc<dyn FeatureStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let locks = Arc::new(LockManager::new(clock, &config));
        let sweeper = if config.sweep_interval.is_zero() {
            None
        } else {
            Some(LockSweeper::start(Arc::clone(&locks), config.sweep_interval)?)
        };

        info!(
            default_lock_expiry = ?config.default_lock_expiry,
            sweeper = sweeper.is_some(),
            "feature service started"
        );
        Ok(Self {
            store,
            locks,
            natives: NativeRegistry::new(),
            config,
            sweeper: Mutex::new(sweeper),
            closed: AtomicBool::new(false),
        })
    }

    /// Registers a handler for a vendor's native commands.
    pub fn register_native(
        &mut self,
        vendor_id: impl Into<String>,
        handler: impl NativeHandler + 'static,
    ) {
        self.natives.register(vendor_id, handler);
    }

    /// Executes a transaction.
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::execute`]; also
    /// [`CoreError::ServiceClosed`] after shutdown.
    pub fn transaction(&self, request: &TransactionRequest) -> CoreResult<TransactionResponse> {
        self.ensure_open()?;
        TransactionCoordinator::new(
            self.store.as_ref(),
            &self.locks,
            &self.natives,
            self.config.default_release_action,
        )
        .execute(request)
    }

    /// Locks features, or renews an existing lock.
    ///
    /// # Errors
    ///
    /// See [`LockCoordinator::lock_feature`]; also
    /// [`CoreError::ServiceClosed`] after shutdown.
    pub fn lock_feature(&self, request: &LockFeatureRequest) -> CoreResult<LockFeatureResponse> {
        self.ensure_open()?;
        self.lock_coordinator().lock_feature(request)
    }

    /// Fetches features and locks them.
    ///
    /// # Errors
    ///
    /// See [`LockCoordinator::get_feature_with_lock`]; also
    /// [`CoreError::ServiceClosed`] after shutdown.
    pub fn get_feature_with_lock(
        &self,
        request: &GetFeatureWithLockRequest,
    ) -> CoreResult<GetFeatureWithLockResponse> {
        self.ensure_open()?;
        self.lock_coordinator().get_feature_with_lock(request)
    }

    /// Releases every feature held by a lock. Returns the features freed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a malformed lock id,
    /// [`CoreError::UnknownLock`] for an unknown or lapsed one, and
    /// [`CoreError::ServiceClosed`] after shutdown.
    pub fn release_lock(&self, lock_id: &str) -> CoreResult<BTreeSet<crate::FeatureId>> {
        self.ensure_open()?;
        if !LockToken::is_well_formed(lock_id) {
            return Err(CoreError::validation(format!("malformed lock id {lock_id:?}")));
        }
        self.locks.release_all(&LockToken::new(lock_id))
    }

    /// Stops the sweeper and drops every lock. Idempotent.
    ///
    /// Every request after shutdown fails with [`CoreError::ServiceClosed`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
        let dropped = self.locks.clear();
        info!(dropped_locks = dropped, "feature service shut down");
    }

    /// Returns true once [`Self::shutdown`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the store the service writes through.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn FeatureStore> {
        &self.store
    }

    /// Returns the lock manager.
    #[must_use]
    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lock_coordinator(&self) -> LockCoordinator<'_> {
        LockCoordinator::new(
            self.store.as_ref(),
            &self.locks,
            self.config.default_lock_action,
        )
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::ServiceClosed);
        }
        Ok(())
    }
}

impl Drop for FeatureService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FeatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureService")
            .field("locks", &self.locks)
            .field("natives", &self.natives)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
