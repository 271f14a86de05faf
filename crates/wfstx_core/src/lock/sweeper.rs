//! Background expiry sweep.

use crate::error::{CoreError, CoreResult};
use crate::lock::LockManager;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A thread that periodically purges lapsed locks.
///
/// Expiry is already honored by [`LockManager::validate`]; the sweeper only
/// keeps the table from accumulating dead records. Dropping the sweeper
/// stops the thread.
#[derive(Debug)]
pub struct LockSweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LockSweeper {
    /// Starts sweeping `locks` every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is zero or the thread cannot be
    /// spawned.
    pub fn start(locks: Arc<LockManager>, interval: Duration) -> CoreResult<Self> {
        if interval.is_zero() {
            return Err(CoreError::invalid_operation("sweep interval must be non-zero"));
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("wfstx-lock-sweeper".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = locks.sweep();
                        if removed > 0 {
                            info!(removed, "swept expired feature locks");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| CoreError::invalid_operation(format!("cannot start sweeper: {e}")))?;

        debug!(?interval, "lock sweeper started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("lock sweeper thread panicked");
            }
            debug!("lock sweeper stopped");
        }
    }

    /// Returns true while the thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LockSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
