//! Vendor extension point for `Native` actions.
//!
//! Handlers register under a vendor id. A native action is routed to the
//! handler for its vendor id; the handler decides whether it understands
//! the command.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Why a native command was not executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// No handler understands the command.
    #[error("unrecognized native command for vendor {vendor_id}")]
    Unrecognized {
        /// Vendor the command was addressed to.
        vendor_id: String,
    },

    /// The handler understood the command but could not carry it out.
    #[error("native command failed: {0}")]
    Failed(String),
}

/// A vendor's native command handler.
pub trait NativeHandler: Send + Sync {
    /// Executes `command`.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Unrecognized`] for commands the handler does not
    /// know, [`NativeError::Failed`] if a known command fails.
    fn execute(&self, command: &str) -> Result<(), NativeError>;
}

impl<F> NativeHandler for F
where
    F: Fn(&str) -> Result<(), NativeError> + Send + Sync,
{
    fn execute(&self, command: &str) -> Result<(), NativeError> {
        self(command)
    }
}

/// Dispatch table from vendor id to handler.
#[derive(Default)]
pub struct NativeRegistry {
    handlers: HashMap<String, Box<dyn NativeHandler>>,
}

impl NativeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the vendor.
    pub fn register(
        &mut self,
        vendor_id: impl Into<String>,
        handler: impl NativeHandler + 'static,
    ) {
        self.handlers.insert(vendor_id.into(), Box::new(handler));
    }

    /// Routes a command to its vendor's handler.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Unrecognized`] if no handler is registered for
    /// the vendor, otherwise whatever the handler returns.
    pub fn dispatch(&self, vendor_id: &str, command: &str) -> Result<(), NativeError> {
        match self.handlers.get(vendor_id) {
            Some(handler) => handler.execute(command),
            None => Err(NativeError::Unrecognized {
                vendor_id: vendor_id.to_string(),
            }),
        }
    }

    /// Returns true if a handler is registered for the vendor.
    #[must_use]
    pub fn contains(&self, vendor_id: &str) -> bool {
        self.handlers.contains_key(vendor_id)
    }
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut vendors: Vec<&String> = self.handlers.keys().collect();
        vendors.sort();
        f.debug_struct("NativeRegistry")
            .field("vendors", &vendors)
            .finish()
    }
}
