//! Scenario scripts.
//!
//! A script seeds an in-memory store and lists requests to send to one
//! feature service, in order. Lock ids issued by a step can be bound to a
//! name and referenced later as `$name`.
//!
//! ```json
//! {
//!   "types": ["roads"],
//!   "features": {"roads": [{"id": "roads.1", "properties": {"name": "Main St"}}]},
//!   "steps": [
//!     {"op": "lock_feature", "bind": "l1",
//!      "request": {"locks": [{"type_name": "roads", "filter": "all"}]}},
//!     {"op": "transaction",
//!      "request": {"lock_id": "$l1", "actions": [
//!        {"action": "delete", "type_name": "roads", "filter": {"ids": ["roads.1"]}}]}}
//!   ]
//! }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wfstx_core::{
    CoreError, EngineConfig, Feature, GetFeatureWithLockRequest, LockFeatureRequest,
    TransactionRequest,
};

/// Errors that stop a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Script path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The script is not valid JSON or does not match the script format.
    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    /// A step references a lock binding no earlier step created.
    #[error("step {step}: no lock bound to ${name}")]
    UnboundLock {
        /// Position of the step.
        step: usize,
        /// Binding name without the `$`.
        name: String,
    },

    /// The engine refused to start or the seed data was rejected.
    #[error("engine error: {0}")]
    Engine(#[from] CoreError),
}

/// A parsed scenario.
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Engine configuration; defaults apply to missing fields.
    #[serde(default)]
    pub config: EngineConfig,
    /// Feature types to register, in addition to those in `features`.
    #[serde(default)]
    pub types: Vec<String>,
    /// Seed features by type.
    #[serde(default)]
    pub features: BTreeMap<String, Vec<Feature>>,
    /// Requests, in order.
    pub steps: Vec<Step>,
}

impl Script {
    /// Reads a script file.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses script text.
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns every feature type the script touches.
    pub fn type_names(&self) -> BTreeSet<String> {
        self.types
            .iter()
            .chain(self.features.keys())
            .cloned()
            .collect()
    }

    /// Checks that every `$name` reference is bound by an earlier step.
    pub fn check_bindings(&self) -> Result<(), ScriptError> {
        let mut bound = BindingSet::default();
        for (position, step) in self.steps.iter().enumerate() {
            for reference in step.references() {
                bound.resolve(position, reference)?;
            }
            if let Some(name) = step.binding() {
                bound.bind(name, String::new());
            }
        }
        Ok(())
    }
}

/// One request of a script.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Run a transaction.
    Transaction {
        /// The request; `lock_id` may be a `$name` reference.
        request: TransactionRequest,
    },
    /// Lock features or renew a lock.
    LockFeature {
        /// Name to bind the issued lock id to.
        #[serde(default)]
        bind: Option<String>,
        /// The request; `lock_id` may be a `$name` reference.
        request: LockFeatureRequest,
    },
    /// Fetch and lock features.
    GetFeatureWithLock {
        /// Name to bind the issued lock id to.
        #[serde(default)]
        bind: Option<String>,
        /// The request.
        request: GetFeatureWithLockRequest,
    },
    /// Release every feature of a lock.
    ReleaseLock {
        /// Lock id or `$name` reference.
        lock_id: String,
    },
}

impl Step {
    /// Returns the step's operation name.
    pub fn op(&self) -> &'static str {
        match self {
            Step::Transaction { .. } => "transaction",
            Step::LockFeature { .. } => "lock_feature",
            Step::GetFeatureWithLock { .. } => "get_feature_with_lock",
            Step::ReleaseLock { .. } => "release_lock",
        }
    }

    fn binding(&self) -> Option<&str> {
        match self {
            Step::LockFeature { bind, .. } | Step::GetFeatureWithLock { bind, .. } => {
                bind.as_deref()
            }
            _ => None,
        }
    }

    fn references(&self) -> Vec<&str> {
        let lock_id = match self {
            Step::Transaction { request } => request.lock_id.as_deref(),
            Step::LockFeature { request, .. } => request.lock_id.as_deref(),
            Step::GetFeatureWithLock { .. } => None,
            Step::ReleaseLock { lock_id } => Some(lock_id.as_str()),
        };
        lock_id.into_iter().filter(|id| id.starts_with('$')).collect()
    }
}

/// Lock ids bound by earlier steps.
#[derive(Debug, Default)]
pub struct BindingSet {
    bindings: HashMap<String, String>,
}

impl BindingSet {
    /// Binds `name` to a lock id.
    pub fn bind(&mut self, name: &str, lock_id: String) {
        self.bindings.insert(name.to_string(), lock_id);
    }

    /// Replaces a `$name` reference by its lock id; other text is returned
    /// unchanged.
    pub fn resolve(&self, step: usize, lock_id: &str) -> Result<String, ScriptError> {
        match lock_id.strip_prefix('$') {
            Some(name) => {
                self.bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ScriptError::UnboundLock {
                        step,
                        name: name.to_string(),
                    })
            }
            None => Ok(lock_id.to_string()),
        }
    }
}
