//! Run command: execute a scenario script against a fresh service.

use crate::script::{BindingSet, Script, ScriptError, Step};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use wfstx_core::{CoreError, FeatureService, FeatureStore};
use wfstx_storage::InMemoryFeatureStore;

/// Outcome of one script step.
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    /// Position of the step in the script.
    pub step: usize,
    /// Operation name.
    pub op: &'static str,
    /// The engine's response, when the request was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// The rejection, when it was not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    summary: String,
}

impl StepOutcome {
    fn accepted(step: usize, op: &'static str, response: Value, summary: String) -> Self {
        Self {
            step,
            op,
            response: Some(response),
            error: None,
            summary,
        }
    }

    fn rejected(step: usize, op: &'static str, err: &CoreError) -> Self {
        Self {
            step,
            op,
            response: None,
            error: Some(err.to_string()),
            summary: format!("rejected: {err}"),
        }
    }

    /// Returns true if the engine accepted the request.
    pub fn is_accepted(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the run command.
pub fn run(path: &Path, format: &str, strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(path)?;
    let outcomes = execute(script)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&outcomes)?),
        _ => {
            println!("Script: {}", path.display());
            for outcome in &outcomes {
                println!("  [{}] {}: {}", outcome.step, outcome.op, outcome.summary);
            }
            let rejected = outcomes.iter().filter(|o| !o.is_accepted()).count();
            println!();
            println!("Steps: {} ({rejected} rejected)", outcomes.len());
        }
    }

    if strict && outcomes.iter().any(|o| !o.is_accepted()) {
        return Err("one or more steps were rejected".into());
    }
    Ok(())
}

/// Builds a service from the script's seed data and runs its steps in order.
///
/// A rejected request is recorded and the script goes on; only unreadable
/// seed data or an unbound `$name` stops it.
pub fn execute(script: Script) -> Result<Vec<StepOutcome>, ScriptError> {
    script.check_bindings()?;

    let store = Arc::new(InMemoryFeatureStore::with_types(script.type_names()));
    for (type_name, features) in &script.features {
        for feature in features {
            store
                .insert(type_name, feature, feature.id.as_ref())
                .map_err(CoreError::from)?;
        }
    }
    tracing::debug!(types = script.features.len(), "seeded script store");

    let service = FeatureService::new(store, script.config)?;
    let mut bindings = BindingSet::default();
    let mut outcomes = Vec::with_capacity(script.steps.len());

    for (position, step) in script.steps.into_iter().enumerate() {
        let op = step.op();
        let outcome = match step {
            Step::Transaction { mut request } => {
                if let Some(lock_id) = request.lock_id.take() {
                    request.lock_id = Some(bindings.resolve(position, &lock_id)?);
                }
                match service.transaction(&request) {
                    Ok(response) => {
                        let summary = format!(
                            "{:?} inserted={} updated={} deleted={} replaced={} failures={}",
                            response.status,
                            response.summary.total_inserted,
                            response.summary.total_updated,
                            response.summary.total_deleted,
                            response.summary.total_replaced,
                            response.results.len(),
                        );
                        StepOutcome::accepted(position, op, to_value(&response)?, summary)
                    }
                    Err(err) => StepOutcome::rejected(position, op, &err),
                }
            }
            Step::LockFeature { bind, mut request } => {
                if let Some(lock_id) = request.lock_id.take() {
                    request.lock_id = Some(bindings.resolve(position, &lock_id)?);
                }
                match service.lock_feature(&request) {
                    Ok(response) => {
                        if let Some(name) = bind {
                            bindings.bind(&name, response.lock_id.as_str().to_string());
                        }
                        let summary = format!(
                            "lock {} locked={} not_locked={}",
                            response.lock_id,
                            response.locked.len(),
                            response.not_locked.len()
                        );
                        StepOutcome::accepted(position, op, to_value(&response)?, summary)
                    }
                    Err(err) => StepOutcome::rejected(position, op, &err),
                }
            }
            Step::GetFeatureWithLock { bind, request } => {
                match service.get_feature_with_lock(&request) {
                    Ok(response) => {
                        if let Some(name) = bind {
                            bindings.bind(&name, response.lock_id.as_str().to_string());
                        }
                        let summary = format!(
                            "lock {} matched={} locked={} not_locked={}",
                            response.lock_id,
                            response.number_matched,
                            response.locked.len(),
                            response.not_locked.len()
                        );
                        StepOutcome::accepted(position, op, to_value(&response)?, summary)
                    }
                    Err(err) => StepOutcome::rejected(position, op, &err),
                }
            }
            Step::ReleaseLock { lock_id } => {
                let lock_id = bindings.resolve(position, &lock_id)?;
                match service.release_lock(&lock_id) {
                    Ok(released) => {
                        let summary = format!("released={}", released.len());
                        StepOutcome::accepted(position, op, to_value(&released)?, summary)
                    }
                    Err(err) => StepOutcome::rejected(position, op, &err),
                }
            }
        };
        outcomes.push(outcome);
    }

    service.shutdown();
    Ok(outcomes)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ScriptError> {
    Ok(serde_json::to_value(value)?)
}
