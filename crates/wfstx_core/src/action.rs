//! Write actions and their per-action results.

use crate::types::IdGeneration;
use crate::FeatureId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use wfstx_storage::{Feature, Filter, Property};

/// One write action of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Create features.
    Insert {
        /// Client correlation string.
        #[serde(default)]
        handle: Option<String>,
        /// Feature type the features belong to.
        type_name: String,
        /// Features to create, in order.
        features: Vec<Feature>,
        /// Identifier policy; `GenerateNew` when absent.
        #[serde(default)]
        id_policy: Option<IdGeneration>,
    },
    /// Change properties of the features matching a filter.
    Update {
        /// Client correlation string.
        #[serde(default)]
        handle: Option<String>,
        /// Feature type to update.
        type_name: String,
        /// Assignments applied to every match.
        properties: Vec<Property>,
        /// Selects the features to update.
        filter: Filter,
    },
    /// Remove the features matching a filter.
    Delete {
        /// Client correlation string.
        #[serde(default)]
        handle: Option<String>,
        /// Feature type to delete from.
        type_name: String,
        /// Selects the features to delete.
        filter: Filter,
    },
    /// Swap the body of the features matching a filter, keeping their ids.
    Replace {
        /// Client correlation string.
        #[serde(default)]
        handle: Option<String>,
        /// Feature type to replace in.
        type_name: String,
        /// New feature body.
        feature: Feature,
        /// Selects the features to replace.
        filter: Filter,
    },
    /// Vendor-specific command passed through to a native handler.
    Native {
        /// Client correlation string.
        #[serde(default)]
        handle: Option<String>,
        /// Vendor the command is addressed to.
        vendor_id: String,
        /// If true, an unrecognized command is a successful no-op.
        #[serde(default)]
        safe_to_ignore: bool,
        /// Opaque command text.
        #[serde(default)]
        command: String,
    },
}

impl Action {
    /// Returns the client handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<&str> {
        match self {
            Action::Insert { handle, .. }
            | Action::Update { handle, .. }
            | Action::Delete { handle, .. }
            | Action::Replace { handle, .. }
            | Action::Native { handle, .. } => handle.as_deref(),
        }
    }

    /// Returns the action kind.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Insert { .. } => ActionKind::Insert,
            Action::Update { .. } => ActionKind::Update,
            Action::Delete { .. } => ActionKind::Delete,
            Action::Replace { .. } => ActionKind::Replace,
            Action::Native { .. } => ActionKind::Native,
        }
    }

    /// Returns true if the action may touch features that already exist,
    /// and therefore may need a lock token.
    #[must_use]
    pub fn targets_existing(&self) -> bool {
        match self {
            Action::Update { .. } | Action::Delete { .. } | Action::Replace { .. } => true,
            Action::Insert { id_policy, .. } => {
                id_policy.unwrap_or_default() == IdGeneration::ReplaceDuplicate
            }
            Action::Native { .. } => false,
        }
    }

    /// Returns the locator reported for a failure of the action at
    /// `position`: its handle, else `action[<position>]`.
    #[must_use]
    pub fn locator(&self, position: usize) -> String {
        match self.handle() {
            Some(handle) => handle.to_string(),
            None => format!("action[{position}]"),
        }
    }
}

/// Discriminant of [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Insert.
    Insert,
    /// Update.
    Update,
    /// Delete.
    Delete,
    /// Replace.
    Replace,
    /// Native.
    Native,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Insert => "insert",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Replace => "replace",
            ActionKind::Native => "native",
        };
        f.write_str(name)
    }
}

/// Why a single action failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorCode {
    /// `UseExisting` insert of an id that is already live.
    DuplicateIdentifier,
    /// `UseExisting`/`ReplaceDuplicate` insert without a caller id.
    MissingIdentifier,
    /// A targeted feature is locked and no (matching) token was presented.
    FeatureLocked,
    /// A token was presented but does not hold every targeted feature.
    LockNotHeld,
    /// No native handler recognized the command.
    UnrecognizedNativeCommand,
    /// A native handler recognized the command and failed.
    NativeCommandFailed,
    /// The action itself is malformed.
    InvalidAction,
    /// The store reported an error.
    StorageFailure,
}

impl fmt::Display for ActionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ActionErrorCode::DuplicateIdentifier => "DuplicateIdentifier",
            ActionErrorCode::MissingIdentifier => "MissingIdentifier",
            ActionErrorCode::FeatureLocked => "FeatureLocked",
            ActionErrorCode::LockNotHeld => "LockNotHeld",
            ActionErrorCode::UnrecognizedNativeCommand => "UnrecognizedNativeCommand",
            ActionErrorCode::NativeCommandFailed => "NativeCommandFailed",
            ActionErrorCode::InvalidAction => "InvalidAction",
            ActionErrorCode::StorageFailure => "StorageFailure",
        };
        f.write_str(code)
    }
}

/// A failed action, as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
    /// Failure category.
    pub code: ActionErrorCode,
    /// Human readable detail.
    pub message: String,
    /// The action's handle, or its position marker.
    pub locator: String,
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    /// The action was applied (possibly to zero features).
    Success,
    /// The action was not applied.
    Failure(ActionFailure),
}

impl ActionResult {
    /// Returns true for [`ActionResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success)
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&ActionFailure> {
        match self {
            ActionResult::Success => None,
            ActionResult::Failure(failure) => Some(failure),
        }
    }
}

/// A feature created by an insert, tied back to the insert's handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertCorrelation {
    /// The id the feature was stored under.
    pub feature_id: FeatureId,
    /// Handle of the insert action that created it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

/// Per-feature mutation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationCounts {
    /// Features created.
    pub inserted: usize,
    /// Features updated.
    pub updated: usize,
    /// Features deleted.
    pub deleted: usize,
    /// Features whose body was replaced.
    pub replaced: usize,
}

impl MutationCounts {
    /// Adds another set of counts into this one.
    pub fn absorb(&mut self, other: MutationCounts) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.replaced += other.replaced;
    }
}

/// Everything the executor learned from applying one action.
///
/// Counts, touched ids and correlations are only meaningful when `result`
/// is a success; the executor leaves them empty otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    /// Success or failure.
    pub result: ActionResult,
    /// Features mutated, by kind.
    pub counts: MutationCounts,
    /// Ids of every feature mutated.
    pub touched: BTreeSet<FeatureId>,
    /// Features created, in creation order.
    pub correlations: Vec<InsertCorrelation>,
}

impl ActionReport {
    /// A success that changed nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            result: ActionResult::Success,
            counts: MutationCounts::default(),
            touched: BTreeSet::new(),
            correlations: Vec::new(),
        }
    }

    /// A failure.
    #[must_use]
    pub fn failed(code: ActionErrorCode, message: impl Into<String>, locator: String) -> Self {
        Self {
            result: ActionResult::Failure(ActionFailure {
                code,
                message: message.into(),
                locator,
            }),
            ..Self::noop()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locator_prefers_handle() {
        let named = Action::Delete {
            handle: Some("d1".into()),
            type_name: "roads".into(),
            filter: Filter::All,
        };
        let anonymous = Action::Delete {
            handle: None,
            type_name: "roads".into(),
            filter: Filter::All,
        };
        assert_eq!(named.locator(3), "d1");
        assert_eq!(anonymous.locator(3), "action[3]");
    }

    #[test]
    fn which_actions_need_locks() {
        let insert = |policy| Action::Insert {
            handle: None,
            type_name: "roads".into(),
            features: vec![],
            id_policy: policy,
        };
        assert!(!insert(None).targets_existing());
        assert!(!insert(Some(IdGeneration::UseExisting)).targets_existing());
        assert!(insert(Some(IdGeneration::ReplaceDuplicate)).targets_existing());

        let native = Action::Native {
            handle: None,
            vendor_id: "acme".into(),
            safe_to_ignore: true,
            command: String::new(),
        };
        assert!(!native.targets_existing());
    }

    #[test]
    fn action_deserializes_from_tagged_json() {
        let action: Action = serde_json::from_value(json!({
            "action": "delete",
            "handle": "d1",
            "type_name": "roads",
            "filter": "all"
        }))
        .unwrap();
        assert_eq!(action.kind(), ActionKind::Delete);
        assert_eq!(action.handle(), Some("d1"));
    }

    #[test]
    fn counts_absorb() {
        let mut total = MutationCounts::default();
        total.absorb(MutationCounts {
            inserted: 2,
            deleted: 1,
            ..MutationCounts::default()
        });
        total.absorb(MutationCounts {
            updated: 3,
            ..MutationCounts::default()
        });
        assert_eq!(total.inserted, 2);
        assert_eq!(total.updated, 3);
        assert_eq!(total.deleted, 1);
    }
}
