//! Minimal feature filter understood by the in-memory store.
//!
//! Full OGC filter evaluation belongs to the real persistence engine; this
//! covers id filters and attribute equality, which is what the engine and
//! its tests need to address features.

use crate::feature::{Feature, FeatureId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A predicate selecting features of one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Matches every feature.
    All,
    /// Matches features whose id is in the set.
    Ids(BTreeSet<FeatureId>),
    /// Matches features whose property equals the value.
    PropertyEquals {
        /// Property name.
        name: String,
        /// Expected value.
        value: Value,
    },
    /// Matches features matching every inner filter.
    And(Vec<Filter>),
}

impl Filter {
    /// Creates an id filter.
    #[must_use]
    pub fn ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FeatureId>,
    {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }

    /// Creates a property equality filter.
    #[must_use]
    pub fn property_equals(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::PropertyEquals {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Evaluates the filter against a stored feature.
    #[must_use]
    pub fn matches(&self, id: &FeatureId, feature: &Feature) -> bool {
        match self {
            Filter::All => true,
            Filter::Ids(ids) => ids.contains(id),
            Filter::PropertyEquals { name, value } => feature.get(name) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(id, feature)),
        }
    }
}
