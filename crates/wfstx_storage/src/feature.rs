//! Feature identifiers and feature bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one stored feature instance.
///
/// Feature ids are opaque strings that are:
/// - Unique within a feature type's namespace
/// - Never reused while they reference a live feature
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    /// Creates a feature id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the id and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureId({})", self.0)
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for FeatureId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A feature body: an optional id plus its attribute values.
///
/// Geometry is carried like any other property; the engine never looks
/// inside property values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Caller-supplied or store-assigned id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    /// Attribute values keyed by property name.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Feature {
    /// Creates a feature without an id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a feature carrying the given id.
    #[must_use]
    pub fn with_id(id: impl Into<FeatureId>) -> Self {
        Self {
            id: Some(id.into()),
            properties: BTreeMap::new(),
        }
    }

    /// Sets a property value.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Returns a property value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A single property assignment carried by an update.
///
/// A `None` value removes the property from the matched features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name.
    pub name: String,
    /// New value, or `None` to remove it.
    #[serde(default)]
    pub value: Option<Value>,
}

impl Property {
    /// Creates an assignment of `value` to `name`.
    #[must_use]
    pub fn set(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a removal of `name`.
    #[must_use]
    pub fn remove(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Applies this assignment to a property map.
    pub fn apply_to(&self, properties: &mut BTreeMap<String, Value>) {
        match &self.value {
            Some(value) => {
                properties.insert(self.name.clone(), value.clone());
            }
            None => {
                properties.remove(&self.name);
            }
        }
    }
}
