//! Engine configuration.

use crate::types::AllSome;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for a [`crate::FeatureService`].
///
/// Durations are read as whole seconds when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lock lifetime used when a request does not carry an expiry.
    #[serde(with = "secs")]
    pub default_lock_expiry: Duration,

    /// Upper bound applied to requested expiries.
    #[serde(with = "opt_secs")]
    pub max_lock_expiry: Option<Duration>,

    /// How often the background sweeper purges expired locks (0 = never).
    #[serde(with = "secs")]
    pub sweep_interval: Duration,

    /// Release action applied when a transaction does not name one.
    pub default_release_action: AllSome,

    /// Lock action applied when a lock request does not name one.
    pub default_lock_action: AllSome,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_lock_expiry: Duration::from_secs(5 * 60), // 5 minutes
            max_lock_expiry: None,
            sweep_interval: Duration::from_secs(30),
            default_release_action: AllSome::All,
            default_lock_action: AllSome::All,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default lock expiry.
    #[must_use]
    pub const fn default_lock_expiry(mut self, expiry: Duration) -> Self {
        self.default_lock_expiry = expiry;
        self
    }

    /// Caps requested lock expiries.
    #[must_use]
    pub const fn max_lock_expiry(mut self, max: Duration) -> Self {
        self.max_lock_expiry = Some(max);
        self
    }

    /// Sets the sweep interval. Zero disables the sweeper thread.
    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the default release action.
    #[must_use]
    pub const fn default_release_action(mut self, action: AllSome) -> Self {
        self.default_release_action = action;
        self
    }

    /// Sets the default lock action.
    #[must_use]
    pub const fn default_lock_action(mut self, action: AllSome) -> Self {
        self.default_lock_action = action;
        self
    }

    /// Resolves the expiry for a lock request.
    #[must_use]
    pub fn effective_expiry(&self, requested: Option<Duration>) -> Duration {
        let expiry = requested.unwrap_or(self.default_lock_expiry);
        match self.max_lock_expiry {
            Some(max) => expiry.min(max),
            None => expiry,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Optional durations as whole seconds; also used by lock requests.
pub(crate) mod opt_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
