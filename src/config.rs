// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dispatcher configuration.

use serde::Deserialize;

use crate::error::Result;

/// Default capacity of the failure broadcast channel.
pub const DEFAULT_FAILURE_CHANNEL_CAPACITY: usize = 256;

/// How native strings that are not valid UTF-8 are handled during decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringPolicy {
    /// Reject the callback with a decode error.
    #[default]
    Strict,
    /// Replace invalid sequences with `U+FFFD`.
    Lossy,
}

/// Configuration shared by all dispatcher variants.
///
/// # Examples
///
/// ```
/// use tellcore_dispatch::config::{DispatcherConfig, StringPolicy};
///
/// let config = DispatcherConfig::default()
///     .with_queue_capacity(1024)
///     .with_string_policy(StringPolicy::Lossy);
///
/// assert_eq!(config.queue_capacity, Some(1024));
///
/// let parsed = DispatcherConfig::from_json(r#"{"queue_capacity": 1024, "strings": "lossy"}"#)?;
/// assert_eq!(parsed, config);
/// # Ok::<(), tellcore_dispatch::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of pending events in a dispatch queue.
    ///
    /// `None` means unbounded. When the queue is full the newest event is
    /// dropped and counted; the native thread is never blocked.
    pub queue_capacity: Option<usize>,
    /// Capacity of the failure broadcast channel.
    pub failure_channel_capacity: usize,
    /// Handling of invalid UTF-8 in native strings.
    pub strings: StringPolicy,
}

impl DispatcherConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Bounds the dispatch queue.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the failure channel capacity.
    #[must_use]
    pub fn with_failure_channel_capacity(mut self, capacity: usize) -> Self {
        self.failure_channel_capacity = capacity;
        self
    }

    /// Sets the string decoding policy.
    #[must_use]
    pub fn with_string_policy(mut self, strings: StringPolicy) -> Self {
        self.strings = strings;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            failure_channel_capacity: DEFAULT_FAILURE_CHANNEL_CAPACITY,
            strings: StringPolicy::Strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded_and_strict() {
        let config = DispatcherConfig::default();
        assert_eq!(config.queue_capacity, None);
        assert_eq!(
            config.failure_channel_capacity,
            DEFAULT_FAILURE_CHANNEL_CAPACITY
        );
        assert_eq!(config.strings, StringPolicy::Strict);
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config = DispatcherConfig::from_json("{}").unwrap();
        assert_eq!(config, DispatcherConfig::default());
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = DispatcherConfig::from_json(r#"{"strings": "sloppy"}"#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
