//! Framework and runtime configuration.
//!
//! [`AppConfig`] controls how the framework itself behaves (payload global
//! name, cycle handling, data-fetching defaults). [`RuntimeConfig`] is the
//! application's own configuration: its `public` half is shipped to the client
//! in the payload, its `private` half never leaves the server.
//!
//! Both deserialize from JSON with every field optional:
//!
//! ```
//! use meridian_app::config::{AppConfig, CyclePolicy};
//!
//! let config = AppConfig::from_json_str(r#"{ "scheduler": { "cyclePolicy": "error" } }"#).unwrap();
//! assert_eq!(config.scheduler.cycle_policy, CyclePolicy::Error);
//! assert_eq!(config.global_name, "meridian");
//! ```

use core::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// What the execution plan does with a dependency cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Warn and drop the edges that close the cycle, then continue.
    #[default]
    Break,
    /// Fail with [`PluginError::CircularDependency`](crate::PluginError::CircularDependency).
    Error,
}

/// How a new fetch for a key treats an execution already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dedupe {
    /// Join the in-flight execution.
    #[default]
    Defer,
    /// Abort the in-flight execution and start a new one.
    Cancel,
}

/// Scheduler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Cycle handling.
    pub cycle_policy: CyclePolicy,
}

/// Defaults for data fetching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataConfig {
    /// Default dedupe strategy for the first run of a key.
    pub dedupe: Dedupe,
    /// Default handler timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl DataConfig {
    /// Returns the default timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Framework configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Name of the global the serialized payload is assigned to
    /// (`window.__<name>__`).
    pub global_name: String,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Data-fetching defaults.
    pub data: DataConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            global_name: "meridian".to_string(),
            scheduler: SchedulerConfig::default(),
            data: DataConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the payload global name.
    #[must_use]
    pub fn with_global_name(mut self, name: impl Into<String>) -> Self {
        self.global_name = name.into();
        self
    }

    /// Sets the cycle policy.
    #[must_use]
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.scheduler.cycle_policy = policy;
        self
    }

    /// Sets the default dedupe strategy.
    #[must_use]
    pub fn with_dedupe(mut self, dedupe: Dedupe) -> Self {
        self.data.dedupe = dedupe;
        self
    }

    /// Sets the default data timeout.
    #[must_use]
    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Application runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Values exposed to the client through the payload.
    pub public: Map<String, Value>,
    /// Server-only values.
    pub private: Map<String, Value>,
}

impl RuntimeConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document of the form `{ "public": {...}, "private": {...} }`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Adds a public value.
    #[must_use]
    pub fn with_public(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.public.insert(key.into(), value.into());
        self
    }

    /// Adds a server-only value.
    #[must_use]
    pub fn with_private(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.private.insert(key.into(), value.into());
        self
    }

    /// The client view: public values only.
    #[must_use]
    pub fn public_only(&self) -> Self {
        Self {
            public: self.public.clone(),
            private: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn data_defaults_parse_from_camel_case() {
        let config =
            AppConfig::from_json_str(r#"{ "data": { "dedupe": "cancel", "timeoutMs": 250 } }"#)
                .unwrap();

        assert_eq!(config.data.dedupe, Dedupe::Cancel);
        assert_eq!(config.data.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn invalid_document_is_a_parse_error() {
        let result = AppConfig::from_json_str(r#"{ "scheduler": { "cyclePolicy": "explode" } }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn public_only_drops_private_values() {
        let config = RuntimeConfig::new()
            .with_public("apiBase", "/api")
            .with_private("secret", "hunter2");

        let client = config.public_only();
        assert_eq!(client.public["apiBase"], "/api");
        assert!(client.private.is_empty());
    }
}
