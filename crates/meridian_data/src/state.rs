//! Keyed shared state carried in the payload.

use std::sync::Arc;

use meridian_app::app::App;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AsyncDataError;

/// Handle to one `payload.state` entry.
#[derive(Debug, Clone)]
pub struct State {
    app: Arc<App>,
    key: String,
}

/// Returns the shared state for `key`, initializing it with `init` the first
/// time. A value restored from the server payload is kept as is.
pub fn use_state(app: &Arc<App>, key: impl Into<String>, init: impl FnOnce() -> Value) -> State {
    let key = key.into();
    app.update_payload(|payload| {
        if !payload.state.contains_key(&key) {
            payload.state.insert(key.clone(), init());
        }
    });
    State {
        app: Arc::clone(app),
        key,
    }
}

impl State {
    /// The state key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value, `Null` after the key was removed.
    #[must_use]
    pub fn get(&self) -> Value {
        self.app
            .with_payload(|payload| payload.state.get(&self.key).cloned())
            .unwrap_or(Value::Null)
    }

    /// Current value, deserialized.
    ///
    /// # Errors
    ///
    /// Fails when the value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T, AsyncDataError> {
        Ok(serde_json::from_value(self.get())?)
    }

    /// Replaces the value.
    ///
    /// # Errors
    ///
    /// Fails when `value` cannot be serialized.
    pub fn set<T: Serialize>(&self, value: T) -> Result<(), AsyncDataError> {
        let value = serde_json::to_value(value)?;
        self.app.update_payload(|payload| {
            payload.state.insert(self.key.clone(), value);
        });
        Ok(())
    }

    /// Updates the value in place.
    pub fn update(&self, f: impl FnOnce(&mut Value)) {
        self.app.update_payload(|payload| {
            f(payload.state.entry(self.key.clone()).or_insert(Value::Null));
        });
    }
}
