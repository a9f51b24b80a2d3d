//! The serializable state shared between server and client.
//!
//! The server writes fetch results and shared state into the payload, then
//! embeds it into the document as a script assigning a global. The client
//! reads it back before the first render.
//!
//! ```
//! use meridian_app::app::Payload;
//! use serde_json::json;
//!
//! let mut payload = Payload::server("/users/1");
//! payload.data.insert("user".into(), json!({ "id": 1 }));
//!
//! let json = payload.to_json().unwrap();
//! assert_eq!(Payload::from_json(&json).unwrap(), payload);
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Cross-boundary state store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// Path the payload was rendered for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Whether the server rendered this page.
    #[serde(default)]
    pub server_rendered: bool,
    /// Async data results by key.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Shared keyed state.
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Async data errors by key.
    #[serde(default, rename = "_errors")]
    pub errors: IndexMap<String, AppError>,
    /// Page-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
    /// Public runtime configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
    /// Fields written by plugins.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Payload {
    /// A payload for a server render of `path`.
    #[must_use]
    pub fn server(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            server_rendered: true,
            ..Self::default()
        }
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a payload serialized with [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Renders the payload as an inline script assigning `window.__<global>__`.
    ///
    /// Characters that could end the script element or break the JavaScript
    /// string grammar are escaped.
    pub fn to_script(&self, global_name: &str) -> Result<String, serde_json::Error> {
        let json = self.to_json()?;
        let mut escaped = String::with_capacity(json.len());
        for ch in json.chars() {
            match ch {
                '<' => escaped.push_str("\\u003c"),
                '>' => escaped.push_str("\\u003e"),
                '&' => escaped.push_str("\\u0026"),
                '\u{2028}' => escaped.push_str("\\u2028"),
                '\u{2029}' => escaped.push_str("\\u2029"),
                other => escaped.push(other),
            }
        }
        Ok(format!(
            "<script>window.__{global_name}__={escaped}</script>"
        ))
    }
}
