//! Error types for the application instance and plugin scheduling.

use meridian_hooks::BoxError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured, serializable application error.
///
/// This is the error shape that crosses the server/client boundary: it is
/// stored in the payload (`error`, `_errors`) and attached to the server
/// render context for 404 and 500 responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{status_code} {message}")]
pub struct AppError {
    /// HTTP-like status code.
    pub status_code: u16,
    /// Short status text, e.g. `"Page Not Found"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Extra data attached by the code that raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Fatal errors abort rendering and show the error page.
    #[serde(default)]
    pub fatal: bool,
}

impl AppError {
    /// Creates a non-fatal error with the given status code.
    #[must_use]
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            status_message: None,
            message: message.into(),
            data: None,
            fatal: false,
        }
    }

    /// The error synthesized when no route matches `path`.
    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(404, format!("Page not found: {path}")).with_status_message("Page Not Found")
    }

    /// A fatal 500 error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
            .with_status_message("Internal Server Error")
            .with_fatal(true)
    }

    /// Raised by [`use_app`](crate::use_app) outside an application scope.
    #[must_use]
    pub fn instance_unavailable() -> Self {
        Self::new(
            500,
            "application instance unavailable: call this inside a plugin, hook or `App::run_with_context`",
        )
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_status_message(mut self, status_message: impl Into<String>) -> Self {
        self.status_message = Some(status_message.into());
        self
    }

    /// Attaches extra data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Marks the error as fatal or not.
    #[must_use]
    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }
}

impl From<&PluginError> for AppError {
    fn from(error: &PluginError) -> Self {
        AppError::internal(error.to_string())
    }
}

/// Errors raised while scheduling or running plugins.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// A plugin's setup returned an error.
    #[error("plugin '{plugin}' failed during setup: {source}")]
    Setup {
        /// Display name of the plugin.
        plugin: String,
        /// The error returned by the setup.
        #[source]
        source: BoxError,
    },

    /// A plugin running as a parallel task panicked.
    #[error("plugin '{plugin}' panicked during setup")]
    Panicked {
        /// Display name of the plugin.
        plugin: String,
    },

    /// The batch contains a dependency cycle and the scheduler is configured
    /// to reject cycles.
    #[error("circular dependency between plugins: {}", cycle.join(" -> "))]
    CircularDependency {
        /// Plugin names forming the cycle, in dependency order.
        cycle: Vec<String>,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
