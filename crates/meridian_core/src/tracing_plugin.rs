//! Tracing subscriber installation.
//!
//! [`TracingPlugin`] installs a `tracing-subscriber` registry when the
//! application boots and provides its [`TracingConfig`] as `$tracing`, so
//! later plugins can adapt their logging to the configured level.
//!
//! The subscriber is installed with `try_init`: the first application in the
//! process wins, later installs are ignored.
//!
//! # Example
//!
//! ```ignore
//! use meridian_core::{TracingFormat, TracingPlugin};
//! use tracing::Level;
//!
//! app.apply_plugins(
//!     TracingPlugin::new()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Json)
//!         .with_env_filter("meridian_app=debug,hyper=warn"),
//! )
//! .await?;
//!
//! let config = app.injected::<TracingConfig>("tracing").unwrap();
//! if config.level <= Level::DEBUG {
//!     tracing::debug!("verbose logging enabled");
//! }
//! ```

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use meridian_app::app::App;
use meridian_app::plugin::{Enforce, Plugin, SetupResult};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Plugin name, usable with [`PluginSet::disable`](meridian_app::plugin::PluginSet::disable).
pub const TRACING_PLUGIN: &str = "meridian:tracing";

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// The tracing configuration, injected as `$tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// The configured log level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Installs the `tracing` subscriber.
///
/// Runs before default plugins so that their setup is already logged.
#[derive(Debug, Clone)]
pub struct TracingPlugin {
    level: Level,
    format: TracingFormat,
    /// Target filter such as `"meridian_app=debug,hyper=warn"`.
    env_filter: Option<String>,
    span_events: bool,
}

impl Default for TracingPlugin {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingPlugin {
    /// Creates a plugin logging at `INFO` in the pretty format.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets a target filter, `target=level,target=level,...`.
    ///
    /// An invalid filter falls back to the configured level.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Logs span enter and exit.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// The configuration this plugin provides.
    #[must_use]
    pub fn config(&self) -> TracingConfig {
        TracingConfig {
            level: self.level,
            format: self.format,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }

    /// Installs the subscriber. Returns false if one was already installed.
    fn install(&self) -> bool {
        let span_events = if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };
        let registry = tracing_subscriber::registry().with(self.env_filter());

        let installed = match self.format {
            TracingFormat::Pretty => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Compact => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_span_events(span_events),
                )
                .try_init(),
            TracingFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(span_events),
                )
                .try_init(),
        };
        installed.is_ok()
    }
}

impl Plugin for TracingPlugin {
    fn setup<'a>(&'a self, app: &'a Arc<App>) -> BoxFuture<'a, SetupResult> {
        async move {
            if self.install() {
                tracing::info!(
                    level = %self.level,
                    format = ?self.format,
                    "tracing initialized"
                );
            } else {
                tracing::debug!("tracing subscriber already installed");
            }
            app.provide("tracing", self.config());
            Ok(())
        }
        .boxed()
    }

    fn name(&self) -> Option<&str> {
        Some(TRACING_PLUGIN)
    }

    fn enforce(&self) -> Enforce {
        Enforce::Pre
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_pretty_info() {
        let plugin = TracingPlugin::default();
        assert_eq!(
            plugin.config(),
            TracingConfig {
                level: Level::INFO,
                format: TracingFormat::Pretty,
            }
        );
        assert!(!plugin.span_events);
    }

    #[test]
    fn builders_set_fields() {
        let plugin = TracingPlugin::new()
            .with_level(Level::DEBUG)
            .with_format(TracingFormat::Json)
            .with_env_filter("meridian_app=debug")
            .with_span_events(true);

        assert_eq!(plugin.level, Level::DEBUG);
        assert_eq!(plugin.format, TracingFormat::Json);
        assert_eq!(plugin.env_filter.as_deref(), Some("meridian_app=debug"));
        assert!(plugin.span_events);
    }

    #[test]
    fn runs_before_default_plugins() {
        let plugin = TracingPlugin::new();
        assert_eq!(plugin.name(), Some("meridian:tracing"));
        assert_eq!(plugin.enforce(), Enforce::Pre);
    }
}
