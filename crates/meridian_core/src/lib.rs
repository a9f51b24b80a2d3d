//! Built-in plugins for Meridian applications.
//!
//! - [`TracingPlugin`]: installs the `tracing` subscriber
//! - [`ErrorLoggerPlugin`]: logs application errors
//! - [`DefaultPlugins`]: both of the above
//!
//! # Example
//!
//! ```ignore
//! use meridian_app::plugin::{PluginGroup, PluginSet};
//! use meridian_core::{DefaultPlugins, TRACING_PLUGIN};
//!
//! let plugins = PluginSet::new()
//!     .add(DefaultPlugins.build().disable(TRACING_PLUGIN))
//!     .add(my_plugin)
//!     .build();
//!
//! app.apply_plugins(plugins).await?;
//! ```

mod error_logger;
mod tracing_plugin;

pub use error_logger::{ERROR_LOGGER_PLUGIN, ErrorLoggerPlugin};
pub use tracing_plugin::{TRACING_PLUGIN, TracingConfig, TracingFormat, TracingPlugin};

use meridian_app::plugin::{PluginGroup, PluginSet};

/// Default plugins for most applications.
///
/// Includes [`TracingPlugin`] with its defaults and [`ErrorLoggerPlugin`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlugins;

impl PluginGroup for DefaultPlugins {
    fn build(self) -> PluginSet {
        PluginSet::new()
            .add(TracingPlugin::default())
            .add(ErrorLoggerPlugin)
    }
}
