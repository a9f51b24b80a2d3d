//! Application instance, plugin scheduling and render lifecycle.
//!
//! An [`App`] is created per server request or client page load. Plugins are
//! declared as a batch; the [`Scheduler`](plugin::Scheduler) runs them against
//! the instance, honoring named dependencies and the sequential/parallel
//! contract. The [`lifecycle`] entries drive the instance through its phases
//! and call the [`hooks`] at each of them.
//!
//! # Example
//!
//! ```ignore
//! use meridian_app::prelude::*;
//!
//! let api = define_plugin(|app| async move {
//!     app.provide("api", ApiClient::new());
//!     Ok(())
//! })
//! .with_name("api");
//!
//! let renderer = ServerRenderer::new(host, Arc::new(RouteTable::new().with_route("/")))
//!     .with_plugins(PluginSet::new().add(api));
//!
//! let response = renderer.render(RenderRequest::new("/")).await;
//! assert_eq!(response.status_code, 200);
//! ```

pub mod app;
pub mod config;
pub mod event;
pub mod host;
pub mod lifecycle;
pub mod plugin;
pub mod router;

mod error;

pub use app::{App, AppBuilder, Extension, HydrationDeferral, RenderMode, try_use_app, use_app};
pub use error::{AppError, ConfigError, PluginError};
pub use event::{AppEvent, names as hooks};

/// Common imports for plugin and application code.
pub mod prelude {
    pub use crate::app::{App, Extension, Payload, SsrContext, use_app};
    pub use crate::config::{AppConfig, RuntimeConfig};
    pub use crate::error::{AppError, PluginError};
    pub use crate::event::{AppEvent, names as hooks};
    pub use crate::host::{HeadlessHost, Host};
    pub use crate::lifecycle::{ClientEntry, RenderRequest, RenderResponse, ServerRenderer};
    pub use crate::plugin::{
        Enforce, Plugin, PluginGroup, PluginSet, SetupResult, define_plugin,
    };
    pub use crate::router::{RouteTable, Router};
    pub use meridian_hooks::{BoxError, HookTree};
}
