//! # Meridian Internal Library
//!
//! Re-exports the core Meridian crates for convenience.

/// Named async hooks.
pub use meridian_hooks;

/// Application instance, plugin scheduling and render lifecycle.
pub use meridian_app;

/// Keyed data fetching shared between server and client.
pub use meridian_data;

/// Built-in plugins.
pub use meridian_core;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use meridian_app::prelude::*;
    pub use meridian_core::{DefaultPlugins, TracingPlugin};
    pub use meridian_data::{
        AsyncData, AsyncDataOptions, FetchRequest, Status, refresh_app_data, use_async_data,
        use_fetch, use_lazy_async_data, use_state,
    };
}
