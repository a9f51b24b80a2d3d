//! A server-rendering application core: hooks, plugins, lifecycle and data
//! fetching that survive hydration.
//!

pub use meridian_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use meridian_internal::prelude::*;
}
