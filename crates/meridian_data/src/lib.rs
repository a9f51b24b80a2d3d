//! Data fetching coordinated across server render and client hydration.
//!
//! Every fetch is identified by a key. Per application instance and key
//! there is one cell holding `data`, `status` and `error`, and at most one
//! execution in flight. Server results are written to the payload so the
//! hydrating client reuses them instead of fetching again.
//!
//! # Example
//!
//! ```ignore
//! use meridian_data::{AsyncDataOptions, use_async_data};
//!
//! let posts = use_async_data(&app, "posts", |app| async move {
//!     let api = app.injected::<ApiClient>("api").ok_or("api not provided")?;
//!     Ok(api.posts().await?)
//! }, AsyncDataOptions::new().with_pick(["id", "title"]))
//! .await;
//!
//! if let Some(error) = posts.error() {
//!     tracing::warn!(%error, "posts unavailable");
//! }
//! ```

mod async_data;
mod entry;
mod error;
mod fetch;
mod options;
mod state;

pub use async_data::{
    AsyncData, KeyFilter, auto_key, clear_app_data, refresh_app_data, use_app_data,
    use_async_data, use_lazy_async_data,
};
pub use error::{AsyncDataError, TransportError};
#[cfg(feature = "reqwest")]
pub use fetch::ReqwestTransport;
pub use fetch::{FetchRequest, Transport, use_fetch};
pub use options::{AsyncDataOptions, AsyncDataSnapshot, CachedDataFn, DefaultFn, Status, TransformFn};
pub use state::{State, use_state};
