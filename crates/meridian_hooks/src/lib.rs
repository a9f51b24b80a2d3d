//! Named asynchronous hooks for Meridian applications.
//!
//! A [`HookBus`] maps hook names (such as `"app:created"`) to ordered lists of
//! async listeners. Calling a hook awaits its listeners one after another in
//! registration order. A failing listener stops the chain, is logged, and is
//! escalated to the `"error"` hook.
//!
//! Declarative hook maps are written as nested [`HookTree`]s and flattened
//! into colon-joined names before registration.
//!
//! # Example
//!
//! ```ignore
//! use meridian_hooks::{HookBus, HookMap, HookTree};
//!
//! let bus: HookBus<MyEvent> = HookBus::new();
//! bus.hook_fn("app:created", |event| async move {
//!     tracing::info!(?event, "created");
//!     Ok(())
//! });
//!
//! let mut map = HookMap::new();
//! map.insert("page".into(), HookTree::nested([("start", HookTree::hook(on_page_start))]));
//! bus.add_hooks(&map); // registers "page:start"
//!
//! bus.call("app:created", MyEvent::Created).await;
//! ```

mod bus;
mod error;
mod tree;

pub use bus::{ERROR_HOOK, Hook, HookBus, HookEvent, HookId, HookResult, hook_fn};
pub use error::{BoxError, HookError};
pub use tree::{HookMap, HookTree, flatten};
