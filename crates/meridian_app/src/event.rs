//! Events carried by the application hook bus.
//!
//! Hooks are addressed by name (see [`names`]); the event value carries the
//! context for that phase. Listeners match on the variants they care about.
//!
//! # Example
//!
//! ```ignore
//! app.hooks().hook_fn(names::APP_ERROR, |event| async move {
//!     if let AppEvent::Error(error) = event {
//!         tracing::error!(%error, "application error");
//!     }
//!     Ok(())
//! });
//! ```

use core::fmt;
use std::sync::Arc;

use meridian_hooks::{HookError, HookEvent};
use serde_json::Value;

use crate::error::AppError;

/// Hook names invoked by the framework.
pub mod names {
    /// After plugins ran, before the first render attempt.
    pub const APP_CREATED: &str = "app:created";
    /// Before the host mounts on the client.
    pub const APP_BEFORE_MOUNT: &str = "app:beforeMount";
    /// After the host mounted on the client.
    pub const APP_MOUNTED: &str = "app:mounted";
    /// After the server produced the document.
    pub const APP_RENDERED: &str = "app:rendered";
    /// After a server-side redirect was issued.
    pub const APP_REDIRECTED: &str = "app:redirected";
    /// When the last hydration deferral resolved.
    pub const APP_SUSPENSE_RESOLVE: &str = "app:suspense:resolve";
    /// When an application error is raised.
    pub const APP_ERROR: &str = "app:error";
    /// When the current error is cleared.
    pub const APP_ERROR_CLEARED: &str = "app:error:cleared";
    /// Requests a refresh of async data entries.
    pub const APP_DATA_REFRESH: &str = "app:data:refresh";
    /// When a page navigation starts.
    pub const PAGE_START: &str = "page:start";
    /// When a page navigation finished.
    pub const PAGE_FINISH: &str = "page:finish";
    /// Teardown of the application instance.
    pub const CLOSE: &str = "close";
    /// Escalated hook listener failures.
    pub const ERROR: &str = meridian_hooks::ERROR_HOOK;
}

/// Event passed to application hook listeners.
#[derive(Debug, Clone)]
pub enum AppEvent {
    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────
    /// The instance finished running plugins.
    Created,
    /// The host is about to mount.
    BeforeMount,
    /// The host mounted.
    Mounted,
    /// The server rendered the document.
    Rendered {
        /// Status code of the response being produced.
        status_code: u16,
    },
    /// The server issued a redirect.
    Redirected {
        /// Redirect target.
        to: String,
    },
    /// Hydration finished.
    SuspenseResolve,
    /// The instance is being torn down.
    Close,

    // ─────────────────────────────────────────────────────────────────────────
    // Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// An application error was raised.
    Error(AppError),
    /// The current application error was cleared.
    ErrorCleared {
        /// Where the application navigates after clearing.
        redirect: Option<String>,
    },
    /// A hook listener failed; delivered to the `"error"` hook.
    HookFailure(Arc<HookError>),

    // ─────────────────────────────────────────────────────────────────────────
    // Data and navigation
    // ─────────────────────────────────────────────────────────────────────────
    /// Refresh the async data entries with these keys, or all when `None`.
    DataRefresh {
        /// Keys to refresh.
        keys: Option<Vec<String>>,
    },
    /// A navigation started.
    PageStart {
        /// Target path.
        path: String,
    },
    /// A navigation finished.
    PageFinish {
        /// Target path.
        path: String,
    },

    /// Event for hooks defined outside the framework.
    Custom(Value),
}

impl AppEvent {
    /// Returns the hook name the framework calls with this event, if any.
    #[must_use]
    pub fn hook_name(&self) -> Option<&'static str> {
        match self {
            AppEvent::Created => Some(names::APP_CREATED),
            AppEvent::BeforeMount => Some(names::APP_BEFORE_MOUNT),
            AppEvent::Mounted => Some(names::APP_MOUNTED),
            AppEvent::Rendered { .. } => Some(names::APP_RENDERED),
            AppEvent::Redirected { .. } => Some(names::APP_REDIRECTED),
            AppEvent::SuspenseResolve => Some(names::APP_SUSPENSE_RESOLVE),
            AppEvent::Close => Some(names::CLOSE),
            AppEvent::Error(_) => Some(names::APP_ERROR),
            AppEvent::ErrorCleared { .. } => Some(names::APP_ERROR_CLEARED),
            AppEvent::HookFailure(_) => Some(names::ERROR),
            AppEvent::DataRefresh { .. } => Some(names::APP_DATA_REFRESH),
            AppEvent::PageStart { .. } => Some(names::PAGE_START),
            AppEvent::PageFinish { .. } => Some(names::PAGE_FINISH),
            AppEvent::Custom(_) => None,
        }
    }
}

impl HookEvent for AppEvent {
    fn from_failure(error: Arc<HookError>) -> Self {
        AppEvent::HookFailure(error)
    }
}

impl fmt::Display for AppEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEvent::Rendered { status_code } => write!(f, "Rendered({status_code})"),
            AppEvent::Redirected { to } => write!(f, "Redirected({to})"),
            AppEvent::Error(error) => write!(f, "Error({error})"),
            AppEvent::HookFailure(error) => write!(f, "HookFailure({error})"),
            AppEvent::DataRefresh { keys: Some(keys) } => {
                write!(f, "DataRefresh({})", keys.join(", "))
            }
            AppEvent::DataRefresh { keys: None } => f.write_str("DataRefresh(all)"),
            AppEvent::PageStart { path } => write!(f, "PageStart({path})"),
            AppEvent::PageFinish { path } => write!(f, "PageFinish({path})"),
            AppEvent::Custom(value) => write!(f, "Custom({value})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
