//! Logs application errors raised through `app:error`.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use meridian_app::app::App;
use meridian_app::plugin::{Enforce, Plugin, SetupResult};
use meridian_app::{AppEvent, hooks};
use meridian_hooks::{HookMap, HookTree};

/// Plugin name.
pub const ERROR_LOGGER_PLUGIN: &str = "meridian:error-logger";

/// Logs every [`AppEvent::Error`]: server errors (5xx) at `error`, the rest
/// at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorLoggerPlugin;

impl Plugin for ErrorLoggerPlugin {
    fn setup<'a>(&'a self, _app: &'a Arc<App>) -> BoxFuture<'a, SetupResult> {
        async { Ok(()) }.boxed()
    }

    fn name(&self) -> Option<&str> {
        Some(ERROR_LOGGER_PLUGIN)
    }

    fn parallel(&self) -> bool {
        true
    }

    fn enforce(&self) -> Enforce {
        Enforce::Pre
    }

    fn hooks(&self) -> HookMap<AppEvent> {
        let mut map = HookMap::new();
        map.insert(hooks::APP_ERROR.to_owned(), HookTree::hook(log_error));
        map
    }
}

async fn log_error(event: AppEvent) -> meridian_hooks::HookResult {
    if let AppEvent::Error(error) = event {
        if error.status_code >= 500 {
            tracing::error!(status = error.status_code, fatal = error.fatal, %error, "application error");
        } else {
            tracing::warn!(status = error.status_code, %error, "application error");
        }
    }
    Ok(())
}
