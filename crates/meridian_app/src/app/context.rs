//! Scoped access to the current application instance.
//!
//! Plugins, hook listeners and data handlers run inside
//! [`App::run_with_context`]; code called from them can reach the instance
//! with [`use_app`] without threading it through every call. The scope is
//! task-local, so concurrent requests never observe each other's instance and
//! the scope ends with the future even when it fails.

use std::sync::Arc;

use super::App;
use crate::error::AppError;

tokio::task_local! {
    static CURRENT_APP: Arc<App>;
}

impl App {
    /// Runs `future` with this instance as the current application.
    ///
    /// Scopes nest; the innermost one wins.
    pub async fn run_with_context<F: Future>(self: &Arc<Self>, future: F) -> F::Output {
        CURRENT_APP.scope(Arc::clone(self), future).await
    }
}

/// Returns the current application instance.
///
/// # Errors
///
/// Fails with a 500 [`AppError`] outside [`App::run_with_context`].
pub fn use_app() -> Result<Arc<App>, AppError> {
    try_use_app().ok_or_else(AppError::instance_unavailable)
}

/// Returns the current application instance, if any.
#[must_use]
pub fn try_use_app() -> Option<Arc<App>> {
    CURRENT_APP.try_with(Arc::clone).ok()
}
