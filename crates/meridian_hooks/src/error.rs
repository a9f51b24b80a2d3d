//! Error types for hook listeners.

/// Boxed error returned by user callbacks.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// A listener failed while a hook was being called.
///
/// Passed to the `"error"` hook when a failure is escalated.
#[derive(Debug, thiserror::Error)]
#[error("hook '{hook}' failed: {source}")]
pub struct HookError {
    /// The hook whose listener failed.
    pub hook: String,
    /// The error returned by the listener.
    #[source]
    pub source: BoxError,
}

impl HookError {
    /// Creates a new hook error.
    #[must_use]
    pub fn new(hook: impl Into<String>, source: BoxError) -> Self {
        Self {
            hook: hook.into(),
            source,
        }
    }
}
