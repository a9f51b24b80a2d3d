//! Data-fetching errors.

use core::time::Duration;

use meridian_app::AppError;
use meridian_hooks::BoxError;

/// Why an async data execution failed.
#[derive(Debug, thiserror::Error)]
pub enum AsyncDataError {
    /// The handler returned an error.
    #[error("{0}")]
    Handler(#[source] BoxError),

    /// The handler did not settle in time.
    #[error("no response within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The handler result could not be converted to or from JSON.
    #[error("invalid data: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The HTTP transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<&AsyncDataError> for AppError {
    fn from(error: &AsyncDataError) -> Self {
        match error {
            AsyncDataError::Handler(source) => match source.downcast_ref::<AppError>() {
                Some(app_error) => app_error.clone(),
                None => AppError::new(500, source.to_string()),
            },
            AsyncDataError::Timeout(_) => {
                AppError::new(504, error.to_string()).with_status_message("Gateway Timeout")
            }
            AsyncDataError::Serialize(_) => AppError::new(500, error.to_string()),
            AsyncDataError::Transport(TransportError::Status { status, body, .. }) => {
                AppError::new(*status, error.to_string())
                    .with_data(serde_json::Value::String(body.clone()))
            }
            AsyncDataError::Transport(_) => AppError::new(502, error.to_string()),
        }
    }
}

/// Errors raised by a [`Transport`](crate::fetch::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or the response not read.
    #[error("request to {url} failed: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Underlying error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        /// Requested URL.
        url: String,
        /// Parse error message.
        message: String,
    },
}
