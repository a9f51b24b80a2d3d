//! Per-request server render context.

use indexmap::IndexMap;

use crate::error::AppError;

/// Request and response state of one server render.
#[derive(Debug, Clone, PartialEq)]
pub struct SsrContext {
    /// Requested URL (path and query).
    pub url: String,
    /// Incoming request headers, lowercase names.
    pub request_headers: IndexMap<String, String>,
    /// Response status code.
    pub status_code: u16,
    /// Headers to send with the response.
    pub response_headers: IndexMap<String, String>,
    /// Error raised while rendering, if any.
    pub error: Option<AppError>,
    /// Redirect target, if the render redirected.
    pub redirect: Option<String>,
}

impl SsrContext {
    /// Creates a context for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_headers: IndexMap::new(),
            status_code: 200,
            response_headers: IndexMap::new(),
            error: None,
            redirect: None,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_request_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request_headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// The URL without query string or fragment.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url
            .split(['?', '#'])
            .next()
            .unwrap_or(self.url.as_str())
    }
}
