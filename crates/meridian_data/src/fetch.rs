//! Async data over HTTP.
//!
//! [`use_fetch`] is [`use_async_data`](crate::use_async_data) with a handler
//! that sends a [`FetchRequest`] through a [`Transport`] and a key derived
//! from the request. With the `reqwest` feature, [`ReqwestTransport`] sends
//! real requests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use indexmap::IndexMap;
use meridian_app::app::App;
use serde_json::Value;

use crate::async_data::{AsyncData, run};
use crate::entry::Handler;
use crate::error::{AsyncDataError, TransportError};
use crate::options::AsyncDataOptions;

/// An HTTP request described as data.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Uppercase HTTP method.
    pub method: String,
    /// Absolute URL, or a path resolved by the transport.
    pub url: String,
    /// Query parameters, in order.
    pub query: IndexMap<String, String>,
    /// Request headers.
    pub headers: IndexMap<String, String>,
    /// JSON body.
    pub body: Option<Value>,
    /// Explicit data key, replacing the derived one.
    pub key: Option<String>,
}

impl FetchRequest {
    /// A request with `method` to `url`.
    #[must_use]
    pub fn new(method: &str, url: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            body: None,
            key: None,
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new("POST", url).with_body(body)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Uses `key` instead of the derived key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The data key for this request.
    ///
    /// Either the explicit key, or `$f<METHOD>:<url>[?query][#digest]` where
    /// the digest covers headers and body, so requests that differ only there
    /// get separate entries.
    #[must_use]
    pub fn key(&self) -> String {
        if let Some(key) = &self.key {
            return key.clone();
        }

        let mut key = format!("$f{}:{}", self.method, self.url);
        for (index, (name, value)) in self.query.iter().enumerate() {
            key.push(if index == 0 { '?' } else { '&' });
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        if let Some(digest) = self.content_digest() {
            key.push('#');
            key.push_str(&digest);
        }
        key
    }

    fn content_digest(&self) -> Option<String> {
        if self.headers.is_empty() && self.body.is_none() {
            return None;
        }
        let mut hasher = blake3::Hasher::new();
        for (name, value) in &self.headers {
            hasher.update(name.to_ascii_lowercase().as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        if let Some(body) = &self.body {
            hasher.update(body.to_string().as_bytes());
        }
        let digest = hasher.finalize().to_hex();
        Some(digest.as_str()[..16].to_owned())
    }
}

/// Sends [`FetchRequest`]s and decodes JSON responses.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `request` and returns the decoded body.
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, TransportError>;
}

/// Fetches `request` through `transport` as keyed async data.
///
/// The key is [`FetchRequest::key`]: identical requests share one entry,
/// and [`FetchRequest::with_key`] pins it explicitly.
pub async fn use_fetch(
    app: &Arc<App>,
    transport: Arc<dyn Transport>,
    request: FetchRequest,
    options: AsyncDataOptions,
) -> AsyncData {
    let key = request.key();
    let request = Arc::new(request);
    let handler: Handler = Arc::new(move |_| {
        let transport = Arc::clone(&transport);
        let request = Arc::clone(&request);
        async move {
            transport
                .fetch(&request)
                .await
                .map_err(AsyncDataError::from)
        }
        .boxed()
    });
    run(app, key, handler, options).await
}

#[cfg(feature = "reqwest")]
pub use self::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod http {
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::Value;

    use super::{FetchRequest, Transport};
    use crate::error::TransportError;

    /// [`Transport`] backed by a `reqwest` client.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
        base_url: Option<String>,
    }

    impl ReqwestTransport {
        /// Creates a transport with a default client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Resolves relative request URLs against `base_url`.
        #[must_use]
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = Some(base_url.into().trim_end_matches('/').to_owned());
            self
        }

        /// Uses an existing client.
        #[must_use]
        pub fn with_client(mut self, client: reqwest::Client) -> Self {
            self.client = client;
            self
        }

        fn resolve(&self, url: &str) -> String {
            match &self.base_url {
                Some(base) if url.starts_with('/') => format!("{base}{url}"),
                _ => url.to_owned(),
            }
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn fetch(&self, request: &FetchRequest) -> Result<Value, TransportError> {
            let url = self.resolve(&request.url);
            let method = Method::from_bytes(request.method.as_bytes()).map_err(|err| {
                TransportError::Http {
                    url: url.clone(),
                    message: format!("invalid method {}: {err}", request.method),
                }
            })?;

            let target = reqwest::Url::parse_with_params(&url, &request.query).map_err(|err| {
                TransportError::Http {
                    url: url.clone(),
                    message: format!("invalid url: {err}"),
                }
            })?;

            let mut builder = self.client.request(method, target);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|err| TransportError::Http {
                url: url.clone(),
                message: err.to_string(),
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|err| TransportError::Http {
                url: url.clone(),
                message: err.to_string(),
            })?;

            if !status.is_success() {
                return Err(TransportError::Status {
                    url,
                    status: status.as_u16(),
                    body,
                });
            }
            if body.is_empty() {
                return Ok(Value::Null);
            }

            serde_json::from_str(&body).map_err(|err| TransportError::InvalidResponse {
                url,
                message: err.to_string(),
            })
        }
    }

}
