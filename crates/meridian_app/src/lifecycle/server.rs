//! Server render entry.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::Instrument;

use crate::app::{App, Payload, SsrContext};
use crate::config::{AppConfig, RuntimeConfig};
use crate::error::AppError;
use crate::event::AppEvent;
use crate::host::Host;
use crate::plugin::{PluginDescriptor, Plugins};
use crate::router::Router;

/// An incoming page request.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    /// Requested URL (path and query).
    pub url: String,
    /// Request headers.
    pub headers: IndexMap<String, String>,
}

impl RenderRequest {
    /// A request for `url` without headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: IndexMap::new(),
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// The rendered document and its response metadata.
#[derive(Debug, Clone)]
pub struct RenderResponse {
    /// Response status code.
    pub status_code: u16,
    /// Rendered markup followed by the payload script.
    pub html: String,
    /// The payload embedded in `html`.
    pub payload: Payload,
    /// Response headers set during the render.
    pub headers: IndexMap<String, String>,
    /// The page-level error, if the render produced one.
    pub error: Option<AppError>,
}

/// Renders one page per request, each on a fresh [`App`].
pub struct ServerRenderer {
    host: Arc<dyn Host>,
    router: Arc<dyn Router>,
    plugins: Vec<PluginDescriptor>,
    config: AppConfig,
    runtime_config: RuntimeConfig,
}

impl ServerRenderer {
    /// Creates a renderer without plugins.
    #[must_use]
    pub fn new(host: Arc<dyn Host>, router: Arc<dyn Router>) -> Self {
        Self {
            host,
            router,
            plugins: Vec::new(),
            config: AppConfig::default(),
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Adds plugins run for every request.
    #[must_use]
    pub fn with_plugins(mut self, plugins: impl Plugins) -> Self {
        self.plugins.extend(plugins.into_descriptors());
        self
    }

    /// Sets the framework configuration.
    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the runtime configuration.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    /// Renders `request`.
    ///
    /// Never fails: plugin and host errors become a 500 response, an
    /// unmatched route a 404 response, both carrying the error in the
    /// payload.
    pub async fn render(&self, request: RenderRequest) -> RenderResponse {
        let mut ssr = SsrContext::new(request.url.clone());
        for (name, value) in &request.headers {
            ssr = ssr.with_request_header(name, value.clone());
        }

        let app = App::builder(Arc::clone(&self.host))
            .server(ssr)
            .with_config(self.config.clone())
            .with_runtime_config(self.runtime_config.clone())
            .build();

        let span = tracing::info_span!("render", app_id = app.id(), url = %request.url);
        self.render_app(&app).instrument(span).await
    }

    async fn render_app(&self, app: &Arc<App>) -> RenderResponse {
        let body = self.render_body(app).await;

        app.emit(AppEvent::Rendered {
            status_code: app.response_status(),
        })
        .await;

        let payload = app.payload_snapshot();
        let script = match payload.to_script(&app.config().global_name) {
            Ok(script) => script,
            Err(error) => {
                tracing::error!(%error, "payload serialization failed");
                app.show_error(AppError::internal(format!("payload serialization failed: {error}")))
                    .await;
                String::new()
            }
        };

        let ssr = app.ssr_context().unwrap_or_else(|| SsrContext::new(""));
        let response = RenderResponse {
            status_code: ssr.status_code,
            html: format!("{body}{script}"),
            payload,
            headers: ssr.response_headers,
            error: ssr.error,
        };

        app.close().await;
        tracing::info!(status = response.status_code, "page rendered");
        response
    }

    /// Runs plugins, routing and the host render. Returns the markup, empty
    /// when rendering stopped early.
    async fn render_body(&self, app: &Arc<App>) -> String {
        if let Err(error) = app.apply_plugins(self.plugins.clone()).await {
            app.show_error(AppError::from(&error)).await;
            return String::new();
        }

        if let Some(to) = app.ssr_context().and_then(|ssr| ssr.redirect) {
            tracing::debug!(%to, "render redirected by a plugin");
            return String::new();
        }

        let path = app
            .ssr_context()
            .map(|ssr| ssr.path().to_owned())
            .unwrap_or_default();
        match self.router.resolve(&path) {
            Some(route) => app.set_route(Some(route)),
            None => app.show_error(AppError::not_found(&path)).await,
        }

        app.emit(AppEvent::Created).await;

        match self.host.render_to_string(app).await {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(%error, "host render failed");
                app.show_error(AppError::internal(error.to_string())).await;
                String::new()
            }
        }
    }
}
