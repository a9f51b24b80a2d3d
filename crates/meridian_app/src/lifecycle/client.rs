//! Client hydration and navigation entry.

use std::sync::Arc;

use crate::app::{App, Payload};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::event::{AppEvent, names};
use crate::host::Host;
use crate::plugin::{PluginDescriptor, Plugins};
use crate::router::{RouteMatch, Router};

/// Boots the application in the browser from the server payload.
pub struct ClientEntry {
    host: Arc<dyn Host>,
    router: Arc<dyn Router>,
    plugins: Vec<PluginDescriptor>,
    config: AppConfig,
}

impl ClientEntry {
    /// Creates an entry without plugins.
    #[must_use]
    pub fn new(host: Arc<dyn Host>, router: Arc<dyn Router>) -> Self {
        Self {
            host,
            router,
            plugins: Vec::new(),
            config: AppConfig::default(),
        }
    }

    /// Adds plugins run at boot.
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

    /// Parses the serialized payload, creates the instance and boots it.
    ///
    /// # Errors
    ///
    /// Fails when the payload cannot be parsed, a plugin fails or the host
    /// cannot mount.
    pub async fn hydrate(&self, serialized_payload: &str) -> Result<Arc<App>, AppError> {
        let payload = Payload::from_json(serialized_payload).map_err(|error| {
            AppError::internal(format!("invalid payload: {error}"))
        })?;
        let app = App::builder(Arc::clone(&self.host))
            .client(payload)
            .with_config(self.config.clone())
            .build();

        self.start(&app).await?;
        Ok(app)
    }

    /// Boots an already built client instance.
    ///
    /// # Errors
    ///
    /// Returns the plugin or mount error after calling `app:error` with it.
    pub async fn start(&self, app: &Arc<App>) -> Result<(), AppError> {
        let deferral = app.defer_hydration();
        let logger = app.hooks().hook_fn(names::APP_ERROR, |event| async move {
            if let AppEvent::Error(error) = event {
                tracing::error!(%error, "error while starting the application");
            }
            Ok(())
        });

        if let Err(error) = app.apply_plugins(self.plugins.clone()).await {
            let error = AppError::from(&error);
            app.show_error(error.clone()).await;
            deferral.resolve().await;
            return Err(error);
        }

        app.emit(AppEvent::Created).await;

        self.router.ready().await;
        let path = app
            .with_payload(|payload| payload.path.clone())
            .unwrap_or_else(|| "/".to_owned());
        let route = self.router.resolve(&path);
        if route.is_none() && app.error().is_none() {
            app.show_error(AppError::not_found(&path)).await;
        }
        app.set_route(route);

        app.emit(AppEvent::BeforeMount).await;
        if let Err(error) = self.host.mount(app).await {
            let error = AppError::internal(format!("mount failed: {error}"));
            app.show_error(error.clone()).await;
            deferral.resolve().await;
            return Err(error);
        }

        app.flush_mount_queue().await;
        app.emit(AppEvent::Mounted).await;
        if let Some(id) = logger {
            app.hooks().remove(names::APP_ERROR, id);
        }
        deferral.resolve().await;
        Ok(())
    }

    /// Navigates to `path`, calling `page:start` and `page:finish` around
    /// the route change.
    ///
    /// # Errors
    ///
    /// Returns a 404 [`AppError`] (also shown on the instance) when no route
    /// matches.
    pub async fn navigate(&self, app: &Arc<App>, path: &str) -> Result<RouteMatch, AppError> {
        app.emit(AppEvent::PageStart {
            path: path.to_owned(),
        })
        .await;

        let result = match self.router.resolve(path) {
            Some(route) => {
                if app.error().is_some() {
                    app.clear_error(None).await;
                }
                app.set_route(Some(route.clone()));
                app.update_payload(|payload| payload.path = Some(route.path.clone()));
                Ok(route)
            }
            None => {
                let error = AppError::not_found(path);
                app.show_error(error.clone()).await;
                Err(error)
            }
        };

        app.emit(AppEvent::PageFinish {
            path: path.to_owned(),
        })
        .await;
        result
    }
}
