//! The application instance.
//!
//! One [`App`] is created per server request or client page load. It owns the
//! hook bus, the payload, provided values, typed extensions and the mount
//! queue, and it is torn down with [`App::close`].
//!
//! # Example
//!
//! ```ignore
//! let app = App::builder(Arc::new(HeadlessHost::new()))
//!     .server(SsrContext::new("/"))
//!     .build();
//!
//! app.apply_plugins(PluginSet::new().add(ApiPlugin)).await?;
//! app.emit(AppEvent::Created).await;
//! ```

mod context;
mod payload;
mod ssr;

pub use context::{try_use_app, use_app};
pub use payload::Payload;
pub use ssr::SsrContext;

use core::any::{Any, TypeId};
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use hashbrown::HashMap;
use meridian_hooks::HookBus;
use parking_lot::{Mutex, RwLock};

use crate::config::{AppConfig, RuntimeConfig};
use crate::error::{AppError, PluginError};
use crate::event::AppEvent;
use crate::host::Host;
use crate::plugin::{Plugins, Scheduler, sort_by_order};
use crate::router::RouteMatch;

/// A value made available through [`App::provide`].
pub type Injection = Arc<dyn Any + Send + Sync>;

/// A callback queued with [`App::on_mount`].
pub type MountCallback = Box<dyn FnOnce(Arc<App>) -> BoxFuture<'static, ()> + Send>;

/// Marker trait for per-instance typed tables.
///
/// Sibling crates keep their state on the instance through
/// [`App::extension`] so it lives and dies with it.
pub trait Extension: Send + Sync + 'static {}

/// Where the instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Server render of a single request.
    Server,
    /// Client page load.
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppPhase {
    Created,
    PluginsApplied,
    Closed,
}

#[derive(Default)]
struct MountQueue {
    mounted: bool,
    callbacks: Vec<MountCallback>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds an [`App`].
pub struct AppBuilder {
    host: Arc<dyn Host>,
    mode: RenderMode,
    ssr: Option<SsrContext>,
    payload: Payload,
    config: AppConfig,
    runtime_config: RuntimeConfig,
}

impl AppBuilder {
    /// Builds a server instance for one request.
    #[must_use]
    pub fn server(mut self, ssr: SsrContext) -> Self {
        self.mode = RenderMode::Server;
        self.payload = Payload::server(ssr.path());
        self.ssr = Some(ssr);
        self
    }

    /// Builds a client instance from the payload the server embedded.
    #[must_use]
    pub fn client(mut self, payload: Payload) -> Self {
        self.mode = RenderMode::Client;
        self.ssr = None;
        self.payload = payload;
        self
    }

    /// Sets the framework configuration.
    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the runtime configuration. Only used by server instances; client
    /// instances read the public half from the payload.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    /// Creates the instance and provides `$config`.
    #[must_use]
    pub fn build(self) -> Arc<App> {
        let AppBuilder {
            host,
            mode,
            ssr,
            mut payload,
            config,
            runtime_config,
        } = self;

        let (hydrating, runtime_config) = match mode {
            RenderMode::Server => {
                payload.config = runtime_config.public.clone();
                (false, runtime_config)
            }
            RenderMode::Client => (
                payload.server_rendered,
                RuntimeConfig {
                    public: payload.config.clone(),
                    ..RuntimeConfig::default()
                },
            ),
        };

        let app = Arc::new(App {
            id: nanoid::nanoid!(),
            mode,
            config,
            hooks: HookBus::new(),
            host,
            payload: RwLock::new(payload),
            ssr: ssr.map(Mutex::new),
            hydrating: AtomicBool::new(hydrating),
            hydration_deferrals: Mutex::new(0),
            injections: RwLock::new(HashMap::new()),
            extensions: RwLock::new(HashMap::new()),
            mount_queue: Mutex::new(MountQueue::default()),
            route: RwLock::new(None),
            phase: Mutex::new(AppPhase::Created),
        });
        app.provide("config", runtime_config);

        tracing::debug!(app = %app.id, mode = ?mode, hydrating, "application instance created");
        app
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// App
// ─────────────────────────────────────────────────────────────────────────────

/// A per-request or per-page-load application instance.
pub struct App {
    id: String,
    mode: RenderMode,
    config: AppConfig,
    hooks: HookBus<AppEvent>,
    host: Arc<dyn Host>,
    payload: RwLock<Payload>,
    ssr: Option<Mutex<SsrContext>>,
    hydrating: AtomicBool,
    hydration_deferrals: Mutex<usize>,
    injections: RwLock<HashMap<String, Injection>>,
    extensions: RwLock<HashMap<TypeId, Injection>>,
    mount_queue: Mutex<MountQueue>,
    route: RwLock<Option<RouteMatch>>,
    phase: Mutex<AppPhase>,
}

impl core::fmt::Debug for App {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("App")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("hydrating", &self.is_hydrating())
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl App {
    /// Starts building an instance rendered by `host`. Defaults to a client
    /// instance with an empty payload.
    #[must_use]
    pub fn builder(host: Arc<dyn Host>) -> AppBuilder {
        AppBuilder {
            host,
            mode: RenderMode::Client,
            ssr: None,
            payload: Payload::default(),
            config: AppConfig::default(),
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Random instance identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where the instance runs.
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Whether this is a server instance.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.mode == RenderMode::Server
    }

    /// Framework configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The host UI framework.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Framework and host versions.
    #[must_use]
    pub fn versions(&self) -> Vec<(String, String)> {
        vec![
            ("meridian".to_owned(), env!("CARGO_PKG_VERSION").to_owned()),
            (self.host.name().to_owned(), self.host.version().to_owned()),
        ]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Injection
    // ─────────────────────────────────────────────────────────────────────────

    /// Makes `value` reachable as `$name` on the instance and through the
    /// host's global surface.
    ///
    /// The first writer wins: providing an existing name is ignored and
    /// returns `false`.
    pub fn provide<T: Send + Sync + 'static>(&self, name: &str, value: T) -> bool {
        self.provide_arc(name, Arc::new(value))
    }

    /// Like [`provide`](Self::provide) for an already shared value.
    pub fn provide_arc(&self, name: &str, value: Injection) -> bool {
        let key = format!("${name}");
        {
            let mut injections = self.injections.write();
            if injections.contains_key(&key) {
                tracing::debug!(app = %self.id, name = %key, "ignoring repeated injection");
                return false;
            }
            injections.insert(key.clone(), Arc::clone(&value));
        }
        self.host.expose_global(&key, value);
        true
    }

    /// Returns the value provided as `name` (with or without the `$`).
    #[must_use]
    pub fn injected<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let key = injection_key(name);
        let value = self.injections.read().get(key.as_ref()).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Whether a value was provided as `name`.
    #[must_use]
    pub fn has_injection(&self, name: &str) -> bool {
        self.injections
            .read()
            .contains_key(injection_key(name).as_ref())
    }

    /// The runtime configuration provided as `$config`.
    #[must_use]
    pub fn runtime_config(&self) -> Arc<RuntimeConfig> {
        self.injected::<RuntimeConfig>("config")
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Extensions
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the instance's `T`, creating it on first use.
    pub fn extension<T: Extension + Default>(&self) -> Arc<T> {
        if let Some(existing) = self.try_extension::<T>() {
            return existing;
        }
        let created: Injection = Arc::new(T::default());
        let stored = Arc::clone(
            self.extensions
                .write()
                .entry(TypeId::of::<T>())
                .or_insert(created),
        );
        stored.downcast::<T>().unwrap_or_else(|_| Arc::new(T::default()))
    }

    /// Returns the instance's `T` if it was created.
    #[must_use]
    pub fn try_extension<T: Extension>(&self) -> Option<Arc<T>> {
        let stored = self.extensions.read().get(&TypeId::of::<T>()).cloned()?;
        stored.downcast::<T>().ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────────────────────

    /// The instance's hook bus.
    #[must_use]
    pub fn hooks(&self) -> &HookBus<AppEvent> {
        &self.hooks
    }

    /// Calls the listeners of `name` inside this instance's context.
    pub async fn call_hook(self: &Arc<Self>, name: &str, event: AppEvent) {
        self.run_with_context(self.hooks.call(name, event)).await;
    }

    /// Calls the hook the framework associates with `event`.
    ///
    /// [`AppEvent::Custom`] has no hook name; use [`call_hook`](Self::call_hook).
    pub async fn emit(self: &Arc<Self>, event: AppEvent) {
        match event.hook_name() {
            Some(name) => self.call_hook(name, event).await,
            None => tracing::warn!(app = %self.id, %event, "event has no hook name"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugins
    // ─────────────────────────────────────────────────────────────────────────

    /// Runs a plugin batch against this instance.
    ///
    /// # Errors
    ///
    /// Returns the first setup error, see [`Scheduler::apply`].
    pub async fn apply_plugins(self: &Arc<Self>, plugins: impl Plugins) -> Result<(), PluginError> {
        let plugins = sort_by_order(plugins.into_descriptors());
        Scheduler::new(self.config.scheduler.clone())
            .apply(self, &plugins)
            .await?;
        let mut phase = self.phase.lock();
        if *phase == AppPhase::Created {
            *phase = AppPhase::PluginsApplied;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payload
    // ─────────────────────────────────────────────────────────────────────────

    /// Reads the payload.
    pub fn with_payload<R>(&self, f: impl FnOnce(&Payload) -> R) -> R {
        f(&self.payload.read())
    }

    /// Mutates the payload in one critical section.
    pub fn update_payload<R>(&self, f: impl FnOnce(&mut Payload) -> R) -> R {
        f(&mut self.payload.write())
    }

    /// A copy of the current payload.
    #[must_use]
    pub fn payload_snapshot(&self) -> Payload {
        self.payload.read().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Server context
    // ─────────────────────────────────────────────────────────────────────────

    /// A copy of the server render context, on server instances.
    #[must_use]
    pub fn ssr_context(&self) -> Option<SsrContext> {
        self.ssr.as_ref().map(|ssr| ssr.lock().clone())
    }

    /// Mutates the server render context. Returns `None` on client instances.
    pub fn update_ssr_context<R>(&self, f: impl FnOnce(&mut SsrContext) -> R) -> Option<R> {
        self.ssr.as_ref().map(|ssr| f(&mut ssr.lock()))
    }

    /// Sets a response header on the server render context.
    pub fn set_response_header(&self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if self
            .update_ssr_context(|ssr| {
                ssr.response_headers
                    .insert(name.to_ascii_lowercase(), value);
            })
            .is_none()
        {
            tracing::debug!(app = %self.id, header = name, "response headers are server only");
        }
    }

    /// Response status of the server render, `200` on client instances.
    #[must_use]
    pub fn response_status(&self) -> u16 {
        self.ssr
            .as_ref()
            .map_or(200, |ssr| ssr.lock().status_code)
    }

    /// Issues a server-side redirect.
    pub async fn redirect(self: &Arc<Self>, to: impl Into<String>, status_code: u16) {
        let to = to.into();
        self.update_ssr_context(|ssr| {
            ssr.status_code = status_code;
            ssr.redirect = Some(to.clone());
            ssr.response_headers.insert("location".to_owned(), to.clone());
        });
        self.emit(AppEvent::Redirected { to }).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Routing and errors
    // ─────────────────────────────────────────────────────────────────────────

    /// The current route, once resolved.
    #[must_use]
    pub fn route(&self) -> Option<RouteMatch> {
        self.route.read().clone()
    }

    /// Sets the current route.
    pub fn set_route(&self, route: Option<RouteMatch>) {
        *self.route.write() = route;
    }

    /// The current page-level error.
    #[must_use]
    pub fn error(&self) -> Option<AppError> {
        self.payload.read().error.clone()
    }

    /// Records a page-level error and calls `app:error`.
    ///
    /// On the server the error also sets the response status.
    pub async fn show_error(self: &Arc<Self>, error: AppError) {
        self.payload.write().error = Some(error.clone());
        self.update_ssr_context(|ssr| {
            ssr.status_code = error.status_code;
            ssr.error = Some(error.clone());
        });
        self.emit(AppEvent::Error(error)).await;
    }

    /// Clears the page-level error and calls `app:error:cleared`.
    pub async fn clear_error(self: &Arc<Self>, redirect: Option<String>) {
        self.payload.write().error = None;
        self.update_ssr_context(|ssr| {
            ssr.status_code = 200;
            ssr.error = None;
        });
        self.emit(AppEvent::ErrorCleared { redirect }).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hydration and mounting
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the client is hydrating server-rendered markup.
    #[must_use]
    pub fn is_hydrating(&self) -> bool {
        self.hydrating.load(Ordering::Acquire)
    }

    /// Keeps the instance hydrating until the returned guard is resolved.
    #[must_use = "hydration ends when the deferral is resolved"]
    pub fn defer_hydration(self: &Arc<Self>) -> HydrationDeferral {
        *self.hydration_deferrals.lock() += 1;
        HydrationDeferral {
            app: Some(Arc::clone(self)),
        }
    }

    /// Releases one deferral; returns `true` when hydration just ended.
    fn release_deferral(&self) -> bool {
        let mut pending = self.hydration_deferrals.lock();
        *pending = pending.saturating_sub(1);
        *pending == 0 && self.hydrating.swap(false, Ordering::AcqRel)
    }

    /// Runs `callback` once the host mounted, or right away (as a task) when
    /// it already has.
    pub fn on_mount<F, Fut>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(Arc<App>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: MountCallback = Box::new(move |app| callback(app).boxed());
        let mut queue = self.mount_queue.lock();
        if !queue.mounted {
            queue.callbacks.push(callback);
            return;
        }
        drop(queue);

        let app = Arc::clone(self);
        tokio::spawn(async move {
            let task = callback(Arc::clone(&app));
            app.run_with_context(task).await;
        });
    }

    /// Whether the host mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mount_queue.lock().mounted
    }

    /// Marks the host as mounted and runs the queued callbacks in order.
    pub async fn flush_mount_queue(self: &Arc<Self>) {
        let callbacks = {
            let mut queue = self.mount_queue.lock();
            queue.mounted = true;
            core::mem::take(&mut queue.callbacks)
        };
        for callback in callbacks {
            self.run_with_context(callback(Arc::clone(self))).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether [`close`](Self::close) ran.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.phase.lock() == AppPhase::Closed
    }

    /// Calls `close`, then drops hooks, injections, extensions and queued
    /// mount callbacks. Later calls do nothing.
    pub async fn close(self: &Arc<Self>) {
        {
            let mut phase = self.phase.lock();
            if *phase == AppPhase::Closed {
                return;
            }
            *phase = AppPhase::Closed;
        }

        self.emit(AppEvent::Close).await;

        self.hooks.clear(None);
        self.injections.write().clear();
        let extensions = core::mem::take(&mut *self.extensions.write());
        drop(extensions);
        self.mount_queue.lock().callbacks.clear();
        tracing::debug!(app = %self.id, "application instance closed");
    }
}

fn injection_key(name: &str) -> std::borrow::Cow<'_, str> {
    if name.starts_with('$') {
        std::borrow::Cow::Borrowed(name)
    } else {
        std::borrow::Cow::Owned(format!("${name}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HydrationDeferral
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps the instance hydrating while unresolved.
///
/// Dropping an unresolved guard releases it without calling
/// `app:suspense:resolve`.
#[derive(Debug)]
pub struct HydrationDeferral {
    app: Option<Arc<App>>,
}

impl HydrationDeferral {
    /// Releases the deferral. When it was the last one, hydration ends and
    /// `app:suspense:resolve` is called.
    pub async fn resolve(mut self) {
        let Some(app) = self.app.take() else {
            return;
        };
        if app.release_deferral() {
            tracing::debug!(app = %app.id, "hydration finished");
            app.emit(AppEvent::SuspenseResolve).await;
        }
    }
}

impl Drop for HydrationDeferral {
    fn drop(&mut self) {
        if let Some(app) = self.app.take()
            && app.release_deferral()
        {
            tracing::warn!(app = %app.id, "hydration deferral dropped without resolving");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HeadlessHost;

    fn client(server_rendered: bool) -> Arc<App> {
        let payload = Payload {
            server_rendered,
            ..Payload::default()
        };
        App::builder(Arc::new(HeadlessHost::new()))
            .client(payload)
            .build()
    }

    #[derive(Default)]
    struct Counter(Mutex<u32>);

    impl Extension for Counter {}

    #[test]
    fn first_provider_wins() {
        let app = client(false);

        assert!(app.provide("api", "first"));
        assert!(!app.provide("api", "second"));
        assert_eq!(*app.injected::<&str>("$api").unwrap(), "first");
    }

    #[test]
    fn extension_is_created_once() {
        let app = client(false);

        *app.extension::<Counter>().0.lock() += 1;
        *app.extension::<Counter>().0.lock() += 1;

        assert_eq!(*app.try_extension::<Counter>().unwrap().0.lock(), 2);
    }

    #[test]
    fn server_instance_ships_public_config_only() {
        let runtime = RuntimeConfig::new()
            .with_public("apiBase", "/api")
            .with_private("secret", "s3cr3t");
        let app = App::builder(Arc::new(HeadlessHost::new()))
            .server(SsrContext::new("/about?x=1"))
            .with_runtime_config(runtime.clone())
            .build();

        assert_eq!(*app.runtime_config(), runtime);
        let payload = app.payload_snapshot();
        assert_eq!(payload.path.as_deref(), Some("/about"));
        assert!(payload.config.contains_key("apiBase"));
        assert!(!payload.config.contains_key("secret"));
    }

    #[tokio::test]
    async fn last_deferral_ends_hydration() {
        let app = client(true);
        let first = app.defer_hydration();
        let second = app.defer_hydration();

        first.resolve().await;
        assert!(app.is_hydrating());
        second.resolve().await;
        assert!(!app.is_hydrating());
    }

    #[tokio::test]
    async fn mount_queue_runs_in_order_after_flush() {
        let app = client(false);
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b"] {
            let log = Arc::clone(&log);
            app.on_mount(move |_| async move { log.lock().push(label) });
        }
        assert!(log.lock().is_empty());

        app.flush_mount_queue().await;
        assert_eq!(*log.lock(), ["a", "b"]);
        assert!(app.is_mounted());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let app = client(false);
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        app.hooks().hook_fn(crate::event::names::CLOSE, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock() += 1;
                Ok(())
            }
        });

        app.close().await;
        app.close().await;

        assert_eq!(*calls.lock(), 1);
        assert!(app.is_closed());
        assert!(!app.has_injection("config"));
    }
}
