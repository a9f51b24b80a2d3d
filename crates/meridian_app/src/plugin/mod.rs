//! Plugins: units of setup work run once while an application boots.
//!
//! A plugin is anything implementing [`Plugin`], or a closure turned into one
//! with [`define_plugin`]. Before scheduling, every plugin is normalized into a
//! [`PluginDescriptor`] that captures its name, dependencies, parallelism,
//! order and declarative hooks; the scheduler only ever looks at descriptors.
//!
//! # Scheduling rules
//!
//! - A plugin never starts before every dependency named in its
//!   `depends_on` that is present in the batch has completed. Names absent
//!   from the batch do not block.
//! - Sequential plugins (the default) are awaited before the next plugin in
//!   declaration order starts.
//! - Parallel plugins start and the scheduler moves on immediately.
//! - Dependency cycles are broken with a warning, or rejected, depending on
//!   [`CyclePolicy`](crate::config::CyclePolicy).
//!
//! # Example
//!
//! ```ignore
//! use meridian_app::plugin::{PluginSet, define_plugin};
//!
//! let plugins = PluginSet::new()
//!     .add(
//!         define_plugin(|app| async move {
//!             app.provide("api", ApiClient::new());
//!             Ok(())
//!         })
//!         .with_name("api")
//!         .with_parallel(true),
//!     )
//!     .add(
//!         define_plugin(|app| async move {
//!             let api = app.injected::<ApiClient>("api");
//!             // ...
//!             Ok(())
//!         })
//!         .with_depends_on(["api"]),
//!     )
//!     .build();
//!
//! app.apply_plugins(plugins).await?;
//! ```

mod plan;
mod scheduler;

pub use plan::ExecutionPlan;
pub use scheduler::Scheduler;

use core::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use meridian_hooks::{BoxError, HookMap};

use crate::app::App;
use crate::event::AppEvent;

/// Result of a plugin setup.
pub type SetupResult = Result<(), BoxError>;

type SetupFn = Arc<dyn Fn(Arc<App>) -> BoxFuture<'static, SetupResult> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Enforce
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse placement of a plugin within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enforce {
    /// Runs before default plugins.
    Pre,
    /// Declaration order.
    #[default]
    Default,
    /// Runs after default plugins.
    Post,
}

impl Enforce {
    /// Numeric order used for sorting.
    #[must_use]
    pub fn order(self) -> i32 {
        match self {
            Enforce::Pre => -20,
            Enforce::Default => 0,
            Enforce::Post => 20,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of setup logic run once during application bootstrap.
///
/// Only [`setup`](Plugin::setup) is required. Setup receives the application
/// instance; values are injected with [`App::provide`].
///
/// # Example
///
/// ```ignore
/// struct ApiPlugin {
///     base_url: String,
/// }
///
/// impl Plugin for ApiPlugin {
///     fn setup<'a>(&'a self, app: &'a Arc<App>) -> BoxFuture<'a, SetupResult> {
///         Box::pin(async move {
///             app.provide("api", ApiClient::new(&self.base_url));
///             Ok(())
///         })
///     }
///
///     fn name(&self) -> Option<&str> {
///         Some("api")
///     }
///
///     fn parallel(&self) -> bool {
///         true
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Runs the plugin.
    fn setup<'a>(&'a self, app: &'a Arc<App>) -> BoxFuture<'a, SetupResult>;

    /// Name other plugins use to depend on this one.
    ///
    /// Unnamed plugins are scheduled normally but cannot be depended on.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Names of plugins that must complete before this one starts.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether later plugins may start before this one completes.
    fn parallel(&self) -> bool {
        false
    }

    /// Coarse placement within the batch.
    fn enforce(&self) -> Enforce {
        Enforce::Default
    }

    /// Explicit order; overrides [`enforce`](Plugin::enforce).
    fn order(&self) -> Option<i32> {
        None
    }

    /// Hooks registered on the application before any plugin runs.
    fn hooks(&self) -> HookMap<AppEvent> {
        HookMap::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// A normalized plugin, as seen by the scheduler.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: Option<String>,
    depends_on: Vec<String>,
    parallel: bool,
    order: i32,
    hooks: HookMap<AppEvent>,
    plugin: Arc<dyn Plugin>,
}

impl PluginDescriptor {
    /// Normalizes a plugin.
    pub fn new(plugin: impl Plugin) -> Self {
        Self::from_arc(Arc::new(plugin))
    }

    /// Normalizes a shared plugin.
    pub fn from_arc(plugin: Arc<dyn Plugin>) -> Self {
        let mut depends_on: Vec<String> = Vec::new();
        for dependency in plugin.depends_on() {
            if !depends_on.contains(&dependency) {
                depends_on.push(dependency);
            }
        }

        Self {
            name: plugin.name().map(str::to_owned),
            depends_on,
            parallel: plugin.parallel(),
            order: plugin.order().unwrap_or_else(|| plugin.enforce().order()),
            hooks: plugin.hooks(),
            plugin,
        }
    }

    /// The plugin's name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The name used in logs and errors.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Declared dependency names, deduplicated.
    #[must_use]
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Whether the plugin runs in parallel.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Sort order.
    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Declarative hooks.
    #[must_use]
    pub fn hooks(&self) -> &HookMap<AppEvent> {
        &self.hooks
    }

    pub(crate) fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("parallel", &self.parallel)
            .field("order", &self.order)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Stable-sorts descriptors by order; equal orders keep declaration order.
#[must_use]
pub fn sort_by_order(mut plugins: Vec<PluginDescriptor>) -> Vec<PluginDescriptor> {
    plugins.sort_by_key(PluginDescriptor::order);
    plugins
}

// ─────────────────────────────────────────────────────────────────────────────
// DefinedPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// A plugin assembled from a closure and builder options.
///
/// Created with [`define_plugin`], or [`DefinedPlugin::hooks_only`] for a
/// plugin that only contributes hooks.
pub struct DefinedPlugin {
    name: Option<String>,
    depends_on: Vec<String>,
    parallel: bool,
    enforce: Enforce,
    order: Option<i32>,
    hooks: HookMap<AppEvent>,
    setup: Option<SetupFn>,
}

/// Defines a plugin from an async setup closure.
///
/// The plugin is unnamed and sequential until configured otherwise.
pub fn define_plugin<F, Fut>(setup: F) -> DefinedPlugin
where
    F: Fn(Arc<App>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SetupResult> + Send + 'static,
{
    DefinedPlugin {
        setup: Some(Arc::new(move |app| setup(app).boxed())),
        ..DefinedPlugin::hooks_only(HookMap::new())
    }
}

impl DefinedPlugin {
    /// A plugin without setup that only registers hooks.
    #[must_use]
    pub fn hooks_only(hooks: HookMap<AppEvent>) -> Self {
        Self {
            name: None,
            depends_on: Vec::new(),
            parallel: false,
            enforce: Enforce::Default,
            order: None,
            hooks,
            setup: None,
        }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the plugin as parallel or sequential.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets the coarse placement.
    #[must_use]
    pub fn with_enforce(mut self, enforce: Enforce) -> Self {
        self.enforce = enforce;
        self
    }

    /// Sets an explicit order.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the declarative hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookMap<AppEvent>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl Plugin for DefinedPlugin {
    fn setup<'a>(&'a self, app: &'a Arc<App>) -> BoxFuture<'a, SetupResult> {
        match &self.setup {
            Some(setup) => setup(Arc::clone(app)),
            None => async { Ok::<(), BoxError>(()) }.boxed(),
        }
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn depends_on(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn parallel(&self) -> bool {
        self.parallel
    }

    fn enforce(&self) -> Enforce {
        self.enforce
    }

    fn order(&self) -> Option<i32> {
        self.order
    }

    fn hooks(&self) -> HookMap<AppEvent> {
        self.hooks.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Types that can be added to a [`PluginSet`]: single plugins, descriptors
/// and other sets.
pub trait Plugins {
    /// Normalizes into descriptors, in order.
    fn into_descriptors(self) -> Vec<PluginDescriptor>;
}

impl<P: Plugin> Plugins for P {
    fn into_descriptors(self) -> Vec<PluginDescriptor> {
        vec![PluginDescriptor::new(self)]
    }
}

impl Plugins for PluginDescriptor {
    fn into_descriptors(self) -> Vec<PluginDescriptor> {
        vec![self]
    }
}

impl Plugins for PluginSet {
    fn into_descriptors(self) -> Vec<PluginDescriptor> {
        self.plugins
    }
}

impl Plugins for Vec<PluginDescriptor> {
    fn into_descriptors(self) -> Vec<PluginDescriptor> {
        self
    }
}

/// A named collection of plugins that can be customized before use.
///
/// ```ignore
/// let plugins = DefaultPlugins.build().disable("meridian:tracing").build();
/// ```
pub trait PluginGroup {
    /// Returns the plugins of this group.
    fn build(self) -> PluginSet;
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginSet
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered builder for a plugin batch.
#[derive(Clone, Default, Debug)]
pub struct PluginSet {
    plugins: Vec<PluginDescriptor>,
}

impl PluginSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends plugins.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add(mut self, plugins: impl Plugins) -> Self {
        self.plugins.extend(plugins.into_descriptors());
        self
    }

    /// Inserts plugins before the plugin named `target`.
    ///
    /// If `target` is not found, the plugins are added at the beginning.
    #[must_use]
    pub fn add_before(mut self, target: &str, plugins: impl Plugins) -> Self {
        let position = self.position_of(target).unwrap_or(0);
        self.plugins
            .splice(position..position, plugins.into_descriptors());
        self
    }

    /// Inserts plugins after the plugin named `target`.
    ///
    /// If `target` is not found, the plugins are added at the end.
    #[must_use]
    pub fn add_after(mut self, target: &str, plugins: impl Plugins) -> Self {
        let position = self
            .position_of(target)
            .map_or(self.plugins.len(), |index| index + 1);
        self.plugins
            .splice(position..position, plugins.into_descriptors());
        self
    }

    /// Removes every plugin named `name`. No-op if absent.
    #[must_use]
    pub fn disable(mut self, name: &str) -> Self {
        self.plugins.retain(|plugin| plugin.name() != Some(name));
        self
    }

    /// Returns the number of plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Returns the descriptors sorted by order, ready for scheduling.
    #[must_use]
    pub fn build(self) -> Vec<PluginDescriptor> {
        sort_by_order(self.plugins)
    }

    fn position_of(&self, name: &str) -> Option<usize> {
        self.plugins
            .iter()
            .position(|plugin| plugin.name() == Some(name))
    }
}
