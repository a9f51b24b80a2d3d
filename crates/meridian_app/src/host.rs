//! The UI framework the application renders with.
//!
//! Component rendering, reactivity and mounting belong to the host; the
//! framework only calls it at the right lifecycle points and hands it the
//! values plugins provide.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use meridian_hooks::BoxError;
use parking_lot::RwLock;

use crate::app::{App, Injection};

/// A host UI framework.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Host name used in [`App::versions`].
    fn name(&self) -> &str {
        "host"
    }

    /// Host version used in [`App::versions`].
    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Makes a provided value (`$name`) reachable from every component.
    fn expose_global(&self, _name: &str, _value: Injection) {}

    /// Renders the current route to an HTML string on the server.
    async fn render_to_string(&self, app: &Arc<App>) -> Result<String, BoxError>;

    /// Mounts the application on the client.
    async fn mount(&self, _app: &Arc<App>) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A host without components: renders an empty root and keeps the exposed
/// globals for inspection.
#[derive(Default)]
pub struct HeadlessHost {
    globals: RwLock<IndexMap<String, Injection>>,
}

impl HeadlessHost {
    /// Creates the host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an exposed global by name (including the `$`).
    #[must_use]
    pub fn global<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.globals.read().get(name).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Names of the exposed globals, in exposure order.
    #[must_use]
    pub fn global_names(&self) -> Vec<String> {
        self.globals.read().keys().cloned().collect()
    }
}

#[async_trait]
impl Host for HeadlessHost {
    fn name(&self) -> &str {
        "headless"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn expose_global(&self, name: &str, value: Injection) {
        self.globals.write().entry(name.to_owned()).or_insert(value);
    }

    async fn render_to_string(&self, app: &Arc<App>) -> Result<String, BoxError> {
        Ok(format!(r#"<div id="__{}"></div>"#, app.config().global_name))
    }
}
