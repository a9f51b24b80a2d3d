//! Executes a plugin batch with controlled parallelism.
//!
//! Plugins are visited in declaration order:
//!
//! 1. A plugin with unresolved in-batch dependencies is parked.
//! 2. A sequential plugin runs and is awaited before the next plugin is
//!    visited.
//! 3. A parallel plugin is polled once, so its synchronous prefix runs
//!    immediately, then continues as a tokio task.
//!
//! When a named plugin completes, every parked plugin waiting only on it is
//! executed from that completion, under the same rules. After the visit, all
//! parallel work is drained, including work started by completions.

use core::task::Poll;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use hashbrown::HashSet;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{ExecutionPlan, PluginDescriptor};
use crate::app::App;
use crate::config::SchedulerConfig;
use crate::error::PluginError;

/// Runs plugin batches against an application instance.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Registers the hooks of every plugin, then runs all setups.
    ///
    /// Returns once every started plugin has settled. The first setup error
    /// is returned; a failing sequential plugin stops the visit, and the
    /// parallel plugins already started are awaited before it is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`PluginError`] raised by a setup, or
    /// [`PluginError::CircularDependency`] when cycles are rejected.
    pub async fn apply(
        &self,
        app: &Arc<App>,
        plugins: &[PluginDescriptor],
    ) -> Result<(), PluginError> {
        let plan = ExecutionPlan::build(plugins, self.config.cycle_policy)?;

        for plugin in plugins {
            app.hooks().add_hooks(plugin.hooks());
        }

        tracing::debug!(app = app.id(), plugins = plugins.len(), "applying plugins");

        let run = Arc::new(Run {
            app: Arc::clone(app),
            plugins: plugins.to_vec(),
            plan,
            state: Mutex::new(RunState::default()),
        });

        for index in 0..run.plugins.len() {
            if let Err(error) = Arc::clone(&run).execute(index).await {
                let running = run.state.lock().parallel.len();
                if running > 0 {
                    tracing::warn!(
                        running,
                        "sequential plugin failed; waiting for started parallel plugins"
                    );
                }
                run.drain().await;
                return Err(error);
            }
        }
        run.drain().await;

        let mut state = run.state.lock();
        if !state.parked.is_empty() {
            let stalled: Vec<&str> = state
                .parked
                .iter()
                .map(|parked| run.plugins[parked.index].display_name())
                .collect();
            tracing::warn!(plugins = ?stalled, "plugins never started because a dependency failed");
        }
        match state.errors.drain(..).next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

struct Parked {
    index: usize,
    waiting_on: HashSet<String>,
}

#[derive(Default)]
struct RunState {
    resolved: HashSet<String>,
    parked: Vec<Parked>,
    parallel: Vec<(String, JoinHandle<Result<(), PluginError>>)>,
    errors: Vec<PluginError>,
}

/// State of one batch execution, shared by every plugin task.
struct Run {
    app: Arc<App>,
    plugins: Vec<PluginDescriptor>,
    plan: ExecutionPlan,
    state: Mutex<RunState>,
}

impl Run {
    /// Parks, runs inline or spawns the plugin at `index`.
    fn execute(self: Arc<Self>, index: usize) -> BoxFuture<'static, Result<(), PluginError>> {
        async move {
            let plugin = &self.plugins[index];

            {
                let mut state = self.state.lock();
                let waiting_on: HashSet<String> = self
                    .plan
                    .dependencies(index)
                    .iter()
                    .filter(|name| !state.resolved.contains(name.as_str()))
                    .cloned()
                    .collect();
                if !waiting_on.is_empty() {
                    tracing::debug!(
                        plugin = plugin.display_name(),
                        waiting_on = ?waiting_on,
                        "plugin waiting for dependencies"
                    );
                    state.parked.push(Parked { index, waiting_on });
                    return Ok(());
                }
            }

            let mut setup = Arc::clone(&self).run(index);
            if !plugin.is_parallel() {
                return setup.await;
            }

            let polled = futures::poll!(&mut setup);
            match polled {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(error)) => self.state.lock().errors.push(error),
                Poll::Pending => {
                    let handle = tokio::spawn(setup);
                    self.state
                        .lock()
                        .parallel
                        .push((plugin.display_name().to_owned(), handle));
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Runs the setup, then releases plugins that were waiting for it.
    fn run(self: Arc<Self>, index: usize) -> BoxFuture<'static, Result<(), PluginError>> {
        async move {
            let plugin = &self.plugins[index];
            let span = tracing::debug_span!("plugin", name = plugin.display_name());

            let setup = Arc::clone(plugin.plugin());
            let app = Arc::clone(&self.app);
            let result = self
                .app
                .run_with_context(async { setup.setup(&app).await })
                .instrument(span)
                .await;

            if let Err(source) = result {
                tracing::error!(plugin = plugin.display_name(), error = %source, "plugin setup failed");
                return Err(PluginError::Setup {
                    plugin: plugin.display_name().to_owned(),
                    source,
                });
            }
            tracing::debug!(plugin = plugin.display_name(), "plugin setup completed");

            let Some(name) = plugin.name() else {
                return Ok(());
            };

            let ready: Vec<usize> = {
                let mut state = self.state.lock();
                state.resolved.insert(name.to_owned());
                let mut ready = Vec::new();
                state.parked.retain_mut(|parked| {
                    parked.waiting_on.remove(name);
                    if parked.waiting_on.is_empty() {
                        ready.push(parked.index);
                        false
                    } else {
                        true
                    }
                });
                ready
            };

            join_all(ready.into_iter().map(|index| Arc::clone(&self).execute(index)))
                .await
                .into_iter()
                .collect()
        }
        .boxed()
    }

    /// Awaits spawned plugins until no more are started.
    async fn drain(&self) {
        loop {
            let batch = core::mem::take(&mut self.state.lock().parallel);
            if batch.is_empty() {
                break;
            }

            for (plugin, handle) in batch {
                let error = match handle.await {
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => error,
                    Err(join_error) => {
                        tracing::error!(plugin = %plugin, error = %join_error, "plugin task failed");
                        PluginError::Panicked { plugin }
                    }
                };
                self.state.lock().errors.push(error);
            }
        }
    }
}
