//! Keyed data entries owned by the application instance.
//!
//! Every key has one [`Entry`]. An entry runs at most one execution at a
//! time: a new request either joins the in-flight execution or aborts it and
//! starts over, depending on [`Dedupe`]. Results are applied to the entry's
//! watch channel and to the payload under the entry's lock, so readers never
//! observe one without the other.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{AbortHandle, Abortable, BoxFuture, Shared};
use hashbrown::HashMap;
use meridian_app::app::{App, Extension};
use meridian_app::config::Dedupe;
use meridian_app::{AppError, AppEvent, hooks};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;

use crate::error::AsyncDataError;
use crate::options::{AsyncDataOptions, AsyncDataSnapshot, Status, merge};

/// A type-erased data handler.
pub(crate) type Handler =
    Arc<dyn Fn(Arc<App>) -> BoxFuture<'static, Result<Value, AsyncDataError>> + Send + Sync>;

type Completion = Shared<BoxFuture<'static, ()>>;

struct InFlight {
    generation: u64,
    completion: Completion,
    abort: AbortHandle,
}

// ─────────────────────────────────────────────────────────────────────────────
// Table
// ─────────────────────────────────────────────────────────────────────────────

/// All data entries of one application instance.
#[derive(Default)]
pub(crate) struct AsyncDataTable {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    next_key: AtomicU64,
}

impl Extension for AsyncDataTable {}

impl Drop for AsyncDataTable {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values() {
            entry.abort();
        }
    }
}

impl AsyncDataTable {
    /// Returns the entry for `key`, creating it with `handler` and `options`
    /// when absent. An existing entry keeps its first handler and options.
    pub(crate) fn entry(
        &self,
        app: &Arc<App>,
        key: &str,
        handler: Handler,
        options: AsyncDataOptions,
    ) -> Arc<Entry> {
        if let Some(existing) = self.get(key) {
            return existing;
        }

        let entry = {
            let mut entries = self.entries.write();
            if let Some(existing) = entries.get(key) {
                return Arc::clone(existing);
            }
            let entry = Arc::new(Entry::new(key, handler, options));
            entries.insert(key.to_owned(), Arc::clone(&entry));
            entry
        };
        entry.listen_for_refresh(app);
        tracing::debug!(app = app.id(), key, "async data entry created");
        entry
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<Entry>> {
        self.entries.read().get(key).cloned()
    }

    pub(crate) fn matching(&self, mut filter: impl FnMut(&str) -> bool) -> Vec<Arc<Entry>> {
        self.entries
            .read()
            .values()
            .filter(|entry| filter(&entry.key))
            .cloned()
            .collect()
    }

    pub(crate) fn next_key(&self) -> u64 {
        self.next_key.fetch_add(1, Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry
// ─────────────────────────────────────────────────────────────────────────────

/// One keyed data cell and its execution state.
pub(crate) struct Entry {
    pub(crate) key: String,
    handler: Handler,
    pub(crate) options: AsyncDataOptions,
    state: watch::Sender<AsyncDataSnapshot>,
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
}

impl Entry {
    fn new(key: &str, handler: Handler, options: AsyncDataOptions) -> Self {
        let (state, _) = watch::channel(AsyncDataSnapshot {
            data: options.default_value(),
            ..AsyncDataSnapshot::default()
        });
        Self {
            key: key.to_owned(),
            handler,
            options,
            state,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// Refreshes this entry whenever `app:data:refresh` names its key.
    fn listen_for_refresh(self: &Arc<Self>, app: &Arc<App>) {
        let entry: Weak<Entry> = Arc::downgrade(self);
        let owner: Weak<App> = Arc::downgrade(app);
        app.hooks().hook_fn(hooks::APP_DATA_REFRESH, move |event| {
            let entry = entry.upgrade();
            let app = owner.upgrade();
            async move {
                let (Some(entry), Some(app)) = (entry, app) else {
                    return Ok(());
                };
                if let AppEvent::DataRefresh { keys } = event
                    && keys.is_none_or(|keys| keys.contains(&entry.key))
                {
                    entry.refresh(&app, Dedupe::Cancel).await;
                }
                Ok(())
            }
        });
    }

    pub(crate) fn snapshot(&self) -> AsyncDataSnapshot {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AsyncDataSnapshot> {
        self.state.subscribe()
    }

    /// Marks the cell as holding a value produced elsewhere (hydration).
    pub(crate) fn restore(&self, data: Value) {
        self.state.send_modify(|snapshot| {
            snapshot.data = data;
            snapshot.status = Status::Success;
            snapshot.error = None;
        });
    }

    /// Marks the cell as failed with an error produced elsewhere (hydration).
    pub(crate) fn restore_error(&self, error: AppError) {
        self.state.send_modify(|snapshot| {
            snapshot.status = Status::Error;
            snapshot.error = Some(error);
        });
    }

    /// Starts an execution, or joins the one in flight under
    /// [`Dedupe::Defer`]. The returned future completes when that execution
    /// settles or is aborted.
    pub(crate) fn execute(self: &Arc<Self>, app: &Arc<App>, dedupe: Dedupe) -> Completion {
        let mut in_flight = self.in_flight.lock();
        if let Some(current) = in_flight.as_ref() {
            match dedupe {
                Dedupe::Defer => return current.completion.clone(),
                Dedupe::Cancel => {
                    tracing::debug!(key = %self.key, "aborting superseded execution");
                    current.abort.abort();
                }
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_modify(|snapshot| snapshot.status = Status::Pending);

        let timeout = self
            .options
            .timeout
            .or_else(|| app.config().data.timeout());
        let run = {
            let entry = Arc::clone(self);
            let app = Arc::clone(app);
            let handler = Arc::clone(&self.handler);
            async move {
                let call = app.run_with_context(handler(Arc::clone(&app)));
                let result = match timeout {
                    Some(limit) => tokio::time::timeout(limit, call)
                        .await
                        .unwrap_or(Err(AsyncDataError::Timeout(limit))),
                    None => call.await,
                };
                entry.settle(&app, generation, result);
            }
        };

        let (abort, registration) = AbortHandle::new_pair();
        let task = tokio::spawn(Abortable::new(run, registration));
        let completion = async move {
            if let Err(error) = task.await {
                tracing::error!(%error, "async data task failed");
            }
        }
        .boxed()
        .shared();

        *in_flight = Some(InFlight {
            generation,
            completion: completion.clone(),
            abort,
        });
        completion
    }

    /// Runs a new execution and waits until the entry has nothing in flight.
    pub(crate) async fn refresh(self: &Arc<Self>, app: &Arc<App>, dedupe: Dedupe) {
        self.execute(app, dedupe).await;
        self.wait().await;
    }

    /// Waits for the in-flight execution, following replacements started
    /// while waiting.
    pub(crate) async fn wait(&self) {
        loop {
            let completion = self
                .in_flight
                .lock()
                .as_ref()
                .map(|current| current.completion.clone());
            match completion {
                Some(completion) => completion.await,
                None => break,
            }
        }
    }

    fn settle(&self, app: &App, generation: u64, result: Result<Value, AsyncDataError>) {
        let mut in_flight = self.in_flight.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(key = %self.key, generation, "ignoring superseded result");
            return;
        }

        match result {
            Ok(value) => {
                let value = self.options.shape(value);
                let mut data = Value::Null;
                self.state.send_modify(|snapshot| {
                    merge(&mut snapshot.data, value);
                    snapshot.status = Status::Success;
                    snapshot.error = None;
                    data = snapshot.data.clone();
                });
                app.update_payload(|payload| {
                    payload.data.insert(self.key.clone(), data);
                    payload.errors.shift_remove(&self.key);
                });
                tracing::debug!(key = %self.key, "async data resolved");
            }
            Err(error) => {
                tracing::warn!(key = %self.key, %error, "async data failed");
                let error = AppError::from(&error);
                self.state.send_modify(|snapshot| {
                    snapshot.status = Status::Error;
                    snapshot.error = Some(error.clone());
                });
                app.update_payload(|payload| {
                    payload.errors.insert(self.key.clone(), error);
                });
            }
        }

        if in_flight
            .as_ref()
            .is_some_and(|current| current.generation == generation)
        {
            *in_flight = None;
        }
    }

    /// Aborts in-flight work and invalidates its result.
    fn abort(&self) {
        let mut in_flight = self.in_flight.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(current) = in_flight.take() {
            current.abort.abort();
        }
    }

    /// Aborts in-flight work, resets the cell and removes the key from the
    /// payload.
    pub(crate) fn clear(&self, app: &App) {
        self.abort();
        self.state.send_replace(AsyncDataSnapshot {
            data: self.options.default_value(),
            ..AsyncDataSnapshot::default()
        });
        app.update_payload(|payload| {
            payload.data.remove(&self.key);
            payload.errors.shift_remove(&self.key);
        });
    }
}
