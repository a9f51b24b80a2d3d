//! Keyed async data: run, dedupe, hydrate, refresh and clear.

use std::sync::Arc;

use futures::FutureExt;
use meridian_app::app::App;
use meridian_app::config::Dedupe;
use meridian_app::{AppError, AppEvent, hooks};
use meridian_hooks::BoxError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::entry::{AsyncDataTable, Entry, Handler};
use crate::error::AsyncDataError;
use crate::options::{AsyncDataOptions, AsyncDataSnapshot, Status};

/// Handle to one keyed data cell.
///
/// Handles are cheap to clone; every handle for a key observes the same cell.
#[derive(Clone)]
pub struct AsyncData {
    app: Arc<App>,
    entry: Arc<Entry>,
}

impl core::fmt::Debug for AsyncData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncData")
            .field("key", &self.entry.key)
            .field("state", &self.entry.snapshot())
            .finish()
    }
}

impl AsyncData {
    /// The entry key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.entry.key
    }

    /// Current value.
    #[must_use]
    pub fn data(&self) -> Value {
        self.entry.snapshot().data
    }

    /// Current value, deserialized.
    ///
    /// # Errors
    ///
    /// Fails when the value does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, AsyncDataError> {
        Ok(serde_json::from_value(self.data())?)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.entry.snapshot().status
    }

    /// Whether an execution is in flight.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.entry.snapshot().pending()
    }

    /// Error of the last execution.
    #[must_use]
    pub fn error(&self) -> Option<AppError> {
        self.entry.snapshot().error
    }

    /// Data, status and error read together.
    #[must_use]
    pub fn snapshot(&self) -> AsyncDataSnapshot {
        self.entry.snapshot()
    }

    /// Observes every change of the cell.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AsyncDataSnapshot> {
        self.entry.subscribe()
    }

    /// Runs the handler again, aborting an execution in flight, and waits
    /// for the result.
    pub async fn refresh(&self) {
        self.entry.refresh(&self.app, Dedupe::Cancel).await;
    }

    /// Like [`refresh`](Self::refresh) with an explicit dedupe strategy.
    pub async fn refresh_with(&self, dedupe: Dedupe) {
        self.entry.refresh(&self.app, dedupe).await;
    }

    /// Waits until nothing is in flight for this key.
    pub async fn wait(&self) {
        self.entry.wait().await;
    }

    /// Aborts in-flight work, resets the cell and drops the cached value.
    pub fn clear(&self) {
        self.entry.clear(&self.app);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composables
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches data for `key` once per instance and shares it between server
/// and client.
///
/// | where              | `server` | `lazy` | behavior                              |
/// |--------------------|----------|--------|---------------------------------------|
/// | server             | `true`   |        | awaits the handler                    |
/// | server             | `false`  |        | skipped, the client fetches           |
/// | hydrating client   | `true`   |        | reuses the payload value, no fetch    |
/// | hydrating client   | `false`  |        | fetches after mount                   |
/// | navigating client  |          | `true` | fetches after mount                   |
/// | navigating client  |          | `false`| awaits the handler                    |
///
/// Concurrent calls for a key share one execution.
pub async fn use_async_data<F, Fut, T>(
    app: &Arc<App>,
    key: impl Into<String>,
    handler: F,
    options: AsyncDataOptions,
) -> AsyncData
where
    F: Fn(Arc<App>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let handler: Handler = Arc::new(move |app| {
        handler(app)
            .map(|result| -> Result<Value, AsyncDataError> {
                let value = result.map_err(AsyncDataError::Handler)?;
                Ok(serde_json::to_value(value)?)
            })
            .boxed()
    });
    run(app, key.into(), handler, options).await
}

/// [`use_async_data`] with `lazy` set.
pub async fn use_lazy_async_data<F, Fut, T>(
    app: &Arc<App>,
    key: impl Into<String>,
    handler: F,
    options: AsyncDataOptions,
) -> AsyncData
where
    F: Fn(Arc<App>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    use_async_data(app, key, handler, options.with_lazy(true)).await
}

/// A key derived from the call order, stable between server and client as
/// long as both create entries in the same order.
#[must_use]
pub fn auto_key(app: &App) -> String {
    format!("$a{}", app.extension::<AsyncDataTable>().next_key())
}

pub(crate) async fn run(
    app: &Arc<App>,
    key: String,
    handler: Handler,
    options: AsyncDataOptions,
) -> AsyncData {
    let entry = app
        .extension::<AsyncDataTable>()
        .entry(app, &key, handler, options);
    let data = AsyncData {
        app: Arc::clone(app),
        entry: Arc::clone(&entry),
    };

    let options = &entry.options;
    let dedupe = options.dedupe.unwrap_or(app.config().data.dedupe);

    // An entry that already ran is shared: block only where a first call would.
    if entry.snapshot().status != Status::Idle {
        let blocking = if app.is_server() {
            options.server
        } else {
            !app.is_hydrating() && !options.lazy
        };
        if blocking {
            data.wait().await;
        }
        return data;
    }

    // Server values seed the cell even when the first fetch is postponed.
    let reuses_server_value = !app.is_hydrating() || options.server;
    if reuses_server_value && let Some(cached) = options.cached(&key, app) {
        entry.restore(cached);
        return data;
    }
    if app.is_hydrating()
        && options.server
        && let Some(error) = app.with_payload(|payload| payload.errors.get(&key).cloned())
    {
        entry.restore_error(error);
        return data;
    }

    if !options.immediate {
        return data;
    }

    if app.is_server() {
        if options.server {
            entry.execute(app, dedupe).await;
            data.wait().await;
        }
        return data;
    }

    if app.is_hydrating() {
        if options.server {
            tracing::debug!(key = %key, "no server value for hydrating key; fetching after mount");
        }
        after_mount(app, &entry, dedupe);
        return data;
    }

    if options.lazy {
        after_mount(app, &entry, dedupe);
    } else {
        entry.execute(app, dedupe).await;
        data.wait().await;
    }
    data
}

/// Starts an execution once the host has mounted, without waiting for it.
fn after_mount(app: &Arc<App>, entry: &Arc<Entry>, dedupe: Dedupe) {
    if app.is_mounted() {
        drop(entry.execute(app, dedupe));
        return;
    }
    let entry = Arc::clone(entry);
    app.on_mount(move |app| async move {
        drop(entry.execute(&app, dedupe));
    });
}

/// Refreshes the entries with `keys`, or every entry when `None`, and waits
/// for them.
pub async fn refresh_app_data(app: &Arc<App>, keys: Option<&[&str]>) {
    let keys = keys.map(|keys| keys.iter().map(|key| (*key).to_owned()).collect());
    app.run_with_context(
        app.hooks()
            .call_parallel(hooks::APP_DATA_REFRESH, AppEvent::DataRefresh { keys }),
    )
    .await;
}

/// Selects entries for [`clear_app_data`].
#[derive(Clone)]
pub enum KeyFilter {
    /// Every entry.
    All,
    /// Entries with these keys.
    Keys(Vec<String>),
    /// Entries whose key satisfies the predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl KeyFilter {
    /// Matches the given keys.
    #[must_use]
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyFilter::Keys(keys.into_iter().map(Into::into).collect())
    }

    /// Matches keys satisfying `predicate`.
    #[must_use]
    pub fn predicate(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        KeyFilter::Predicate(Arc::new(predicate))
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::Keys(keys) => keys.iter().any(|candidate| candidate == key),
            KeyFilter::Predicate(predicate) => predicate(key),
        }
    }
}

/// Clears matching entries and their cached payload values.
pub fn clear_app_data(app: &App, filter: &KeyFilter) {
    let table = app.extension::<AsyncDataTable>();
    for entry in table.matching(|key| filter.matches(key)) {
        entry.clear(app);
    }
    app.update_payload(|payload| {
        payload.data.retain(|key, _| !filter.matches(key));
        payload.errors.retain(|key, _| !filter.matches(key));
    });
}

/// Reads the cached value of `key` from the payload.
#[must_use]
pub fn use_app_data(app: &App, key: &str) -> Option<Value> {
    app.with_payload(|payload| payload.data.get(key).cloned())
}
