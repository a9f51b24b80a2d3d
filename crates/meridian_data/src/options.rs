//! Per-key fetch options and observable state.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use meridian_app::AppError;
use meridian_app::app::App;
use meridian_app::config::Dedupe;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Builds the value a cell holds before the first result.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Rewrites a handler result before it is stored.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Looks up a cached value for a key; `None` means fetch.
pub type CachedDataFn = Arc<dyn Fn(&str, &App) -> Option<Value> + Send + Sync>;

/// Lifecycle of a data cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing was fetched yet, or the cell was cleared.
    #[default]
    Idle,
    /// An execution is in flight.
    Pending,
    /// The last execution succeeded.
    Success,
    /// The last execution failed.
    Error,
}

/// The observable state of one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsyncDataSnapshot {
    /// Current value; the default value until a result arrives.
    pub data: Value,
    /// Current status.
    pub status: Status,
    /// Error of the last execution, cleared on success.
    pub error: Option<AppError>,
}

impl AsyncDataSnapshot {
    /// Whether an execution is in flight.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.status == Status::Pending
    }
}

/// Options for [`use_async_data`](crate::use_async_data).
#[derive(Clone)]
pub struct AsyncDataOptions {
    pub(crate) server: bool,
    pub(crate) lazy: bool,
    pub(crate) immediate: bool,
    pub(crate) dedupe: Option<Dedupe>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) default: Option<DefaultFn>,
    pub(crate) transform: Option<TransformFn>,
    pub(crate) pick: Option<Vec<String>>,
    pub(crate) get_cached_data: Option<CachedDataFn>,
}

impl Default for AsyncDataOptions {
    fn default() -> Self {
        Self {
            server: true,
            lazy: false,
            immediate: true,
            dedupe: None,
            timeout: None,
            default: None,
            transform: None,
            pick: None,
            get_cached_data: None,
        }
    }
}

impl fmt::Debug for AsyncDataOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDataOptions")
            .field("server", &self.server)
            .field("lazy", &self.lazy)
            .field("immediate", &self.immediate)
            .field("dedupe", &self.dedupe)
            .field("timeout", &self.timeout)
            .field("pick", &self.pick)
            .finish_non_exhaustive()
    }
}

impl AsyncDataOptions {
    /// Default options: fetch on the server, block until the result arrives.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the server fetches this key. When `false` the client fetches
    /// after mounting.
    #[must_use]
    pub fn with_server(mut self, server: bool) -> Self {
        self.server = server;
        self
    }

    /// Don't block client navigation; fetch after mounting instead.
    #[must_use]
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// When `false`, nothing runs until [`AsyncData::refresh`](crate::AsyncData::refresh).
    #[must_use]
    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Overrides the configured dedupe strategy for the first run.
    #[must_use]
    pub fn with_dedupe(mut self, dedupe: Dedupe) -> Self {
        self.dedupe = Some(dedupe);
        self
    }

    /// Fails executions that take longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the value the cell holds before the first result and after
    /// clearing.
    #[must_use]
    pub fn with_default(mut self, default: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(default));
        self
    }

    /// Rewrites results before they are stored.
    #[must_use]
    pub fn with_transform(mut self, transform: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Keeps only these top-level fields of object results.
    #[must_use]
    pub fn with_pick<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pick = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the cache lookup used for the first run and while hydrating.
    #[must_use]
    pub fn with_get_cached_data(
        mut self,
        lookup: impl Fn(&str, &App) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.get_cached_data = Some(Arc::new(lookup));
        self
    }

    pub(crate) fn default_value(&self) -> Value {
        self.default.as_ref().map_or(Value::Null, |default| default())
    }

    /// Applies `transform` then `pick`.
    pub(crate) fn shape(&self, value: Value) -> Value {
        let value = match &self.transform {
            Some(transform) => transform(value),
            None => value,
        };
        match (&self.pick, value) {
            (Some(fields), Value::Object(mut object)) => {
                object.retain(|key, _| fields.iter().any(|field| field == key));
                Value::Object(object)
            }
            (_, value) => value,
        }
    }

    pub(crate) fn cached(&self, key: &str, app: &App) -> Option<Value> {
        match &self.get_cached_data {
            Some(lookup) => lookup(key, app),
            None if app.is_hydrating() => app.with_payload(|payload| payload.data.get(key).cloned()),
            None => None,
        }
    }
}

/// Merges a result into the current value: objects are merged key by key at
/// the top level, anything else replaces the value.
pub(crate) fn merge(current: &mut Value, incoming: Value) {
    match (current, incoming) {
        (Value::Object(current), Value::Object(incoming)) => current.extend(incoming),
        (current, incoming) => *current = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pick_keeps_listed_fields() {
        let options = AsyncDataOptions::new().with_pick(["id", "title"]);
        let shaped = options.shape(json!({ "id": 1, "title": "t", "body": "long" }));
        assert_eq!(shaped, json!({ "id": 1, "title": "t" }));
    }

    #[test]
    fn transform_runs_before_pick() {
        let options = AsyncDataOptions::new()
            .with_transform(|value| json!({ "count": value.as_array().map_or(0, Vec::len), "raw": value }))
            .with_pick(["count"]);
        assert_eq!(options.shape(json!([1, 2, 3])), json!({ "count": 3 }));
    }

    #[test]
    fn merge_is_shallow_for_objects() {
        let mut current = json!({ "a": 1, "nested": { "x": 1 } });
        merge(&mut current, json!({ "b": 2, "nested": { "y": 2 } }));
        assert_eq!(current, json!({ "a": 1, "b": 2, "nested": { "y": 2 } }));

        merge(&mut current, json!([1]));
        assert_eq!(current, json!([1]));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Status::Pending).unwrap(), json!("pending"));
    }
}
