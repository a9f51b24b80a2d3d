//! The hook registry and its invocation rules.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::error::{BoxError, HookError};
use crate::tree::{HookMap, flatten};

/// Name of the hook that receives escalated listener failures.
pub const ERROR_HOOK: &str = "error";

/// Result returned by a hook listener.
pub type HookResult = Result<(), BoxError>;

/// Type-erased async hook listener.
///
/// Listeners receive their own clone of the event.
pub type Hook<E> = Arc<dyn Fn(E) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Wraps an async closure into a [`Hook`].
pub fn hook_fn<E, F, Fut>(f: F) -> Hook<E>
where
    E: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Events carried by a [`HookBus`].
pub trait HookEvent: Clone + Send + Sync + 'static {
    /// Builds the event passed to the [`ERROR_HOOK`] listeners when a listener
    /// of another hook fails.
    fn from_failure(error: Arc<HookError>) -> Self;
}

// ─────────────────────────────────────────────────────────────────────────────
// HookId
// ─────────────────────────────────────────────────────────────────────────────

/// Handle of one registered listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook_{}", self.0)
    }
}

struct HookEntry<E> {
    id: HookId,
    hook: Hook<E>,
}

struct DeprecatedHook {
    to: String,
    warned: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// HookBus
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of named async hooks.
///
/// # Thread Safety
///
/// Registration and invocation go through [`RwLock`]s that are never held
/// across an `.await`. A call works on a snapshot of the listeners, so
/// listeners may register or remove hooks while they run.
pub struct HookBus<E> {
    listeners: RwLock<HashMap<String, Vec<HookEntry<E>>>>,
    deprecated: RwLock<HashMap<String, DeprecatedHook>>,
    next_id: AtomicU64,
}

impl<E> Default for HookBus<E> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            deprecated: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<E> fmt::Debug for HookBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        f.debug_map()
            .entries(listeners.iter().map(|(name, entries)| (name, entries.len())))
            .finish()
    }
}

impl<E: HookEvent> HookBus<E> {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for `name`.
    ///
    /// Returns `None` without registering anything when `name` is empty.
    /// Registering under a deprecated name registers under its replacement
    /// and warns the first time.
    pub fn hook(&self, name: &str, hook: Hook<E>) -> Option<HookId> {
        if name.is_empty() {
            return None;
        }

        let name = self.resolve_alias(name);
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(name)
            .or_default()
            .push(HookEntry { id, hook });
        Some(id)
    }

    /// Registers an async closure for `name`. See [`hook`](Self::hook).
    pub fn hook_fn<F, Fut>(&self, name: &str, f: F) -> Option<HookId>
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.hook(name, hook_fn(f))
    }

    /// Flattens a nested hook map and registers every non-empty entry.
    ///
    /// Returns the ids of the registered listeners in declaration order.
    pub fn add_hooks(&self, hooks: &HookMap<E>) -> Vec<HookId> {
        flatten(hooks)
            .into_iter()
            .filter_map(|(name, hook)| hook.and_then(|hook| self.hook(&name, hook)))
            .collect()
    }

    /// Removes one listener. Returns `true` if it was registered.
    pub fn remove(&self, name: &str, id: HookId) -> bool {
        let name = self.canonical_name(name);
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&name);
        }
        removed
    }

    /// Removes the listeners of one hook, or of every hook when `name` is `None`.
    pub fn clear(&self, name: Option<&str>) {
        let mut listeners = self.listeners.write();
        match name {
            Some(name) => {
                listeners.remove(&self.canonical_name(name));
            }
            None => listeners.clear(),
        }
    }

    /// Marks `old` as a deprecated alias of `new`.
    ///
    /// Listeners already registered under `old` move to `new`.
    pub fn deprecate(&self, old: impl Into<String>, new: impl Into<String>) {
        let old = old.into();
        let new = new.into();

        let moved = self.listeners.write().remove(&old);
        if let Some(entries) = moved {
            self.listeners
                .write()
                .entry(new.clone())
                .or_default()
                .extend(entries);
        }

        self.deprecated.write().insert(
            old,
            DeprecatedHook {
                to: new,
                warned: false,
            },
        );
    }

    /// Returns the number of listeners registered for `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .read()
            .get(&self.canonical_name(name))
            .map_or(0, Vec::len)
    }

    /// Checks if any listener is registered for `name`.
    #[must_use]
    pub fn has_listeners(&self, name: &str) -> bool {
        self.listener_count(name) > 0
    }

    /// Calls the listeners of `name` one after another in registration order.
    ///
    /// Each listener is awaited before the next one starts. The first failure
    /// stops the chain and is escalated, so this never returns an error.
    pub async fn call(&self, name: &str, event: E) {
        let hooks = self.snapshot(name);
        if hooks.is_empty() {
            return;
        }

        tracing::debug!(hook = name, listeners = hooks.len(), "calling hook");
        for hook in hooks {
            if let Err(source) = hook(event.clone()).await {
                self.escalate(name, HookError::new(name, source)).await;
                return;
            }
        }
    }

    /// Calls the listeners of `name` concurrently and waits for all of them.
    ///
    /// The first failure is escalated once every listener has settled.
    pub async fn call_parallel(&self, name: &str, event: E) {
        let hooks = self.snapshot(name);
        if hooks.is_empty() {
            return;
        }

        tracing::debug!(hook = name, listeners = hooks.len(), "calling hook in parallel");
        let results = join_all(hooks.iter().map(|hook| hook(event.clone()))).await;
        if let Some(source) = results.into_iter().find_map(Result::err) {
            self.escalate(name, HookError::new(name, source)).await;
        }
    }

    /// Logs a failure and hands it to the error hook, unless it came from there.
    async fn escalate(&self, name: &str, error: HookError) {
        tracing::error!(hook = name, error = %error, "hook listener failed");
        if name == ERROR_HOOK {
            return;
        }

        let error = Arc::new(error);
        for hook in self.snapshot(ERROR_HOOK) {
            if let Err(source) = hook(E::from_failure(Arc::clone(&error))).await {
                tracing::error!(hook = ERROR_HOOK, error = %source, "error hook listener failed");
                return;
            }
        }
    }

    fn snapshot(&self, name: &str) -> Vec<Hook<E>> {
        self.listeners
            .read()
            .get(&self.canonical_name(name))
            .map(|entries| entries.iter().map(|entry| Arc::clone(&entry.hook)).collect())
            .unwrap_or_default()
    }

    fn canonical_name(&self, name: &str) -> String {
        self.deprecated
            .read()
            .get(name)
            .map_or_else(|| name.to_owned(), |alias| alias.to.clone())
    }

    fn resolve_alias(&self, name: &str) -> String {
        let mut deprecated = self.deprecated.write();
        let Some(alias) = deprecated.get_mut(name) else {
            return name.to_owned();
        };
        if !alias.warned {
            alias.warned = true;
            tracing::warn!(
                hook = name,
                replacement = %alias.to,
                "hook is deprecated, register the replacement instead"
            );
        }
        alias.to.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::HookTree;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    enum TestEvent {
        Ping(u32),
        Failure(String),
    }

    impl HookEvent for TestEvent {
        fn from_failure(error: Arc<HookError>) -> Self {
            TestEvent::Failure(error.to_string())
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(bus: &HookBus<TestEvent>, name: &str, label: &'static str, log: &Log) -> HookId {
        let log = Arc::clone(log);
        bus.hook_fn(name, move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(label.to_string());
                Ok(())
            }
        })
        .expect("non-empty name registers")
    }

    #[test]
    fn hook_increments_count() {
        let bus = HookBus::<TestEvent>::new();
        let log = Log::default();

        recorder(&bus, "app:created", "a", &log);
        assert_eq!(bus.listener_count("app:created"), 1);

        recorder(&bus, "app:created", "b", &log);
        assert_eq!(bus.listener_count("app:created"), 2);
        assert!(!bus.has_listeners("app:mounted"));
    }

    #[test]
    fn hook_with_empty_name_is_ignored() {
        let bus = HookBus::<TestEvent>::new();
        let id = bus.hook_fn("", |_| async { Ok(()) });

        assert!(id.is_none());
        assert_eq!(bus.listener_count(""), 0);
    }

    #[tokio::test]
    async fn call_runs_listeners_in_registration_order() {
        let bus = HookBus::new();
        let log = Log::default();
        for label in ["first", "second", "third"] {
            recorder(&bus, "app:created", label, &log);
        }

        bus.call("app:created", TestEvent::Ping(1)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first", "second", "third"],
            "listeners should run in registration order"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn call_awaits_each_listener_before_the_next() {
        let bus = HookBus::new();
        let log = Log::default();

        let slow_log = Arc::clone(&log);
        bus.hook_fn("app:rendered", move |_| {
            let log = Arc::clone(&slow_log);
            async move {
                log.lock().unwrap().push("slow:start".to_string());
                tokio::time::sleep(Duration::from_millis(50)).await;
                log.lock().unwrap().push("slow:end".to_string());
                Ok(())
            }
        });
        recorder(&bus, "app:rendered", "fast", &log);

        bus.call("app:rendered", TestEvent::Ping(0)).await;

        assert_eq!(*log.lock().unwrap(), vec!["slow:start", "slow:end", "fast"]);
    }

    /// Counts every `tracing` event at any level.
    #[derive(Clone, Default)]
    struct EventCount(Arc<AtomicU64>);

    impl EventCount {
        fn get(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCount {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn call_without_listeners_is_noop() {
        use tracing_subscriber::layer::SubscriberExt;

        let events = EventCount::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        let bus = HookBus::<TestEvent>::new();

        bus.call("nonexistent", TestEvent::Ping(0)).await;
        bus.call_parallel("nonexistent", TestEvent::Ping(0)).await;

        assert_eq!(bus.listener_count("nonexistent"), 0);
        assert_eq!(events.get(), 0, "calling a hook nobody listens to must not log");

        let log = Log::default();
        recorder(&bus, "app:created", "a", &log);
        bus.call("app:created", TestEvent::Ping(0)).await;
        assert!(events.get() > 0, "calls with listeners are logged");
    }

    #[tokio::test]
    async fn failing_listener_halts_chain_and_escalates() {
        let bus = HookBus::new();
        let log = Log::default();

        recorder(&bus, "app:created", "before", &log);
        bus.hook_fn("app:created", |_| async { Err("boom".into()) });
        recorder(&bus, "app:created", "after", &log);

        let error_log = Arc::clone(&log);
        bus.hook_fn(ERROR_HOOK, move |event| {
            let log = Arc::clone(&error_log);
            async move {
                if let TestEvent::Failure(message) = event {
                    log.lock().unwrap().push(format!("error: {message}"));
                }
                Ok(())
            }
        });

        bus.call("app:created", TestEvent::Ping(0)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before", "error: hook 'app:created' failed: boom"],
            "the listener after the failure must not run"
        );
    }

    #[tokio::test]
    async fn failing_error_listener_does_not_recurse() {
        let bus = HookBus::<TestEvent>::new();
        let calls = Arc::new(Mutex::new(0_u32));

        let counter = Arc::clone(&calls);
        bus.hook_fn(ERROR_HOOK, move |_| {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock().unwrap() += 1;
                Err("error hook broke".into())
            }
        });
        bus.hook_fn("app:mounted", |_| async { Err("boom".into()) });

        bus.call("app:mounted", TestEvent::Ping(0)).await;
        assert_eq!(*calls.lock().unwrap(), 1, "error hook runs once per failure");

        bus.call(ERROR_HOOK, TestEvent::Ping(0)).await;
        assert_eq!(*calls.lock().unwrap(), 2, "direct call is not re-escalated");
    }

    #[tokio::test]
    async fn call_parallel_runs_every_listener_despite_failures() {
        let bus = HookBus::new();
        let log = Log::default();

        bus.hook_fn("app:data:refresh", |_| async { Err("first failed".into()) });
        recorder(&bus, "app:data:refresh", "second", &log);
        recorder(&bus, ERROR_HOOK, "escalated", &log);

        bus.call_parallel("app:data:refresh", TestEvent::Ping(0)).await;

        assert_eq!(*log.lock().unwrap(), vec!["second", "escalated"]);
    }

    #[tokio::test]
    async fn deprecated_alias_redirects_registration() {
        let bus = HookBus::new();
        let log = Log::default();

        recorder(&bus, "render:done", "existing", &log);
        bus.deprecate("render:done", "app:rendered");
        recorder(&bus, "render:done", "redirected", &log);
        recorder(&bus, "render:done", "again", &log);

        assert_eq!(bus.listener_count("app:rendered"), 3);

        bus.call("app:rendered", TestEvent::Ping(0)).await;
        assert_eq!(*log.lock().unwrap(), vec!["existing", "redirected", "again"]);

        let deprecated = bus.deprecated.read();
        assert!(deprecated["render:done"].warned, "warning is emitted once");
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let bus = HookBus::new();
        let log = Log::default();

        let first = recorder(&bus, "page:start", "first", &log);
        recorder(&bus, "page:start", "second", &log);
        recorder(&bus, "page:finish", "finish", &log);

        assert!(bus.remove("page:start", first));
        assert!(!bus.remove("page:start", first), "second removal finds nothing");

        bus.call("page:start", TestEvent::Ping(0)).await;
        assert_eq!(*log.lock().unwrap(), vec!["second"]);

        bus.clear(Some("page:start"));
        assert_eq!(bus.listener_count("page:start"), 0);
        assert_eq!(bus.listener_count("page:finish"), 1);

        bus.clear(None);
        assert_eq!(bus.listener_count("page:finish"), 0);
    }

    #[tokio::test]
    async fn add_hooks_skips_empty_entries() {
        let bus = HookBus::new();
        let log = Log::default();

        let created_log = Arc::clone(&log);
        let mut map = HookMap::new();
        map.insert(
            "app".to_string(),
            HookTree::nested([
                (
                    "created",
                    HookTree::hook(move |_| {
                        let log = Arc::clone(&created_log);
                        async move {
                            log.lock().unwrap().push("created".to_string());
                            Ok(())
                        }
                    }),
                ),
                ("mounted", HookTree::Empty),
            ]),
        );

        let ids = bus.add_hooks(&map);

        assert_eq!(ids.len(), 1);
        assert_eq!(bus.listener_count("app:created"), 1);
        assert_eq!(bus.listener_count("app:mounted"), 0);

        bus.call("app:created", TestEvent::Ping(0)).await;
        assert_eq!(*log.lock().unwrap(), vec!["created"]);
    }
}
