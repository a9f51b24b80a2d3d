//! Keyed async data tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use meridian_app::app::{App, Payload, SsrContext};
use meridian_app::host::HeadlessHost;
use meridian_data::{
    AsyncDataOptions, FetchRequest, KeyFilter, Status, Transport, TransportError, clear_app_data,
    refresh_app_data, use_app_data, use_async_data, use_fetch,
};
use meridian_hooks::BoxError;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

type Handler = BoxFuture<'static, Result<Value, BoxError>>;

/// A handler returning `value` after `delay_ms`, counting its invocations.
fn counting(
    counter: &Arc<AtomicUsize>,
    value: Value,
    delay_ms: u64,
) -> impl Fn(Arc<App>) -> Handler + Clone + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        let value = value.clone();
        async move {
            sleep(Duration::from_millis(delay_ms)).await;
            Ok(value)
        }
        .boxed()
    }
}

fn server_app() -> Arc<App> {
    App::builder(Arc::new(HeadlessHost::new()))
        .server(SsrContext::new("/"))
        .build()
}

fn client_app(payload: Payload) -> Arc<App> {
    App::builder(Arc::new(HeadlessHost::new()))
        .client(payload)
        .build()
}

/// A client that is navigating, not hydrating.
fn navigating_app() -> Arc<App> {
    client_app(Payload::default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Dedup and hydration
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_calls_share_one_execution() {
    let app = server_app();
    let counter = Arc::new(AtomicUsize::new(0));
    let handler = counting(&counter, json!({ "ok": true }), 10);

    let (first, second) = tokio::join!(
        use_async_data(&app, "test", handler.clone(), AsyncDataOptions::new()),
        use_async_data(&app, "test", handler, AsyncDataOptions::new()),
    );

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(first.data(), json!({ "ok": true }));
    assert_eq!(second.data(), first.data());
    assert_eq!(second.status(), Status::Success);
}

#[tokio::test(start_paused = true)]
async fn server_results_are_written_to_the_payload() {
    let app = server_app();
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(&app, "x", counting(&counter, json!({ "v": 1 }), 5), AsyncDataOptions::new()).await;

    assert!(!data.pending());
    assert_eq!(use_app_data(&app, "x"), Some(json!({ "v": 1 })));
}

#[tokio::test(start_paused = true)]
async fn hydrating_client_reuses_the_server_value() {
    let mut payload = Payload::server("/");
    payload.data.insert("x".into(), json!({ "v": 1 }));
    let app = client_app(payload);
    assert!(app.is_hydrating());
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(&app, "x", counting(&counter, json!({ "v": 2 }), 5), AsyncDataOptions::new()).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!data.pending());
    assert_eq!(data.status(), Status::Success);
    assert_eq!(data.data(), json!({ "v": 1 }));
}

#[tokio::test(start_paused = true)]
async fn hydrating_client_seeds_postponed_data_from_the_server() {
    let mut payload = Payload::server("/");
    payload.data.insert("x".into(), json!({ "v": 1 }));
    let app = client_app(payload);
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "x",
        counting(&counter, json!({ "v": 2 }), 5),
        AsyncDataOptions::new().with_immediate(false),
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(data.status(), Status::Success);
    assert_eq!(data.data(), json!({ "v": 1 }));
}

#[tokio::test(start_paused = true)]
async fn hydrating_client_restores_server_errors() {
    let mut payload = Payload::server("/");
    payload
        .errors
        .insert("x".into(), meridian_app::AppError::new(502, "upstream down"));
    let app = client_app(payload);
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(&app, "x", counting(&counter, json!(1), 5), AsyncDataOptions::new()).await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(data.status(), Status::Error);
    assert_eq!(data.error().unwrap().status_code, 502);
}

#[tokio::test(start_paused = true)]
async fn client_only_data_is_fetched_after_mount() {
    let app = client_app(Payload::server("/"));
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "late",
        counting(&counter, json!("fresh"), 5),
        AsyncDataOptions::new().with_server(false),
    )
    .await;
    assert_eq!(data.status(), Status::Idle);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    app.flush_mount_queue().await;
    assert!(data.pending());
    data.wait().await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(data.data(), json!("fresh"));
}

#[tokio::test(start_paused = true)]
async fn server_skips_client_only_data() {
    let app = server_app();
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "client",
        counting(&counter, json!(1), 5),
        AsyncDataOptions::new().with_server(false),
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(data.status(), Status::Idle);
    assert_eq!(use_app_data(&app, "client"), None);
}

#[tokio::test(start_paused = true)]
async fn lazy_navigation_does_not_block() {
    let app = navigating_app();
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "lazy",
        counting(&counter, json!(1), 5),
        AsyncDataOptions::new().with_lazy(true),
    )
    .await;
    assert_eq!(data.status(), Status::Idle);

    app.flush_mount_queue().await;
    data.wait().await;
    assert_eq!(data.data(), json!(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn results_are_shaped_and_merged() {
    let app = navigating_app();
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "post",
        counting(&counter, json!({ "id": 1, "title": "t", "body": "long" }), 5),
        AsyncDataOptions::new()
            .with_default(|| json!({ "draft": false }))
            .with_pick(["id", "title"]),
    )
    .await;

    assert_eq!(data.data(), json!({ "draft": false, "id": 1, "title": "t" }));
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_the_previous_data() {
    let app = server_app();
    let data = use_async_data(
        &app,
        "broken",
        |_| async { Err::<Value, BoxError>("boom".into()) },
        AsyncDataOptions::new().with_default(|| json!([])),
    )
    .await;

    assert_eq!(data.status(), Status::Error);
    assert_eq!(data.data(), json!([]));
    let error = data.error().unwrap();
    assert_eq!(error.status_code, 500);
    assert_eq!(error.message, "boom");
    assert!(app.with_payload(|payload| payload.errors.contains_key("broken")));
}

#[tokio::test(start_paused = true)]
async fn slow_handlers_time_out() {
    let app = server_app();
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "slow",
        counting(&counter, json!(1), 1_000),
        AsyncDataOptions::new().with_timeout(Duration::from_millis(50)),
    )
    .await;

    assert_eq!(data.status(), Status::Error);
    assert_eq!(data.error().unwrap().message, "no response within 50ms");
}

#[tokio::test(start_paused = true)]
async fn handlers_run_inside_the_instance_scope() {
    let app = server_app();
    let data = use_async_data(
        &app,
        "scope",
        |_| async { Ok::<_, BoxError>(meridian_app::use_app()?.id().to_owned()) },
        AsyncDataOptions::new(),
    )
    .await;

    assert_eq!(data.data(), json!(app.id()));
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh and clear
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn forced_refresh_supersedes_the_running_execution() {
    let app = navigating_app();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = {
        let calls = Arc::clone(&calls);
        move |_: Arc<App>| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let (delay, value) = if call == 0 { (100, "first") } else { (10, "second") };
                sleep(Duration::from_millis(delay)).await;
                Ok::<_, BoxError>(value)
            }
        }
    };
    let data = use_async_data(
        &app,
        "race",
        handler,
        AsyncDataOptions::new().with_immediate(false),
    )
    .await;

    let earlier = tokio::spawn({
        let data = data.clone();
        async move { data.refresh().await }
    });
    sleep(Duration::from_millis(5)).await;
    assert!(data.pending());

    data.refresh().await;
    earlier.await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(data.data(), json!("second"));
    assert_eq!(data.status(), Status::Success);
}

#[tokio::test(start_paused = true)]
async fn refresh_app_data_targets_keys() {
    let app = navigating_app();
    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_calls = Arc::new(AtomicUsize::new(0));
    use_async_data(&app, "a", counting(&a_calls, json!("a"), 5), AsyncDataOptions::new()).await;
    use_async_data(&app, "b", counting(&b_calls, json!("b"), 5), AsyncDataOptions::new()).await;

    refresh_app_data(&app, Some(&["a"])).await;
    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);

    refresh_app_data(&app, None).await;
    assert_eq!(a_calls.load(Ordering::SeqCst), 3);
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn clearing_resets_matching_entries() {
    let app = server_app();
    let counter = Arc::new(AtomicUsize::new(0));
    let users = use_async_data(&app, "users", counting(&counter, json!([1]), 5), AsyncDataOptions::new()).await;
    let posts = use_async_data(&app, "posts", counting(&counter, json!([2]), 5), AsyncDataOptions::new()).await;

    clear_app_data(&app, &KeyFilter::predicate(|key| key.starts_with("us")));

    assert_eq!(users.status(), Status::Idle);
    assert_eq!(users.data(), Value::Null);
    assert_eq!(use_app_data(&app, "users"), None);
    assert_eq!(posts.data(), json!([2]));

    clear_app_data(&app, &KeyFilter::All);
    assert_eq!(use_app_data(&app, "posts"), None);
}

#[tokio::test(start_paused = true)]
async fn immediate_false_waits_for_refresh() {
    let app = server_app();
    let counter = Arc::new(AtomicUsize::new(0));

    let data = use_async_data(
        &app,
        "manual",
        counting(&counter, json!(7), 5),
        AsyncDataOptions::new().with_immediate(false),
    )
    .await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    data.refresh().await;
    assert_eq!(data.data_as::<u32>().unwrap(), 7);
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch
// ─────────────────────────────────────────────────────────────────────────────

struct StaticTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for StaticTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<Value, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.url == "/missing" {
            return Err(TransportError::Status {
                url: request.url.clone(),
                status: 404,
                body: String::new(),
            });
        }
        if let Some(body) = &request.body {
            return Ok(body.clone());
        }
        Ok(json!({ "url": request.url, "page": request.query.get("page") }))
    }
}

#[tokio::test]
async fn fetch_is_keyed_by_request() {
    let app = server_app();
    let transport = Arc::new(StaticTransport {
        calls: AtomicUsize::new(0),
    });
    let request = FetchRequest::get("/api/posts").with_query("page", "2");

    let first = use_fetch(&app, transport.clone(), request.clone(), AsyncDataOptions::new()).await;
    let second = use_fetch(&app, transport.clone(), request, AsyncDataOptions::new()).await;

    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.key(), "$fGET:/api/posts?page=2");
    assert_eq!(second.data(), json!({ "url": "/api/posts", "page": "2" }));
}

#[tokio::test]
async fn fetch_status_errors_keep_their_code() {
    let app = server_app();
    let transport = Arc::new(StaticTransport {
        calls: AtomicUsize::new(0),
    });

    let data = use_fetch(&app, transport, FetchRequest::get("/missing"), AsyncDataOptions::new()).await;

    assert_eq!(data.status(), Status::Error);
    assert_eq!(data.error().unwrap().status_code, 404);
}

#[tokio::test]
async fn fetch_bodies_get_separate_entries() {
    let app = server_app();
    let transport = Arc::new(StaticTransport {
        calls: AtomicUsize::new(0),
    });

    let a = use_fetch(
        &app,
        transport.clone(),
        FetchRequest::post("/api/search", json!({ "q": "a" })),
        AsyncDataOptions::new(),
    )
    .await;
    let b = use_fetch(
        &app,
        transport.clone(),
        FetchRequest::post("/api/search", json!({ "q": "b" })),
        AsyncDataOptions::new(),
    )
    .await;

    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    assert_ne!(a.key(), b.key());
    assert!(a.key().starts_with("$fPOST:/api/search#"));
    assert_eq!(a.data(), json!({ "q": "a" }));
    assert_eq!(b.data(), json!({ "q": "b" }));
}

#[tokio::test]
async fn fetch_key_can_be_pinned() {
    let app = server_app();
    let transport = Arc::new(StaticTransport {
        calls: AtomicUsize::new(0),
    });

    let first = use_fetch(
        &app,
        transport.clone(),
        FetchRequest::post("/api/search", json!({ "q": "a" })).with_key("search"),
        AsyncDataOptions::new(),
    )
    .await;
    let second = use_fetch(
        &app,
        transport.clone(),
        FetchRequest::post("/api/search", json!({ "q": "b" })).with_key("search"),
        AsyncDataOptions::new(),
    )
    .await;

    assert_eq!(first.key(), "search");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1, "one key, one entry");
    assert_eq!(second.data(), json!({ "q": "a" }));
}
