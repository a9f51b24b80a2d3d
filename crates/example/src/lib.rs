//! Example blog built with Meridian.
//!
//! The server renders the post list (or a single post) with data fetched
//! through [`use_async_data`]. The fetched posts travel to the client in the
//! payload, so hydrating reuses them instead of fetching again.
//!
//! ```text
//! request ─▶ ServerRenderer ─▶ plugins ─▶ BlogHost::render_to_string ─▶ html + payload
//!                                                                          │
//!            ClientEntry::hydrate ◀────────────────────────────────────────┘
//!                 └─▶ BlogHost::mount (reads the same keys, no fetch)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use meridian_app::app::App;
use meridian_app::host::Host;
use meridian_app::plugin::{PluginGroup, PluginSet, define_plugin};
use meridian_app::router::RouteTable;
use meridian_core::DefaultPlugins;
use meridian_data::{AsyncData, AsyncDataOptions, use_async_data};
use meridian_hooks::BoxError;
use serde::{Deserialize, Serialize};

/// A blog post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post identifier used in `/posts/:id`.
    pub id: String,
    /// Title.
    pub title: String,
    /// Body text.
    pub body: String,
}

/// In-memory post source, provided as `$posts`.
///
/// Counts lookups so callers can tell whether hydration fetched again.
#[derive(Debug, Default)]
pub struct PostStore {
    posts: Vec<Post>,
    lookups: AtomicUsize,
}

impl PostStore {
    /// A store holding `posts`.
    #[must_use]
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            posts,
            lookups: AtomicUsize::new(0),
        }
    }

    /// A store with two posts.
    #[must_use]
    pub fn sample() -> Self {
        Self::new(vec![
            Post {
                id: "hello".into(),
                title: "Hello, Meridian".into(),
                body: "Rendered on the server, hydrated on the client.".into(),
            },
            Post {
                id: "plugins".into(),
                title: "Ordering plugins".into(),
                body: "Name a plugin and others can depend on it.".into(),
            },
        ])
    }

    /// Every post.
    pub fn list(&self) -> Vec<Post> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.posts.clone()
    }

    /// One post by id.
    pub fn find(&self, id: &str) -> Option<Post> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.posts.iter().find(|post| post.id == id).cloned()
    }

    /// How many lookups were made.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

/// The blog's routes.
#[must_use]
pub fn routes() -> RouteTable {
    RouteTable::new()
        .with_named_route("index", "/")
        .with_named_route("post", "/posts/:id")
}

/// Built-in plugins plus one providing `store` as `$posts`.
#[must_use]
pub fn plugins(store: Arc<PostStore>) -> PluginSet {
    PluginSet::new().add(DefaultPlugins.build()).add(
        define_plugin(move |app| {
            let store = Arc::clone(&store);
            async move {
                app.provide_arc("posts", store);
                Ok(())
            }
        })
        .with_name("posts")
        .with_parallel(true),
    )
}

/// Fetches the data the current route shows.
async fn page_data(app: &Arc<App>) -> Option<AsyncData> {
    let route = app.route()?;
    let data = match route.params.get("id") {
        Some(id) => {
            let id = id.clone();
            use_async_data(
                app,
                format!("post:{id}"),
                move |app| {
                    let id = id.clone();
                    async move {
                        let store = app.injected::<PostStore>("posts").ok_or("post store missing")?;
                        Ok::<_, BoxError>(store.find(&id))
                    }
                },
                AsyncDataOptions::new(),
            )
            .await
        }
        None => {
            use_async_data(
                app,
                "posts",
                |app| async move {
                    let store = app.injected::<PostStore>("posts").ok_or("post store missing")?;
                    Ok::<_, BoxError>(store.list())
                },
                AsyncDataOptions::new(),
            )
            .await
        }
    };
    Some(data)
}

/// Renders posts as plain HTML.
#[derive(Debug, Default)]
pub struct BlogHost;

#[async_trait]
impl Host for BlogHost {
    fn name(&self) -> &str {
        "blog"
    }

    async fn render_to_string(&self, app: &Arc<App>) -> Result<String, BoxError> {
        let Some(data) = page_data(app).await else {
            return Ok(r#"<div id="__meridian"><h1>Not found</h1></div>"#.to_owned());
        };
        if let Some(error) = data.error() {
            return Ok(format!(r#"<div id="__meridian"><p>{}</p></div>"#, error.message));
        }

        let posts: Vec<Post> = if data.data().is_array() {
            data.data_as()?
        } else {
            data.data_as::<Option<Post>>()?.into_iter().collect()
        };
        let mut html = String::from(r#"<div id="__meridian">"#);
        for post in posts {
            html.push_str(&format!(
                r#"<article id="{}"><h2>{}</h2><p>{}</p></article>"#,
                post.id, post.title, post.body
            ));
        }
        html.push_str("</div>");
        Ok(html)
    }

    async fn mount(&self, app: &Arc<App>) -> Result<(), BoxError> {
        if let Some(data) = page_data(app).await {
            tracing::info!(key = data.key(), status = ?data.status(), "page data ready");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_app::lifecycle::{ClientEntry, RenderRequest, ServerRenderer};

    #[tokio::test]
    async fn hydration_reuses_server_posts() {
        let store = Arc::new(PostStore::sample());
        let host = Arc::new(BlogHost);
        let router = Arc::new(routes());

        let response = ServerRenderer::new(host.clone(), router.clone())
            .with_plugins(plugins(Arc::clone(&store)))
            .render(RenderRequest::new("/"))
            .await;
        assert_eq!(response.status_code, 200);
        assert!(response.html.contains("Hello, Meridian"));
        assert_eq!(store.lookups(), 1);

        let payload = response.payload.to_json().unwrap();
        let app = ClientEntry::new(host, router)
            .with_plugins(plugins(Arc::clone(&store)))
            .hydrate(&payload)
            .await
            .unwrap();

        assert_eq!(store.lookups(), 1, "hydration must not fetch again");
        assert!(!app.is_hydrating());
    }

    #[tokio::test]
    async fn single_post_route() {
        let store = Arc::new(PostStore::sample());
        let response = ServerRenderer::new(Arc::new(BlogHost), Arc::new(routes()))
            .with_plugins(plugins(store))
            .render(RenderRequest::new("/posts/plugins"))
            .await;

        assert!(response.html.contains("Ordering plugins"));
        assert!(!response.html.contains("Hello, Meridian"));
        assert!(response.payload.data.contains_key("post:plugins"));
    }
}
