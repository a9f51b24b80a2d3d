//! Example blog CLI.
//!
//! Renders a page on the "server", then hydrates its payload on the "client"
//! and reports how many post lookups each side made.
//!
//! # Usage
//!
//! ```bash
//! blog [path]
//! ```
//!
//! # Example
//!
//! ```bash
//! blog /posts/hello
//! ```

use std::sync::Arc;

use example::{BlogHost, PostStore, plugins, routes};
use meridian_app::lifecycle::{ClientEntry, RenderRequest, ServerRenderer};
use meridian_hooks::BoxError;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "/".to_owned());

    let store = Arc::new(PostStore::sample());
    let host = Arc::new(BlogHost);
    let router = Arc::new(routes());

    // Server: one fresh instance per request
    let response = ServerRenderer::new(host.clone(), router.clone())
        .with_plugins(plugins(Arc::clone(&store)))
        .render(RenderRequest::new(path))
        .await;
    tracing::info!(
        status = response.status_code,
        lookups = store.lookups(),
        "server render finished"
    );
    print_document(&response.html);

    // Client: boot from the embedded payload
    let payload = response.payload.to_json()?;
    let app = ClientEntry::new(host, router)
        .with_plugins(plugins(Arc::clone(&store)))
        .hydrate(&payload)
        .await?;
    tracing::info!(
        app = app.id(),
        lookups = store.lookups(),
        "client hydrated"
    );

    app.close().await;
    Ok(())
}

#[expect(clippy::print_stdout, reason = "the rendered document is the program output")]
fn print_document(html: &str) {
    println!("{html}");
}
