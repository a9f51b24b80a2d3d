//! Server and client entry points.
//!
//! Both drive an [`App`](crate::app::App) through the same phases: plugins,
//! `app:created`, routing, then rendering on the server or mounting on the
//! client. Routing and plugin failures are turned into structured
//! [`AppError`](crate::AppError)s instead of aborting the entry.

mod client;
mod server;

pub use client::ClientEntry;
pub use server::{RenderRequest, RenderResponse, ServerRenderer};
