//! Route resolution.
//!
//! The route table is produced by the build layer; the framework only needs
//! to resolve a path and to wait for the router to be ready on the client.
//! [`RouteTable`] matches static segments, `:param` segments and a trailing
//! `*rest` catch-all.

use async_trait::async_trait;
use indexmap::IndexMap;

/// A resolved route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Route name, if the record has one.
    pub name: Option<String>,
    /// The resolved path, without query or fragment.
    pub path: String,
    /// Pattern of the matching record.
    pub pattern: String,
    /// Captured parameters.
    pub params: IndexMap<String, String>,
}

/// Resolves paths to routes.
#[async_trait]
pub trait Router: Send + Sync + 'static {
    /// Resolves `path`, or `None` when no route matches.
    fn resolve(&self, path: &str) -> Option<RouteMatch>;

    /// Completes once the router can navigate.
    async fn ready(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

#[derive(Debug, Clone)]
struct RouteRecord {
    name: Option<String>,
    pattern: String,
    segments: Vec<Segment>,
}

/// An ordered list of route patterns; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteRecord>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unnamed route.
    #[must_use]
    pub fn with_route(self, pattern: &str) -> Self {
        self.push(None, pattern)
    }

    /// Adds a named route.
    #[must_use]
    pub fn with_named_route(self, name: impl Into<String>, pattern: &str) -> Self {
        self.push(Some(name.into()), pattern)
    }

    fn push(mut self, name: Option<String>, pattern: &str) -> Self {
        let segments = split(pattern)
            .map(|segment| {
                if let Some(param) = segment.strip_prefix(':') {
                    Segment::Param(param.to_owned())
                } else if let Some(rest) = segment.strip_prefix('*') {
                    Segment::CatchAll(rest.to_owned())
                } else {
                    Segment::Static(segment.to_owned())
                }
            })
            .collect();
        self.routes.push(RouteRecord {
            name,
            pattern: pattern.to_owned(),
            segments,
        });
        self
    }
}

#[async_trait]
impl Router for RouteTable {
    fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let parts: Vec<&str> = split(path).collect();

        self.routes.iter().find_map(|route| {
            let params = match_segments(&route.segments, &parts)?;
            Some(RouteMatch {
                name: route.name.clone(),
                path: path.to_owned(),
                pattern: route.pattern.clone(),
                params,
            })
        })
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> Option<IndexMap<String, String>> {
    let mut params = IndexMap::new();
    for (index, segment) in segments.iter().enumerate() {
        match segment {
            Segment::CatchAll(name) => {
                params.insert(name.clone(), parts.get(index..)?.join("/"));
                return Some(params);
            }
            Segment::Static(expected) => {
                if parts.get(index) != Some(&expected.as_str()) {
                    return None;
                }
            }
            Segment::Param(name) => {
                params.insert(name.clone(), (*parts.get(index)?).to_owned());
            }
        }
    }
    (segments.len() == parts.len()).then_some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new()
            .with_named_route("index", "/")
            .with_named_route("user", "/users/:id")
            .with_route("/docs/*slug")
    }

    #[test]
    fn resolves_static_root() {
        let route = table().resolve("/").unwrap();
        assert_eq!(route.name.as_deref(), Some("index"));
        assert!(route.params.is_empty());
    }

    #[test]
    fn captures_params_and_ignores_query() {
        let route = table().resolve("/users/42?tab=posts").unwrap();
        assert_eq!(route.name.as_deref(), Some("user"));
        assert_eq!(route.path, "/users/42");
        assert_eq!(route.params["id"], "42");
    }

    #[test]
    fn catch_all_takes_remaining_segments() {
        let route = table().resolve("/docs/guide/install").unwrap();
        assert_eq!(route.params["slug"], "guide/install");
    }

    #[test]
    fn unknown_path_does_not_match() {
        assert!(table().resolve("/users/42/edit").is_none());
        assert!(table().resolve("/nope").is_none());
    }
}
