//! Nested hook maps and flattening.
//!
//! Plugins and modules declare hooks as nested maps:
//!
//! ```text
//! { "app": { "created": f, "mounted": g }, "page:start": h, "close": <empty> }
//! ```
//!
//! [`flatten`] turns this into `app:created`, `app:mounted`, `page:start` and
//! `close`. Empty leaves survive flattening as `None` so callers can decide
//! what to do with them; [`HookBus::add_hooks`](crate::HookBus::add_hooks)
//! skips them.

use indexmap::IndexMap;

use crate::bus::{Hook, HookResult, hook_fn};

/// A nested map of hook names to [`HookTree`] nodes.
pub type HookMap<E> = IndexMap<String, HookTree<E>>;

/// A node of a declarative hook map.
pub enum HookTree<E> {
    /// A listener registered under the joined path.
    Hook(Hook<E>),
    /// A nested level; its keys are joined to the parent with `:`.
    Nested(HookMap<E>),
    /// An absent listener (null or `false` in a declarative config).
    Empty,
}

impl<E> Clone for HookTree<E> {
    fn clone(&self) -> Self {
        match self {
            HookTree::Hook(hook) => HookTree::Hook(hook.clone()),
            HookTree::Nested(map) => HookTree::Nested(map.clone()),
            HookTree::Empty => HookTree::Empty,
        }
    }
}

impl<E> core::fmt::Debug for HookTree<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HookTree::Hook(_) => f.write_str("Hook(..)"),
            HookTree::Nested(map) => f.debug_map().entries(map.iter()).finish(),
            HookTree::Empty => f.write_str("Empty"),
        }
    }
}

impl<E: Send + 'static> HookTree<E> {
    /// Creates a leaf from an async closure.
    pub fn hook<F, Fut>(f: F) -> Self
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        HookTree::Hook(hook_fn(f))
    }
}

impl<E> HookTree<E> {
    /// Creates a nested level from `(key, node)` pairs.
    pub fn nested<K: Into<String>>(entries: impl IntoIterator<Item = (K, HookTree<E>)>) -> Self {
        HookTree::Nested(
            entries
                .into_iter()
                .map(|(key, node)| (key.into(), node))
                .collect(),
        )
    }
}

impl<E> From<Hook<E>> for HookTree<E> {
    fn from(hook: Hook<E>) -> Self {
        HookTree::Hook(hook)
    }
}

impl<E> From<Option<Hook<E>>> for HookTree<E> {
    fn from(hook: Option<Hook<E>>) -> Self {
        hook.map_or(HookTree::Empty, HookTree::Hook)
    }
}

/// Flattens a nested hook map into colon-joined hook names.
///
/// Declaration order is preserved. Empty leaves map to `None`.
pub fn flatten<E>(map: &HookMap<E>) -> IndexMap<String, Option<Hook<E>>> {
    let mut flat = IndexMap::new();
    flatten_into(map, None, &mut flat);
    flat
}

fn flatten_into<E>(
    map: &HookMap<E>,
    prefix: Option<&str>,
    flat: &mut IndexMap<String, Option<Hook<E>>>,
) {
    for (key, node) in map {
        let name = match prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.clone(),
        };
        match node {
            HookTree::Hook(hook) => {
                flat.insert(name, Some(hook.clone()));
            }
            HookTree::Empty => {
                flat.insert(name, None);
            }
            HookTree::Nested(inner) => flatten_into(inner, Some(&name), flat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> HookTree<u32> {
        HookTree::hook(|_| async { Ok(()) })
    }

    #[test]
    fn flatten_joins_nested_keys_with_colons() {
        let mut map = HookMap::new();
        map.insert(
            "app".to_string(),
            HookTree::nested([
                ("created", noop()),
                ("error", HookTree::nested([("cleared", noop())])),
            ]),
        );
        map.insert("page:start".to_string(), noop());

        let flat = flatten(&map);
        let names: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["app:created", "app:error:cleared", "page:start"]);
        assert!(flat.values().all(Option::is_some));
    }

    #[test]
    fn flatten_keeps_empty_leaves_as_none() {
        let mut map: HookMap<u32> = HookMap::new();
        map.insert(
            "app".to_string(),
            HookTree::nested([("mounted", HookTree::Empty)]),
        );

        let flat = flatten(&map);
        assert_eq!(flat.len(), 1);
        assert!(flat["app:mounted"].is_none(), "empty leaf should flatten to None");
    }

    #[test]
    fn flatten_of_empty_nested_level_produces_nothing() {
        let mut map: HookMap<u32> = HookMap::new();
        map.insert("app".to_string(), HookTree::Nested(HookMap::new()));

        assert!(flatten(&map).is_empty());
    }
}
