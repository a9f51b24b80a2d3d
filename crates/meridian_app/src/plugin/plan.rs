//! Dependency analysis for a plugin batch.
//!
//! The plan restricts every plugin's dependencies to names present in the
//! batch and proves the remaining graph acyclic with Kahn's algorithm. When
//! Kahn's algorithm stops making progress, the unresolved edges are walked to
//! find a cycle, which is then broken or reported per [`CyclePolicy`].

use hashbrown::{HashMap, HashSet};

use super::PluginDescriptor;
use crate::config::CyclePolicy;
use crate::error::PluginError;

/// Per-batch dependency plan.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// In-batch dependency names per plugin, after cycle breaking.
    waits_on: Vec<Vec<String>>,
    /// Plugin indices in a dependency-respecting order.
    order: Vec<usize>,
    /// Cycles that were broken, as plugin names.
    broken_cycles: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Builds the plan for `plugins`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::CircularDependency`] when the batch contains a
    /// cycle and `policy` is [`CyclePolicy::Error`].
    pub fn build(plugins: &[PluginDescriptor], policy: CyclePolicy) -> Result<Self, PluginError> {
        let n = plugins.len();

        // Build a map of plugin name -> indices for dependency lookup
        let mut holders: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, plugin) in plugins.iter().enumerate() {
            if let Some(name) = plugin.name() {
                holders.entry(name).or_default().push(index);
            }
        }

        let mut waits_on: Vec<Vec<String>> = Vec::with_capacity(n);
        for plugin in plugins {
            let (present, missing): (Vec<&String>, Vec<&String>) = plugin
                .depends_on()
                .iter()
                .partition(|name| holders.contains_key(name.as_str()));
            if !missing.is_empty() {
                tracing::warn!(
                    plugin = plugin.display_name(),
                    missing = ?missing,
                    "plugin depends on plugins that are not registered; ignoring them"
                );
            }
            waits_on.push(present.into_iter().cloned().collect());
        }

        let unresolved_of = |index: usize, waits_on: &[Vec<String>], done: &[bool]| {
            waits_on[index]
                .iter()
                .flat_map(|name| holders.get(name.as_str()).into_iter().flatten())
                .copied()
                .filter(|&dependency| !done[dependency])
                .collect::<HashSet<usize>>()
        };

        let mut remaining: Vec<HashSet<usize>> = (0..n)
            .map(|index| unresolved_of(index, &waits_on, &vec![false; n]))
            .collect();
        let mut done = vec![false; n];
        let mut order: Vec<usize> = Vec::with_capacity(n);
        let mut broken_cycles = Vec::new();

        // Kahn's algorithm, one layer at a time in declaration order
        while order.len() < n {
            let ready: Vec<usize> = (0..n)
                .filter(|&index| !done[index] && remaining[index].is_empty())
                .collect();

            if !ready.is_empty() {
                for &index in &ready {
                    done[index] = true;
                    order.push(index);
                }
                for deps in &mut remaining {
                    deps.retain(|dependency| !done[*dependency]);
                }
                continue;
            }

            let cycle = find_cycle(&remaining, &done);
            let names: Vec<String> = cycle
                .iter()
                .map(|&index| plugins[index].display_name().to_owned())
                .collect();

            if policy == CyclePolicy::Error {
                let mut cycle = names;
                if let Some(first) = cycle.first().cloned() {
                    cycle.push(first);
                }
                return Err(PluginError::CircularDependency { cycle });
            }

            // Drop the first-declared member's dependencies on the cycle
            let members: HashSet<usize> = cycle.iter().copied().collect();
            let Some(&breaker) = cycle.iter().min() else {
                break;
            };
            waits_on[breaker].retain(|name| {
                holders
                    .get(name.as_str())
                    .is_none_or(|indices| indices.iter().all(|index| !members.contains(index)))
            });
            remaining[breaker] = unresolved_of(breaker, &waits_on, &done);

            tracing::warn!(
                cycle = %names.join(" -> "),
                plugin = plugins[breaker].display_name(),
                "circular plugin dependency; ignoring the cycle edges of the first declared member"
            );
            broken_cycles.push(names);
        }

        Ok(Self {
            waits_on,
            order,
            broken_cycles,
        })
    }

    /// In-batch dependency names the plugin at `index` waits for.
    #[must_use]
    pub fn dependencies(&self, index: usize) -> &[String] {
        self.waits_on.get(index).map_or(&[], Vec::as_slice)
    }

    /// Plugin indices in an order where every plugin follows its dependencies.
    #[must_use]
    pub fn topological_order(&self) -> &[usize] {
        &self.order
    }

    /// Cycles broken while building the plan.
    #[must_use]
    pub fn broken_cycles(&self) -> &[Vec<String>] {
        &self.broken_cycles
    }
}

/// Follows unresolved dependency edges from the first pending plugin until a
/// plugin repeats. Every pending plugin has at least one unresolved
/// dependency, so the walk always closes a cycle.
fn find_cycle(remaining: &[HashSet<usize>], done: &[bool]) -> Vec<usize> {
    let Some(mut current) = (0..done.len()).find(|&index| !done[index]) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut position: HashMap<usize, usize> = HashMap::new();
    loop {
        if let Some(&start) = position.get(&current) {
            return path.split_off(start);
        }
        position.insert(current, path.len());
        path.push(current);

        match remaining[current].iter().min() {
            Some(&next) => current = next,
            None => return path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::define_plugin;

    fn plugin(name: &str, deps: &[&str]) -> PluginDescriptor {
        PluginDescriptor::new(
            define_plugin(|_| async { Ok(()) })
                .with_name(name)
                .with_depends_on(deps.iter().copied()),
        )
    }

    fn order_names(plan: &ExecutionPlan, plugins: &[PluginDescriptor]) -> Vec<String> {
        plan.topological_order()
            .iter()
            .map(|&index| plugins[index].display_name().to_owned())
            .collect()
    }

    #[test]
    fn chain_orders_dependencies_first() {
        let plugins = vec![
            plugin("a", &["b"]),
            plugin("b", &["c"]),
            plugin("c", &["d"]),
            plugin("d", &[]),
        ];
        let plan = ExecutionPlan::build(&plugins, CyclePolicy::Break).unwrap();

        assert_eq!(order_names(&plan, &plugins), vec!["d", "c", "b", "a"]);
        assert!(plan.broken_cycles().is_empty());
        assert_eq!(plan.dependencies(0), ["b"]);
    }

    #[test]
    fn missing_dependencies_are_dropped() {
        let plugins = vec![plugin("a", &[]), plugin("b", &["a", "ghost"])];
        let plan = ExecutionPlan::build(&plugins, CyclePolicy::Break).unwrap();

        assert_eq!(plan.dependencies(1), ["a"]);
    }

    #[test]
    fn two_cycle_is_broken_at_first_member() {
        let plugins = vec![plugin("a", &["b"]), plugin("b", &["a"])];
        let plan = ExecutionPlan::build(&plugins, CyclePolicy::Break).unwrap();

        assert!(plan.dependencies(0).is_empty(), "a no longer waits on b");
        assert_eq!(plan.dependencies(1), ["a"]);
        assert_eq!(order_names(&plan, &plugins), vec!["a", "b"]);
        assert_eq!(plan.broken_cycles(), [vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn self_dependency_is_broken() {
        let plugins = vec![plugin("a", &["a"])];
        let plan = ExecutionPlan::build(&plugins, CyclePolicy::Break).unwrap();

        assert!(plan.dependencies(0).is_empty());
        assert_eq!(plan.topological_order(), [0]);
    }

    #[test]
    fn downstream_of_cycle_keeps_its_edges() {
        let plugins = vec![
            plugin("x", &["a"]),
            plugin("a", &["b"]),
            plugin("b", &["c"]),
            plugin("c", &["a"]),
        ];
        let plan = ExecutionPlan::build(&plugins, CyclePolicy::Break).unwrap();

        assert_eq!(plan.dependencies(0), ["a"], "x is not part of the cycle");
        assert!(plan.dependencies(1).is_empty(), "a is the first declared member");
        assert_eq!(order_names(&plan, &plugins), vec!["a", "x", "c", "b"]);
    }

    #[test]
    fn error_policy_reports_cycle() {
        let plugins = vec![plugin("a", &["b"]), plugin("b", &["a"])];
        let result = ExecutionPlan::build(&plugins, CyclePolicy::Error);

        match result {
            Err(PluginError::CircularDependency { cycle }) => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn empty_batch() {
        let plan = ExecutionPlan::build(&[], CyclePolicy::Error).unwrap();
        assert!(plan.topological_order().is_empty());
    }
}
