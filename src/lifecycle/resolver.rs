//! Dependency Resolver
//!
//! Orders one stage's checks so every check runs after its dependencies.
//! Iterative Kahn: each round peels off every check whose dependencies are
//! already placed, keeping input order among checks that become ready together.
//! A round that places nothing means a cycle; the remainder is appended in
//! input order as a final level.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::types::CheckDefinition;

/// Execution order for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Total order, dependencies first
    pub order: Vec<String>,
    /// Checks grouped into rounds; checks within a level have no ordering constraint
    pub levels: Vec<Vec<String>>,
    pub cycle_detected: bool,
    /// Checks appended by the cycle fallback, in input order
    pub unresolved: Vec<String>,
}

pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve an execution order for the given definitions.
    ///
    /// Dependencies on ids outside `definitions` are ignored here; the registry
    /// rejects them before a run starts.
    pub fn resolve(definitions: &[CheckDefinition]) -> Resolution {
        let known: HashSet<&str> = definitions.iter().map(|d| d.id.as_str()).collect();

        // Remaining unmet in-set dependencies per check, and reverse edges
        let mut pending: HashMap<&str, usize> = HashMap::with_capacity(definitions.len());
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for def in definitions {
            let deps: HashSet<&str> = def
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|d| known.contains(d) && *d != def.id.as_str())
                .collect();
            pending.insert(def.id.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(def.id.as_str());
            }
        }

        // Input position, used to keep ready sets in registration order
        let position: HashMap<&str, usize> = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.as_str(), i))
            .collect();

        let mut placed: HashSet<&str> = HashSet::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());
        let mut levels = Vec::new();

        let mut ready: Vec<&str> = definitions
            .iter()
            .map(|d| d.id.as_str())
            .filter(|id| pending.get(id).copied() == Some(0))
            .collect();

        while !ready.is_empty() {
            let mut next = Vec::new();
            for id in &ready {
                placed.insert(*id);
                if let Some(children) = dependents.get(id) {
                    for child in children {
                        if let Some(count) = pending.get_mut(child) {
                            *count -= 1;
                            if *count == 0 {
                                next.push(*child);
                            }
                        }
                    }
                }
            }
            order.extend(ready.iter().map(|id| id.to_string()));
            levels.push(ready.iter().map(|id| id.to_string()).collect());

            next.sort_by_key(|id| position[id]);
            ready = next;
        }

        let unresolved: Vec<String> = definitions
            .iter()
            .map(|d| d.id.as_str())
            .filter(|id| !placed.contains(id))
            .map(str::to_string)
            .collect();

        let cycle_detected = !unresolved.is_empty();
        if cycle_detected {
            warn!(
                "⚠️  Dependency cycle among checks [{}]; falling back to registration order",
                unresolved.join(", ")
            );
            order.extend(unresolved.iter().cloned());
            levels.push(unresolved.clone());
        }

        Resolution {
            order,
            levels,
            cycle_detected,
            unresolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::types::LifecycleStage;
    use pretty_assertions::assert_eq;

    fn def(id: &str, deps: &[&str]) -> CheckDefinition {
        deps.iter().fold(
            CheckDefinition::new(id, LifecycleStage::Validation, 100),
            |d, dep| d.depends_on(*dep),
        )
    }

    fn assert_respects_dependencies(definitions: &[CheckDefinition], order: &[String]) {
        let index: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for d in definitions {
            for dep in &d.dependencies {
                assert!(
                    index[dep.as_str()] < index[d.id.as_str()],
                    "{} must precede {} in {:?}",
                    dep,
                    d.id,
                    order
                );
            }
        }
    }

    #[test]
    fn test_independent_checks_keep_input_order() {
        let defs = vec![def("c", &[]), def("a", &[]), def("b", &[])];
        let resolution = DependencyResolver::resolve(&defs);
        assert_eq!(resolution.order, vec!["c", "a", "b"]);
        assert_eq!(resolution.levels.len(), 1);
        assert!(!resolution.cycle_detected);
    }

    #[test]
    fn test_dependencies_come_first() {
        let defs = vec![
            def("report", &["fairness", "accuracy"]),
            def("fairness", &["load"]),
            def("accuracy", &["load"]),
            def("load", &[]),
        ];
        let resolution = DependencyResolver::resolve(&defs);

        assert_eq!(resolution.order, vec!["load", "fairness", "accuracy", "report"]);
        assert_eq!(
            resolution.levels,
            vec![
                vec!["load".to_string()],
                vec!["fairness".to_string(), "accuracy".to_string()],
                vec!["report".to_string()],
            ]
        );
        assert_respects_dependencies(&defs, &resolution.order);
    }

    #[test]
    fn test_deep_chain_and_diamond_are_ordered() {
        let defs = vec![
            def("e", &["d", "b"]),
            def("d", &["c"]),
            def("c", &["a"]),
            def("b", &["a"]),
            def("a", &[]),
            def("f", &[]),
        ];
        let resolution = DependencyResolver::resolve(&defs);
        assert_eq!(resolution.order.len(), defs.len());
        assert_respects_dependencies(&defs, &resolution.order);
    }

    #[test]
    fn test_cycle_falls_back_to_input_order() {
        let defs = vec![
            def("root", &[]),
            def("x", &["y"]),
            def("y", &["x"]),
            def("after", &["root"]),
        ];
        let resolution = DependencyResolver::resolve(&defs);

        assert!(resolution.cycle_detected);
        assert_eq!(resolution.unresolved, vec!["x", "y"]);
        assert_eq!(resolution.order, vec!["root", "after", "x", "y"]);

        let mut sorted = resolution.order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["after", "root", "x", "y"]);
    }

    #[test]
    fn test_check_depending_on_cycle_is_unresolved_too() {
        let defs = vec![def("a", &["b"]), def("b", &["a"]), def("c", &["a"])];
        let resolution = DependencyResolver::resolve(&defs);
        assert_eq!(resolution.order, vec!["a", "b", "c"]);
        assert_eq!(resolution.levels, vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]);
    }

    #[test]
    fn test_self_and_foreign_dependencies_are_ignored() {
        let defs = vec![def("a", &["a"]), def("b", &["elsewhere"])];
        let resolution = DependencyResolver::resolve(&defs);
        assert!(!resolution.cycle_detected);
        assert_eq!(resolution.order, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input() {
        let resolution = DependencyResolver::resolve(&[]);
        assert!(resolution.order.is_empty());
        assert!(resolution.levels.is_empty());
        assert!(!resolution.cycle_detected);
    }
}
