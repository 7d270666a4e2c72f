//! Structural validation of a module graph
//!
//! Two checks, in this order:
//!
//! 1. Every declared dependency names a registered module
//! 2. The depends-on relation has no cycle
//!
//! Both fail fast: the first unknown dependency or the first cycle found is
//! reported. Traversal follows registration order and declaration order, so
//! the same graph always produces the same diagnostic.

use super::error::{GraphError, GraphResult};
use super::{ModuleGraph, ModuleId};
use std::collections::HashMap;

/// Validates the graph before scheduling
///
/// # Errors
///
/// - [`GraphError::UnknownDependency`] for the first dependency that is not
///   registered (modules in registration order, dependencies in declaration
///   order)
/// - [`GraphError::CyclicDependency`] carrying the full cycle
pub fn validate(graph: &ModuleGraph) -> GraphResult<()> {
    check_dependencies_exist(graph)?;

    if let Some(cycle) = find_cycle(graph) {
        return Err(GraphError::cyclic(cycle));
    }

    Ok(())
}

fn check_dependencies_exist(graph: &ModuleGraph) -> GraphResult<()> {
    for node in graph.modules() {
        if let Some(missing) = node.dependencies().iter().find(|dep| !graph.contains(dep.name())) {
            return Err(GraphError::unknown_dependency(node.id(), missing));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Finished,
}

/// Finds a dependency cycle using DFS
///
/// Uses three-color marking: unvisited (no mark), in progress (on the DFS
/// stack) and finished. An edge into an in-progress node closes a cycle; the
/// cycle is the slice of the stack starting at that node.
///
/// In the returned cycle each module depends on the next and the last
/// depends on the first. A self-dependency is the one-element cycle `[a]`.
/// Dependencies on unregistered names are ignored.
pub fn find_cycle(graph: &ModuleGraph) -> Option<Vec<ModuleId>> {
    let mut marks: HashMap<&ModuleId, Mark> = HashMap::with_capacity(graph.len());
    let mut stack: Vec<&ModuleId> = Vec::new();

    for id in graph.module_ids() {
        if marks.contains_key(id) {
            continue;
        }
        if let Some(cycle) = visit(graph, id, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }

    None
}

fn visit<'g>(
    graph: &'g ModuleGraph,
    id: &'g ModuleId,
    marks: &mut HashMap<&'g ModuleId, Mark>,
    stack: &mut Vec<&'g ModuleId>,
) -> Option<Vec<ModuleId>> {
    marks.insert(id, Mark::InProgress);
    stack.push(id);

    if let Some(node) = graph.get(id.name()) {
        for dep in node.dependencies() {
            match marks.get(dep).copied() {
                Some(Mark::InProgress) => {
                    // Back edge: `dep` is on the stack
                    let start = stack.iter().position(|on_stack| *on_stack == dep).unwrap_or(0);
                    return Some(stack[start..].iter().map(|m| (*m).clone()).collect());
                }
                Some(Mark::Finished) => {}
                None if graph.contains(dep.name()) => {
                    if let Some(cycle) = visit(graph, dep, marks, stack) {
                        return Some(cycle);
                    }
                }
                None => {}
            }
        }
    }

    stack.pop();
    marks.insert(id, Mark::Finished);
    None
}

/// Returns true if `cycle` is a real cycle of `graph`
///
/// Every module must depend on the next one, and the last on the first.
pub fn is_cycle_of(graph: &ModuleGraph, cycle: &[ModuleId]) -> bool {
    if cycle.is_empty() {
        return false;
    }
    cycle.iter().enumerate().all(|(i, id)| {
        let next = &cycle[(i + 1) % cycle.len()];
        graph
            .dependencies_of(id.name())
            .is_ok_and(|deps| deps.contains(next))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InitResult;

    fn graph_of(modules: &[(&str, &[&str])]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (name, deps) in modules {
            graph
                .register_sync(*name, deps, || InitResult::Ok(()))
                .unwrap();
        }
        graph
    }

    fn ids(names: &[&str]) -> Vec<ModuleId> {
        names.iter().map(|n| ModuleId::new(*n)).collect()
    }

    #[test]
    fn test_valid_diamond() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        assert!(validate(&graph).is_ok());
        assert!(find_cycle(&graph).is_none());
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = graph_of(&[("a", &["b"]), ("b", &["a"])]);
        assert_eq!(validate(&graph), Err(GraphError::cyclic(ids(&["a", "b"]))));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = graph_of(&[("a", &[]), ("b", &["b"])]);
        assert_eq!(validate(&graph), Err(GraphError::cyclic(ids(&["b"]))));
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        // entry -> x -> y -> z -> x
        let graph = graph_of(&[
            ("entry", &["x"]),
            ("x", &["y"]),
            ("y", &["z"]),
            ("z", &["x"]),
        ]);
        let err = validate(&graph).unwrap_err();
        let cycle = err.cycle().unwrap();
        assert_eq!(cycle, ids(&["x", "y", "z"]).as_slice());
        assert!(is_cycle_of(&graph, cycle));
    }

    #[test]
    fn test_unknown_dependency_reported_before_cycle() {
        let graph = graph_of(&[("a", &["b"]), ("b", &["a", "ghost"])]);
        assert_eq!(
            validate(&graph),
            Err(GraphError::unknown_dependency("b", "ghost"))
        );
    }

    #[test]
    fn test_first_unknown_in_registration_order() {
        let graph = graph_of(&[("a", &["z1"]), ("b", &["z0"])]);
        assert_eq!(
            validate(&graph),
            Err(GraphError::unknown_dependency("a", "z1"))
        );
    }

    #[test]
    fn test_is_cycle_of_rejects_non_cycles() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"])]);
        assert!(!is_cycle_of(&graph, &ids(&["a", "b"])));
        assert!(!is_cycle_of(&graph, &[]));
    }
}
