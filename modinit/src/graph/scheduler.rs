//! Topological scheduling
//!
//! Uses Kahn's algorithm. Instead of a FIFO queue the ready set is a
//! priority queue keyed by position, so among modules that are ready at the
//! same time the one registered first always goes first. This makes the
//! order reproducible and lets callers steer it through registration order.
//!
//! The ready set is exposed as a [`Frontier`], which the driver reuses to
//! start modules as soon as their dependencies complete.

use super::error::{GraphError, GraphResult};
use super::validator::find_cycle;
use super::{ModuleGraph, ModuleId};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

/// An ordered sequence of modules where every dependency precedes its dependents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionOrder {
    modules: Vec<ModuleId>,
}

impl ExecutionOrder {
    /// Wraps a caller-supplied order
    ///
    /// The order is not checked here; the driver calls [`verify`](Self::verify)
    /// before running it.
    pub fn from_modules(modules: Vec<ModuleId>) -> Self {
        Self { modules }
    }

    /// Returns the number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if the order is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Returns the modules as a slice
    pub fn as_slice(&self) -> &[ModuleId] {
        &self.modules
    }

    /// Returns an iterator over the modules
    pub fn iter(&self) -> std::slice::Iter<'_, ModuleId> {
        self.modules.iter()
    }

    /// Returns the position of a module in the order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|id| id == name)
    }

    /// Consumes the order and returns the module IDs
    pub fn into_vec(self) -> Vec<ModuleId> {
        self.modules
    }

    /// Checks that this order can drive `graph`
    ///
    /// The order must list every registered module exactly once and place
    /// each dependency before its dependents.
    pub fn verify(&self, graph: &ModuleGraph) -> GraphResult<()> {
        let mut positions: HashMap<&ModuleId, usize> = HashMap::with_capacity(self.len());
        for (pos, id) in self.modules.iter().enumerate() {
            if !graph.contains(id.name()) {
                return Err(GraphError::invalid_order(format!(
                    "module '{}' is not registered",
                    id
                )));
            }
            if positions.insert(id, pos).is_some() {
                return Err(GraphError::invalid_order(format!(
                    "module '{}' appears more than once",
                    id
                )));
            }
        }

        if let Some(missing) = graph.module_ids().find(|id| !positions.contains_key(id)) {
            return Err(GraphError::invalid_order(format!(
                "module '{}' is missing from the order",
                missing
            )));
        }

        for (pos, id) in self.modules.iter().enumerate() {
            for dep in graph.dependencies_of(id.name())? {
                match positions.get(dep) {
                    Some(&dep_pos) if dep_pos < pos => {}
                    Some(_) => {
                        return Err(GraphError::invalid_order(format!(
                            "module '{}' is placed before its dependency '{}'",
                            id, dep
                        )))
                    }
                    None => return Err(GraphError::unknown_dependency(id, dep)),
                }
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a ExecutionOrder {
    type Item = &'a ModuleId;
    type IntoIter = std::slice::Iter<'a, ModuleId>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}

impl From<ExecutionOrder> for Vec<ModuleId> {
    fn from(order: ExecutionOrder) -> Self {
        order.modules
    }
}

/// The set of modules whose dependencies have all completed
///
/// Incremental Kahn's algorithm: [`pop_ready`](Self::pop_ready) hands out
/// the highest-priority ready module and [`complete`](Self::complete)
/// releases its dependents. A module whose dependency never completes never
/// becomes ready, which is how failures stop propagating work.
///
/// Only a module handed out by `pop_ready` can be completed, and only once.
#[derive(Debug, Clone)]
pub struct Frontier {
    ids: Vec<ModuleId>,
    index: HashMap<ModuleId, usize>,
    dependents: Vec<Vec<usize>>,
    remaining: Vec<usize>,
    slots: Vec<Slot>,
    ready: BinaryHeap<Reverse<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    Ready,
    Started,
    Completed,
}

impl Frontier {
    /// Builds a frontier over `modules`
    ///
    /// Position in `modules` is the priority: lower positions are handed out
    /// first. Each entry lists the module and its dependencies.
    pub fn new<'a, I>(modules: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = (&'a ModuleId, &'a [ModuleId])>,
    {
        let modules: Vec<(&ModuleId, &[ModuleId])> = modules.into_iter().collect();

        let ids: Vec<ModuleId> = modules.iter().map(|(id, _)| (*id).clone()).collect();
        let index: HashMap<ModuleId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut dependents = vec![Vec::new(); ids.len()];
        let mut remaining = vec![0; ids.len()];

        for (i, (id, deps)) in modules.iter().enumerate() {
            for dep in *deps {
                let dep_index = *index
                    .get(dep)
                    .ok_or_else(|| GraphError::unknown_dependency(*id, dep))?;
                dependents[dep_index].push(i);
                remaining[i] += 1;
            }
        }

        let slots: Vec<Slot> = remaining
            .iter()
            .map(|&count| if count == 0 { Slot::Ready } else { Slot::Waiting })
            .collect();
        let ready = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| **slot == Slot::Ready)
            .map(|(i, _)| Reverse(i))
            .collect();

        Ok(Self {
            ids,
            index,
            dependents,
            remaining,
            slots,
            ready,
        })
    }

    /// Builds a frontier over a graph, prioritized by registration order
    pub fn for_graph(graph: &ModuleGraph) -> GraphResult<Self> {
        Self::new(graph.modules().map(|node| (node.id(), node.dependencies())))
    }

    /// Builds a frontier over a graph, prioritized by position in `order`
    pub fn for_order(order: &ExecutionOrder, graph: &ModuleGraph) -> GraphResult<Self> {
        let modules = order
            .iter()
            .map(|id| Ok((id, graph.dependencies_of(id.name())?)))
            .collect::<GraphResult<Vec<_>>>()?;
        Self::new(modules)
    }

    /// Returns the ready modules in priority order without removing them
    pub fn ready(&self) -> Vec<ModuleId> {
        let mut ready: Vec<usize> = self.ready.iter().map(|Reverse(i)| *i).collect();
        ready.sort_unstable();
        ready.into_iter().map(|i| self.ids[i].clone()).collect()
    }

    /// Returns how many modules are ready
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Removes and returns the highest-priority ready module
    pub fn pop_ready(&mut self) -> Option<ModuleId> {
        let Reverse(i) = self.ready.pop()?;
        self.slots[i] = Slot::Started;
        Some(self.ids[i].clone())
    }

    /// Marks a module complete and returns the modules it made ready
    ///
    /// Completing an unknown module, one that was never handed out by
    /// [`pop_ready`](Self::pop_ready), or one already completed is a no-op.
    pub fn complete(&mut self, id: &ModuleId) -> Vec<ModuleId> {
        let Some(&i) = self.index.get(id) else {
            return Vec::new();
        };
        if self.slots[i] != Slot::Started {
            return Vec::new();
        }
        self.slots[i] = Slot::Completed;

        let mut released = Vec::new();
        for &dependent in &self.dependents[i] {
            self.remaining[dependent] = self.remaining[dependent].saturating_sub(1);
            if self.remaining[dependent] == 0 && self.slots[dependent] == Slot::Waiting {
                self.slots[dependent] = Slot::Ready;
                self.ready.push(Reverse(dependent));
                released.push(self.ids[dependent].clone());
            }
        }
        released
    }
}

/// Computes a deterministic execution order using Kahn's algorithm
///
/// Ties between modules that are ready at the same time are broken by
/// registration order, never by name.
///
/// This re-checks the graph rather than trusting an earlier `validate`:
/// unknown dependencies fail with [`GraphError::UnknownDependency`] and
/// leftover modules with [`GraphError::CyclicDependency`] carrying the cycle.
///
/// # Algorithm
///
/// 1. Count unresolved dependencies for every module
/// 2. Put all modules with count 0 in the ready queue
/// 3. While the queue is not empty:
///    a. Take the earliest-registered ready module, append it to the result
///    b. Decrement the count of each of its dependents
///    c. Dependents reaching 0 join the queue
/// 4. If the result is shorter than the graph, the rest sits on a cycle
pub fn compute_order(graph: &ModuleGraph) -> GraphResult<ExecutionOrder> {
    let mut frontier = Frontier::for_graph(graph)?;
    let mut modules = Vec::with_capacity(graph.len());

    while let Some(id) = frontier.pop_ready() {
        frontier.complete(&id);
        modules.push(id);
    }

    if modules.len() != graph.len() {
        let cycle = find_cycle(graph).unwrap_or_else(|| {
            let placed: HashSet<&ModuleId> = modules.iter().collect();
            graph
                .module_ids()
                .filter(|id| !placed.contains(id))
                .cloned()
                .collect()
        });
        return Err(GraphError::cyclic(cycle));
    }

    debug!(order = ?modules, "computed execution order");
    Ok(ExecutionOrder { modules })
}

/// Groups modules into levels
///
/// Level 0 holds modules without dependencies; level *k* holds modules whose
/// longest dependency chain has length *k*. Modules on the same level are
/// independent of each other and can run side by side. Within a level,
/// modules keep registration order.
pub fn compute_levels(graph: &ModuleGraph) -> GraphResult<Vec<Vec<ModuleId>>> {
    let order = compute_order(graph)?;
    let mut depth: HashMap<&ModuleId, usize> = HashMap::with_capacity(order.len());

    for id in order.iter() {
        let level = graph
            .dependencies_of(id.name())?
            .iter()
            .filter_map(|dep| depth.get(dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(id, level);
    }

    let level_count = depth.values().max().map_or(0, |max| max + 1);
    let mut levels: Vec<Vec<ModuleId>> = vec![Vec::new(); level_count];
    for id in graph.module_ids() {
        if let Some(&level) = depth.get(id) {
            levels[level].push(id.clone());
        }
    }

    Ok(levels)
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
    fn test_linear_order() {
        let graph = graph_of(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let order = compute_order(&graph).unwrap();
        assert_eq!(order.into_vec(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_ties_follow_registration_order_not_name() {
        let graph = graph_of(&[("zeta", &[]), ("alpha", &[]), ("mid", &[])]);
        let order = compute_order(&graph).unwrap();
        assert_eq!(order.into_vec(), ids(&["zeta", "alpha", "mid"]));
    }

    #[test]
    fn test_priority_not_fifo() {
        // `late` is released before `early`, but once both are ready
        // `early` goes first because it was registered first.
        let graph = graph_of(&[
            ("x", &[]),
            ("early", &["x", "y"]),
            ("y", &[]),
            ("late", &["x"]),
        ]);
        let order = compute_order(&graph).unwrap();
        assert_eq!(order.into_vec(), ids(&["x", "y", "early", "late"]));
    }

    #[test]
    fn test_order_is_idempotent() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        assert_eq!(compute_order(&graph).unwrap(), compute_order(&graph).unwrap());
    }

    #[test]
    fn test_cycle_rechecked() {
        let graph = graph_of(&[("ok", &[]), ("a", &["b"]), ("b", &["a"])]);
        assert_eq!(
            compute_order(&graph),
            Err(GraphError::cyclic(ids(&["a", "b"])))
        );
    }

    #[test]
    fn test_unknown_dependency_rechecked() {
        let graph = graph_of(&[("a", &["missing"])]);
        assert_eq!(
            compute_order(&graph),
            Err(GraphError::unknown_dependency("a", "missing"))
        );
    }

    #[test]
    fn test_levels() {
        let graph = graph_of(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
            ("e", &[]),
        ]);
        let levels = compute_levels(&graph).unwrap();
        assert_eq!(
            levels,
            vec![ids(&["a", "e"]), ids(&["b", "c"]), ids(&["d"])]
        );
    }

    #[test]
    fn test_levels_of_empty_graph() {
        assert!(compute_levels(&ModuleGraph::new()).unwrap().is_empty());
    }

    #[test]
    fn test_frontier_releases_dependents() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        let mut frontier = Frontier::for_graph(&graph).unwrap();

        assert_eq!(frontier.ready(), ids(&["a"]));
        let a = frontier.pop_ready().unwrap();
        assert_eq!(frontier.complete(&a), ids(&["b", "c"]));
        assert_eq!(frontier.ready_len(), 2);

        let b = frontier.pop_ready().unwrap();
        assert!(frontier.complete(&b).is_empty());
        let c = frontier.pop_ready().unwrap();
        assert_eq!(frontier.complete(&c), ids(&["d"]));
    }

    #[test]
    fn test_frontier_ignores_repeated_and_premature_completion() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        let mut frontier = Frontier::for_graph(&graph).unwrap();

        // Not handed out yet
        assert!(frontier.complete(&ModuleId::new("b")).is_empty());
        assert!(frontier.complete(&ModuleId::new("a")).is_empty());
        assert_eq!(frontier.ready(), ids(&["a"]));

        let a = frontier.pop_ready().unwrap();
        assert_eq!(frontier.complete(&a), ids(&["b"]));
        assert!(frontier.complete(&a).is_empty());
        assert_eq!(frontier.ready(), ids(&["b"]));

        let b = frontier.pop_ready().unwrap();
        assert_eq!(frontier.complete(&b), ids(&["c"]));
        assert!(frontier.complete(&b).is_empty());
        assert!(frontier.complete(&ModuleId::new("unknown")).is_empty());

        assert_eq!(frontier.pop_ready(), Some(ModuleId::new("c")));
        assert_eq!(frontier.pop_ready(), None);
    }

    #[test]
    fn test_verify_accepts_computed_order() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"])]);
        let order = compute_order(&graph).unwrap();
        assert!(order.verify(&graph).is_ok());
    }

    #[test]
    fn test_verify_rejects_bad_orders() {
        let graph = graph_of(&[("a", &[]), ("b", &["a"])]);

        let reversed = ExecutionOrder::from_modules(ids(&["b", "a"]));
        assert!(matches!(
            reversed.verify(&graph),
            Err(GraphError::InvalidOrder { .. })
        ));

        let missing = ExecutionOrder::from_modules(ids(&["a"]));
        assert!(matches!(
            missing.verify(&graph),
            Err(GraphError::InvalidOrder { .. })
        ));

        let repeated = ExecutionOrder::from_modules(ids(&["a", "a", "b"]));
        assert!(matches!(
            repeated.verify(&graph),
            Err(GraphError::InvalidOrder { .. })
        ));

        let stranger = ExecutionOrder::from_modules(ids(&["a", "b", "c"]));
        assert!(matches!(
            stranger.verify(&graph),
            Err(GraphError::InvalidOrder { .. })
        ));
    }
}
