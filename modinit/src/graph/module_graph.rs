//! ModuleGraph - dependency graph of initializable modules
//!
//! # Design
//!
//! Each node stores the dependencies it declared (its outgoing "depends-on"
//! edges). Dependents are derived on demand rather than stored, because a
//! dependency may name a module that has not been registered yet; the
//! reverse edge has nowhere to live until it is.
//!
//! Registration order is recorded and used for every deterministic
//! iteration: validation, tie-breaking in the scheduler, and reporting.

use super::error::{GraphError, GraphResult};
use super::scheduler::{self, ExecutionOrder};
use super::validator;
use super::ModuleId;
use crate::core::{InitResult, Initializer, RegistrationPolicy, SyncInitializer};
use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Lifecycle status of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// The name is not known to the graph
    Unregistered,
    /// Registered and waiting for a pass
    Registered,
    /// Every dependency completed; waiting for a slot to run
    Ready,
    /// The initializer is executing
    Running,
    /// The initializer completed successfully
    Done,
    /// The initializer failed, or a dependency did
    Failed,
}

impl ModuleStatus {
    /// Returns true for `Done` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unregistered => "unregistered",
            Self::Registered => "registered",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A module in the graph: identity, declared dependencies, initializer and status
#[derive(Clone)]
pub struct ModuleNode {
    id: ModuleId,
    index: usize,
    dependencies: Vec<ModuleId>,
    initializer: Arc<dyn Initializer>,
    status: ModuleStatus,
}

impl ModuleNode {
    /// Returns the module ID
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Returns the position of this module in registration order
    pub fn registration_index(&self) -> usize {
        self.index
    }

    /// Returns the declared dependencies, in declaration order
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    /// Returns the current status
    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    pub(crate) fn initializer(&self) -> Arc<dyn Initializer> {
        Arc::clone(&self.initializer)
    }
}

impl fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleNode")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("dependencies", &self.dependencies)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// A dependency graph of modules for one initialization pass
///
/// # Example
///
/// ```
/// use modinit::{ModuleGraph, ModuleId};
///
/// let mut graph = ModuleGraph::new();
/// graph.register("config", &[], || async { Ok(()) }).unwrap();
/// graph.register("session", &["config"], || async { Ok(()) }).unwrap();
/// graph.register("router", &["config", "session"], || async { Ok(()) }).unwrap();
///
/// graph.validate().unwrap();
/// let order = graph.execution_order().unwrap();
/// assert_eq!(order.as_slice()[0], ModuleId::new("config"));
/// assert_eq!(order.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    nodes: HashMap<ModuleId, ModuleNode>,
    /// Registration order for deterministic iteration
    registration_order: Vec<ModuleId>,
    policy: RegistrationPolicy,
    pass_completed: bool,
}

impl ModuleGraph {
    /// Creates an empty graph that rejects duplicate registrations
    pub fn new() -> Self {
        Self::with_policy(RegistrationPolicy::Reject)
    }

    /// Creates an empty graph with the given duplicate registration policy
    pub fn with_policy(policy: RegistrationPolicy) -> Self {
        Self {
            nodes: HashMap::new(),
            registration_order: Vec::new(),
            policy,
            pass_completed: false,
        }
    }

    /// Returns the duplicate registration policy
    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Returns the number of modules
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no module is registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registers a module with an async initializer
    ///
    /// `dependencies` may name modules that are registered later; they only
    /// need to exist by the time the graph is validated.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<ModuleId>,
        dependencies: &[&str],
        initializer: F,
    ) -> GraphResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InitResult> + Send + 'static,
    {
        self.register_initializer(name, dependencies, Arc::new(initializer))
    }

    /// Registers a module with a synchronous initializer
    pub fn register_sync<F>(
        &mut self,
        name: impl Into<ModuleId>,
        dependencies: &[&str],
        initializer: F,
    ) -> GraphResult<()>
    where
        F: Fn() -> InitResult + Send + Sync + 'static,
    {
        self.register_initializer(
            name,
            dependencies,
            Arc::new(SyncInitializer::new(initializer)),
        )
    }

    /// Registers a module with a shared initializer
    ///
    /// Under [`RegistrationPolicy::Reject`] a second registration of the same
    /// name fails with [`GraphError::DuplicateModule`]. Under
    /// [`RegistrationPolicy::Overwrite`] it replaces the dependencies and the
    /// initializer, keeps the original registration position, and puts the
    /// module back to `Registered`.
    pub fn register_initializer(
        &mut self,
        name: impl Into<ModuleId>,
        dependencies: &[&str],
        initializer: Arc<dyn Initializer>,
    ) -> GraphResult<()> {
        let id = name.into();

        let mut seen = HashSet::new();
        let dependencies: Vec<ModuleId> = dependencies
            .iter()
            .filter(|dep| seen.insert(**dep))
            .map(|dep| ModuleId::new(*dep))
            .collect();

        if let Some(existing) = self.nodes.get_mut(&id) {
            return match self.policy {
                RegistrationPolicy::Reject => Err(GraphError::duplicate_module(id)),
                RegistrationPolicy::Overwrite => {
                    debug!(module = %id, "overwriting module registration");
                    existing.dependencies = dependencies;
                    existing.initializer = initializer;
                    existing.status = ModuleStatus::Registered;
                    Ok(())
                }
            };
        }

        debug!(module = %id, dependencies = ?dependencies, "registering module");
        let index = self.registration_order.len();
        self.registration_order.push(id.clone());
        self.nodes.insert(
            id.clone(),
            ModuleNode {
                id,
                index,
                dependencies,
                initializer,
                status: ModuleStatus::Registered,
            },
        );
        Ok(())
    }

    /// Returns the declared dependencies of a module
    pub fn dependencies_of(&self, name: &str) -> GraphResult<&[ModuleId]> {
        self.nodes
            .get(name)
            .map(ModuleNode::dependencies)
            .ok_or_else(|| GraphError::module_not_found(name))
    }

    /// Returns the modules that directly depend on `name`, in registration order
    pub fn dependents_of(&self, name: &str) -> Vec<ModuleId> {
        self.modules()
            .filter(|node| node.dependencies.iter().any(|dep| dep == name))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Returns every module that depends on `name` directly or indirectly
    ///
    /// Breadth-first from `name`; the result is sorted by registration order.
    pub fn transitive_dependents(&self, name: &str) -> Vec<ModuleId> {
        let mut reverse: HashMap<&str, Vec<&ModuleId>> = HashMap::new();
        for node in self.modules() {
            for dep in &node.dependencies {
                reverse.entry(dep.name()).or_default().push(&node.id);
            }
        }

        let mut found: HashSet<&ModuleId> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for &dependent in reverse.get(current).into_iter().flatten() {
                if found.insert(dependent) {
                    queue.push_back(dependent.name());
                }
            }
        }

        let mut result: Vec<ModuleId> = found.into_iter().cloned().collect();
        result.sort_by_key(|id| self.registration_index(id.name()).unwrap_or(usize::MAX));
        result
    }

    /// Returns a module by name
    pub fn get(&self, name: &str) -> Option<&ModuleNode> {
        self.nodes.get(name)
    }

    /// Returns true if the module is registered
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Returns the registration position of a module
    pub fn registration_index(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|node| node.index)
    }

    /// Returns the status of a module, `Unregistered` for unknown names
    pub fn status(&self, name: &str) -> ModuleStatus {
        self.nodes
            .get(name)
            .map_or(ModuleStatus::Unregistered, |node| node.status)
    }

    pub(crate) fn set_status(&mut self, name: &ModuleId, status: ModuleStatus) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.status = status;
        }
    }

    /// Returns module IDs in registration order
    pub fn module_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.registration_order.iter()
    }

    /// Returns modules in registration order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.registration_order
            .iter()
            .filter_map(move |id| self.nodes.get(id))
    }

    /// Returns modules with no dependencies
    pub fn root_modules(&self) -> Vec<ModuleId> {
        self.modules()
            .filter(|node| node.dependencies.is_empty())
            .map(|node| node.id.clone())
            .collect()
    }

    /// Returns modules nothing depends on
    pub fn leaf_modules(&self) -> Vec<ModuleId> {
        let depended_on: HashSet<&ModuleId> = self
            .modules()
            .flat_map(|node| node.dependencies.iter())
            .collect();

        self.modules()
            .filter(|node| !depended_on.contains(&node.id))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Checks for unknown dependencies and cycles
    ///
    /// See [`validator::validate`].
    pub fn validate(&self) -> GraphResult<()> {
        validator::validate(self)
    }

    /// Computes a deterministic execution order
    ///
    /// See [`scheduler::compute_order`].
    pub fn execution_order(&self) -> GraphResult<ExecutionOrder> {
        scheduler::compute_order(self)
    }

    /// Groups modules into levels that can run side by side
    ///
    /// See [`scheduler::compute_levels`].
    pub fn levels(&self) -> GraphResult<Vec<Vec<ModuleId>>> {
        scheduler::compute_levels(self)
    }

    /// Returns true once a pass has run over this graph
    pub fn pass_completed(&self) -> bool {
        self.pass_completed
    }

    pub(crate) fn mark_pass_completed(&mut self) {
        self.pass_completed = true;
    }

    /// Returns every module to `Registered` so the graph can run again
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.status = ModuleStatus::Registered;
        }
        self.pass_completed = false;
    }

    /// Removes all modules
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.registration_order.clear();
        self.pass_completed = false;
    }

    /// Renders the graph in Graphviz DOT format
    ///
    /// Edges point from a dependency to its dependents, the direction
    /// initialization flows. Unknown dependencies are left out.
    pub fn to_dot(&self) -> String {
        let mut graph = DiGraph::<String, ()>::new();
        let mut node_indices = HashMap::new();

        for node in self.modules() {
            let idx = graph.add_node(node.id.to_string());
            node_indices.insert(&node.id, idx);
        }

        for node in self.modules() {
            let target = node_indices[&node.id];
            for dep in &node.dependencies {
                if let Some(&source) = node_indices.get(dep) {
                    graph.add_edge(source, target, ());
                }
            }
        }

        format!("{:?}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }

    /// Writes the DOT rendering to a file
    pub fn save_dot(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot())
    }
}
