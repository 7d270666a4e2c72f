//! Coordinator - the execution API
//!
//! Owns a [`ModuleGraph`] behind a lock and runs it with a [`Driver`]. The
//! handle is cheap to clone and can be shared with initializers, which is
//! how a module could try to register more modules mid-pass. That attempt
//! fails fast with [`GraphError::GraphLocked`], as does a second concurrent
//! run.
//!
//! Lifecycle: `new → register* → run → reset → run ...`

use super::driver::Driver;
use super::report::RunReport;
use crate::core::{InitResult, Initializer, RunConfig};
use crate::graph::{ExecutionOrder, GraphError, GraphResult, ModuleGraph, ModuleId, ModuleStatus};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The graph and the running flag, always read and written under one lock
#[derive(Debug, Default)]
struct State {
    graph: ModuleGraph,
    running: bool,
}

struct Inner {
    state: Mutex<State>,
    driver: Driver,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registers modules and runs initialization passes
///
/// # Example
///
/// ```
/// use modinit::{Coordinator, RunConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let coordinator = Coordinator::new(RunConfig::default());
/// coordinator.register("config", &[], || async { Ok(()) }).unwrap();
/// coordinator.register("database", &["config"], || async { Ok(()) }).unwrap();
///
/// let report = coordinator.run().await.unwrap();
/// assert!(report.is_success());
/// # }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Creates a coordinator with an empty graph
    pub fn new(config: RunConfig) -> Self {
        let state = State {
            graph: ModuleGraph::with_policy(config.registration_policy),
            running: false,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                driver: Driver::new(config),
            }),
        }
    }

    /// Returns the configuration
    pub fn config(&self) -> &RunConfig {
        self.inner.driver.config()
    }

    /// Returns true while a pass is in progress
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    /// Registers a module with an async initializer
    ///
    /// # Errors
    ///
    /// [`GraphError::GraphLocked`] during a pass, and
    /// [`GraphError::DuplicateModule`] under the `Reject` policy.
    pub fn register<F, Fut>(
        &self,
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
        &self,
        name: impl Into<ModuleId>,
        dependencies: &[&str],
        initializer: F,
    ) -> GraphResult<()>
    where
        F: Fn() -> InitResult + Send + Sync + 'static,
    {
        self.with_unlocked_graph(|graph| graph.register_sync(name, dependencies, initializer))
    }

    /// Registers a module with a shared initializer
    pub fn register_initializer(
        &self,
        name: impl Into<ModuleId>,
        dependencies: &[&str],
        initializer: Arc<dyn Initializer>,
    ) -> GraphResult<()> {
        self.with_unlocked_graph(|graph| graph.register_initializer(name, dependencies, initializer))
    }

    /// Returns the declared dependencies of a module
    pub fn dependencies_of(&self, name: &str) -> GraphResult<Vec<ModuleId>> {
        self.state().graph.dependencies_of(name).map(<[ModuleId]>::to_vec)
    }

    /// Returns the status of a module
    ///
    /// During a pass this reflects the state before the pass started; the
    /// statuses of the pass are published when it finishes.
    pub fn status(&self, name: &str) -> ModuleStatus {
        self.state().graph.status(name)
    }

    /// Returns the number of registered modules
    pub fn len(&self) -> usize {
        self.state().graph.len()
    }

    /// Returns true if no module is registered
    pub fn is_empty(&self) -> bool {
        self.state().graph.is_empty()
    }

    /// Checks for unknown dependencies and cycles
    pub fn validate(&self) -> GraphResult<()> {
        self.state().graph.validate()
    }

    /// Computes the execution order the next pass would use
    pub fn execution_order(&self) -> GraphResult<ExecutionOrder> {
        self.state().graph.execution_order()
    }

    /// Groups modules into levels that can run side by side
    pub fn levels(&self) -> GraphResult<Vec<Vec<ModuleId>>> {
        self.state().graph.levels()
    }

    /// Renders the graph in Graphviz DOT format
    pub fn to_dot(&self) -> String {
        self.state().graph.to_dot()
    }

    /// Returns a copy of the graph
    pub fn snapshot(&self) -> ModuleGraph {
        self.state().graph.clone()
    }

    /// Puts every module back to `Registered` so the graph can run again
    pub fn reset(&self) -> GraphResult<()> {
        self.with_unlocked_graph(|graph| {
            graph.reset();
            Ok(())
        })
    }

    /// Removes every module
    pub fn clear(&self) -> GraphResult<()> {
        self.with_unlocked_graph(|graph| {
            graph.clear();
            Ok(())
        })
    }

    /// Runs one initialization pass
    ///
    /// See [`run_with_cancellation`](Self::run_with_cancellation).
    pub async fn run(&self) -> GraphResult<RunReport> {
        self.run_with_cancellation(CancellationToken::new()).await
    }

    /// Runs one initialization pass that stops starting modules once
    /// `cancel` fires
    ///
    /// Dropping the returned future mid-pass abandons the pass: statuses
    /// reached so far are published, initializers that were still running
    /// are marked `Failed`, and the graph needs a `reset` before it can run
    /// again.
    ///
    /// # Errors
    ///
    /// Structural errors are returned before any initializer runs:
    ///
    /// - [`GraphError::GraphLocked`] if a pass is already running
    /// - [`GraphError::PassCompleted`] if the graph already ran and was not
    ///   reset
    /// - [`GraphError::UnknownDependency`] or [`GraphError::CyclicDependency`]
    ///   from validation
    ///
    /// Initializer failures are never errors here; they are in the report.
    pub async fn run_with_cancellation(&self, cancel: CancellationToken) -> GraphResult<RunReport> {
        let (mut pass, order) = PassGuard::acquire(&self.inner.state)
            .inspect_err(|error| warn!(%error, "refusing to run module graph"))?;

        info!(modules = order.len(), "running module initialization");
        match self.inner.driver.run(&order, &mut pass.graph, &cancel).await {
            Ok(report) => Ok(report),
            Err(error) => {
                pass.publish = false;
                Err(error)
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    fn with_unlocked_graph<T>(
        &self,
        f: impl FnOnce(&mut ModuleGraph) -> GraphResult<T>,
    ) -> GraphResult<T> {
        let mut state = self.state();
        if state.running {
            return Err(GraphError::GraphLocked);
        }
        f(&mut state.graph)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(RunConfig::default())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", self.config())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// One pass over a working copy of the graph
///
/// Acquired under the state lock, so no registration can land between the
/// running check and the copy. Dropping the guard publishes the working copy
/// and clears the running flag, whether the pass finished or was abandoned.
struct PassGuard<'a> {
    state: &'a Mutex<State>,
    graph: ModuleGraph,
    publish: bool,
}

impl<'a> PassGuard<'a> {
    fn acquire(state: &'a Mutex<State>) -> GraphResult<(Self, ExecutionOrder)> {
        let mut locked = lock(state);
        if locked.running {
            return Err(GraphError::GraphLocked);
        }
        if locked.graph.pass_completed() {
            return Err(GraphError::PassCompleted);
        }
        locked.graph.validate()?;
        let order = locked.graph.execution_order()?;

        locked.running = true;
        let graph = locked.graph.clone();
        drop(locked);

        Ok((
            Self {
                state,
                graph,
                publish: true,
            },
            order,
        ))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(self.state);
        state.running = false;
        if !self.publish {
            return;
        }

        if !self.graph.pass_completed() {
            let interrupted: Vec<ModuleId> = self
                .graph
                .modules()
                .filter(|node| node.status() == ModuleStatus::Running)
                .map(|node| node.id().clone())
                .collect();
            warn!(interrupted = ?interrupted, "initialization pass abandoned");
            for id in &interrupted {
                self.graph.set_status(id, ModuleStatus::Failed);
            }
            self.graph.mark_pass_completed();
        }
        state.graph = std::mem::take(&mut self.graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RegistrationPolicy;

    #[tokio::test]
    async fn test_run_publishes_statuses() {
        let coordinator = Coordinator::default();
        coordinator.register_sync("a", &[], || Ok(())).unwrap();
        coordinator.register_sync("b", &["a"], || Ok(())).unwrap();

        let report = coordinator.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(coordinator.status("a"), ModuleStatus::Done);
        assert_eq!(coordinator.status("b"), ModuleStatus::Done);
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_second_run_needs_reset() {
        let coordinator = Coordinator::default();
        coordinator.register_sync("a", &[], || Ok(())).unwrap();

        coordinator.run().await.unwrap();
        assert_eq!(coordinator.run().await.unwrap_err(), GraphError::PassCompleted);

        coordinator.reset().unwrap();
        assert_eq!(coordinator.status("a"), ModuleStatus::Registered);
        assert!(coordinator.run().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_structural_error_leaves_graph_runnable() {
        let coordinator = Coordinator::default();
        coordinator.register_sync("b", &["z"], || Ok(())).unwrap();

        assert_eq!(
            coordinator.run().await.unwrap_err(),
            GraphError::unknown_dependency("b", "z")
        );
        assert!(!coordinator.is_running());

        coordinator.register_sync("z", &[], || Ok(())).unwrap();
        assert!(coordinator.run().await.unwrap().is_success());
    }

    #[test]
    fn test_registration_policy_comes_from_config() {
        let config = RunConfig::default().with_registration_policy(RegistrationPolicy::Overwrite);
        let coordinator = Coordinator::new(config);
        coordinator.register_sync("a", &[], || Ok(())).unwrap();
        coordinator.register_sync("b", &[], || Ok(())).unwrap();
        coordinator.register_sync("a", &["b"], || Ok(())).unwrap();

        assert_eq!(coordinator.len(), 2);
        assert_eq!(coordinator.dependencies_of("a").unwrap(), vec![ModuleId::new("b")]);
    }

    #[test]
    fn test_pass_blocks_mutation() {
        let coordinator = Coordinator::default();
        coordinator.register_sync("a", &[], || Ok(())).unwrap();
        let (pass, order) = PassGuard::acquire(&coordinator.inner.state).unwrap();
        assert_eq!(order.len(), 1);
        assert!(coordinator.is_running());

        assert_eq!(
            coordinator.register_sync("late", &[], || Ok(())),
            Err(GraphError::GraphLocked)
        );
        assert_eq!(coordinator.reset(), Err(GraphError::GraphLocked));
        assert_eq!(coordinator.clear(), Err(GraphError::GraphLocked));
        assert!(matches!(
            PassGuard::acquire(&coordinator.inner.state),
            Err(GraphError::GraphLocked)
        ));

        drop(pass);
        assert!(!coordinator.is_running());
        assert_eq!(coordinator.status("late"), ModuleStatus::Unregistered);
    }

    #[test]
    fn test_registration_before_pass_is_published_with_it() {
        let coordinator = Coordinator::default();
        coordinator.register_sync("a", &[], || Ok(())).unwrap();
        coordinator.register_sync("late", &["a"], || Ok(())).unwrap();

        let (pass, order) = PassGuard::acquire(&coordinator.inner.state).unwrap();
        assert_eq!(order.position("late"), Some(1));
        drop(pass);

        assert_eq!(coordinator.len(), 2);
        assert!(coordinator.snapshot().contains("late"));
    }

    #[test]
    fn test_abandoned_pass_marks_running_modules_failed() {
        let coordinator = Coordinator::default();
        coordinator.register_sync("a", &[], || Ok(())).unwrap();
        coordinator.register_sync("b", &["a"], || Ok(())).unwrap();

        let (mut pass, _) = PassGuard::acquire(&coordinator.inner.state).unwrap();
        pass.graph.set_status(&ModuleId::new("a"), ModuleStatus::Done);
        pass.graph.set_status(&ModuleId::new("b"), ModuleStatus::Running);
        drop(pass);

        assert_eq!(coordinator.status("a"), ModuleStatus::Done);
        assert_eq!(coordinator.status("b"), ModuleStatus::Failed);
        assert!(!coordinator.is_running());
        assert!(coordinator.snapshot().pass_completed());
    }
}
