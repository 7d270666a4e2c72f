//! Initialization driver
//!
//! Walks an execution order and invokes each module's initializer at most
//! once.
//!
//! # How It Works
//!
//! 1. The order is verified against the graph; nothing runs if it does not fit
//! 2. A [`Frontier`] prioritized by the order tracks which modules are ready
//! 3. Ready modules start while there is a free slot (one slot in sequential
//!    mode, `max_in_flight` in concurrent mode)
//! 4. A completed module releases its dependents into the frontier
//! 5. A failed module releases nothing, so its dependents never start
//! 6. Once nothing is running, every module that did not run is classified
//!    as skipped, either because a dependency failed or because the pass was
//!    cancelled
//!
//! Initializers run on the caller's task: in-flight futures are polled
//! together with `FuturesUnordered`, not spawned. With one slot this is
//! exactly "walk the order one module at a time", since a priority frontier
//! keyed by a valid order hands modules out in that order.
//!
//! # Cancellation
//!
//! Cancellation (token or pass timeout) is checked before each start.
//! Initializers already running are never interrupted; they finish and are
//! reported normally.

use super::report::{InitializerFailure, ModuleOutcome, ModuleReport, RunReport, SkipReason};
use crate::core::{Initializer, RunConfig};
use crate::graph::{ExecutionOrder, Frontier, GraphResult, ModuleGraph, ModuleId, ModuleStatus};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

type Invocation = (ModuleId, Result<Duration, InitializerFailure>);

/// Runs initializers in dependency order
#[derive(Debug, Clone, Default)]
pub struct Driver {
    config: RunConfig,
}

impl Driver {
    /// Creates a driver with the given configuration
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every module of `graph` following `order`
    ///
    /// Updates module statuses in `graph` as the pass progresses and marks
    /// the pass completed at the end.
    ///
    /// # Errors
    ///
    /// Only structural problems with `order` are errors, and they are raised
    /// before any initializer runs. Initializer failures are reported in the
    /// returned [`RunReport`].
    pub async fn run(
        &self,
        order: &ExecutionOrder,
        graph: &mut ModuleGraph,
        cancel: &CancellationToken,
    ) -> GraphResult<RunReport> {
        order.verify(graph)?;
        let frontier = Frontier::for_order(order, graph)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("init_pass", %run_id, modules = order.len());
        Ok(self
            .drive(run_id, order, graph, frontier, cancel)
            .instrument(span)
            .await)
    }

    async fn drive(
        &self,
        run_id: Uuid,
        order: &ExecutionOrder,
        graph: &mut ModuleGraph,
        mut frontier: Frontier,
        cancel: &CancellationToken,
    ) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = self.config.pass_timeout.map(|timeout| started + timeout);
        let slots = self.config.mode.max_in_flight();

        info!(mode = ?self.config.mode, "starting initialization pass");

        for id in frontier.ready() {
            graph.set_status(&id, ModuleStatus::Ready);
        }

        let mut outcomes: HashMap<ModuleId, ModuleOutcome> = HashMap::with_capacity(order.len());
        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;

        loop {
            while in_flight.len() < slots && frontier.ready_len() > 0 {
                if !cancelled && self.should_stop(deadline, cancel) {
                    cancelled = true;
                    warn!("initialization pass cancelled; no new modules will start");
                }
                if cancelled {
                    break;
                }
                let Some(id) = frontier.pop_ready() else {
                    break;
                };
                let Some(node) = graph.get(id.name()) else {
                    continue;
                };
                let initializer = node.initializer();

                debug!(module = %id, "initializing module");
                graph.set_status(&id, ModuleStatus::Running);
                in_flight.push(invoke(id, initializer, self.config.module_timeout));
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(elapsed) => {
                    info!(module = %id, ?elapsed, "module initialized");
                    graph.set_status(&id, ModuleStatus::Done);
                    for released in frontier.complete(&id) {
                        debug!(module = %released, "module ready");
                        graph.set_status(&released, ModuleStatus::Ready);
                    }
                    outcomes.insert(id, ModuleOutcome::Done { elapsed });
                }
                Err(failure) => {
                    warn!(module = %id, error = %failure, "module failed to initialize");
                    graph.set_status(&id, ModuleStatus::Failed);
                    outcomes.insert(id, ModuleOutcome::Failed { failure });
                }
            }
        }

        let modules = classify(order, graph, outcomes);
        graph.mark_pass_completed();

        let report = RunReport::new(run_id, started_at, started.elapsed(), cancelled, modules);
        info!(summary = %report.summary(), elapsed = ?report.elapsed(), "initialization pass finished");
        report
    }

    fn should_stop(&self, deadline: Option<Instant>, cancel: &CancellationToken) -> bool {
        cancel.is_cancelled() || deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Builds the per-module report in execution order
///
/// Modules without an outcome never started. Walking in execution order
/// means every dependency is classified before its dependents, so a skip
/// can name the ancestor that actually failed.
fn classify(
    order: &ExecutionOrder,
    graph: &mut ModuleGraph,
    mut outcomes: HashMap<ModuleId, ModuleOutcome>,
) -> Vec<ModuleReport> {
    let mut modules: Vec<ModuleReport> = Vec::with_capacity(order.len());
    let mut failed_root: HashMap<ModuleId, ModuleId> = HashMap::new();

    for id in order {
        let outcome = match outcomes.remove(id) {
            Some(outcome) => outcome,
            None => {
                let culprit = graph
                    .dependencies_of(id.name())
                    .unwrap_or_default()
                    .iter()
                    .find_map(|dep| failed_root.get(dep).cloned());

                match culprit {
                    Some(dependency) => {
                        warn!(module = %id, %dependency, "skipping module: dependency failed");
                        graph.set_status(id, ModuleStatus::Failed);
                        ModuleOutcome::Skipped {
                            reason: SkipReason::DependencyFailed { dependency },
                        }
                    }
                    None => {
                        debug!(module = %id, "skipping module: pass cancelled");
                        ModuleOutcome::Skipped {
                            reason: SkipReason::Cancelled,
                        }
                    }
                }
            }
        };

        match &outcome {
            ModuleOutcome::Failed { .. } => {
                failed_root.insert(id.clone(), id.clone());
            }
            ModuleOutcome::Skipped {
                reason: SkipReason::DependencyFailed { dependency },
            } => {
                failed_root.insert(id.clone(), dependency.clone());
            }
            _ => {}
        }

        modules.push(ModuleReport {
            module: id.clone(),
            outcome,
        });
    }

    modules
}

async fn invoke(
    id: ModuleId,
    initializer: Arc<dyn Initializer>,
    timeout: Option<Duration>,
) -> Invocation {
    let started = Instant::now();
    let call = AssertUnwindSafe(async move { initializer.initialize().await }).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(caught) => caught,
            Err(_) => return (id, Err(InitializerFailure::TimedOut { after: limit })),
        },
        None => call.await,
    };

    let result = match caught {
        Ok(Ok(())) => Ok(started.elapsed()),
        Ok(Err(error)) => Err(InitializerFailure::Returned(error)),
        Err(payload) => Err(InitializerFailure::Panicked(panic_message(payload.as_ref()))),
    };
    (id, result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
