//! Structured result of an initialization pass
//!
//! A pass never throws on initializer failure. Everything that happened is
//! recorded here, one entry per module in execution order, and the host
//! decides what to do with it.

use crate::core::InitError;
use crate::graph::ModuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// How an initializer failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum InitializerFailure {
    /// The initializer returned an error
    #[error("initializer returned an error: {0}")]
    Returned(InitError),

    /// The initializer panicked
    #[error("initializer panicked: {0}")]
    Panicked(String),

    /// The initializer exceeded the per-module timeout
    #[error("initializer timed out after {after:?}")]
    TimedOut {
        /// The configured limit
        after: Duration,
    },
}

/// Why a module never ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A module it depends on, directly or not, failed
    DependencyFailed {
        /// The ancestor whose initializer failed
        dependency: ModuleId,
    },
    /// The pass was cancelled or timed out before the module could start
    Cancelled,
}

/// Outcome of one module in a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ModuleOutcome {
    /// The initializer completed successfully
    Done {
        /// Time the initializer took
        elapsed: Duration,
    },
    /// The initializer ran and failed
    Failed {
        /// What went wrong
        failure: InitializerFailure,
    },
    /// The initializer was never invoked
    Skipped {
        /// Why it was not invoked
        reason: SkipReason,
    },
}

impl ModuleOutcome {
    /// Returns true for `Done`
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Returns true for `Failed`
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns true for `Skipped`
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// One module's entry in a [`RunReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    /// The module
    pub module: ModuleId,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: ModuleOutcome,
}

/// Counts of outcomes in a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Modules whose initializer completed
    pub done: usize,
    /// Modules whose initializer failed
    pub failed: usize,
    /// Modules never started
    pub skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} failed, {} skipped",
            self.done, self.failed, self.skipped
        )
    }
}

/// Result of an initialization pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    cancelled: bool,
    modules: Vec<ModuleReport>,
}

impl RunReport {
    pub(crate) fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        cancelled: bool,
        modules: Vec<ModuleReport>,
    ) -> Self {
        Self {
            run_id,
            started_at,
            elapsed,
            cancelled,
            modules,
        }
    }

    /// Returns the identifier of this pass
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns when the pass started
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the wall time of the whole pass
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns true if the pass stopped starting modules early
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns per-module entries in execution order
    pub fn modules(&self) -> &[ModuleReport] {
        &self.modules
    }

    /// Returns the outcome of a module
    pub fn outcome(&self, name: &str) -> Option<&ModuleOutcome> {
        self.modules
            .iter()
            .find(|entry| entry.module == name)
            .map(|entry| &entry.outcome)
    }

    /// Returns the modules that completed, in execution order
    pub fn succeeded(&self) -> Vec<&ModuleId> {
        self.filter(ModuleOutcome::is_done)
    }

    /// Returns the modules whose initializer failed, in execution order
    pub fn failed(&self) -> Vec<&ModuleId> {
        self.filter(ModuleOutcome::is_failed)
    }

    /// Returns the modules that never started, in execution order
    pub fn skipped(&self) -> Vec<&ModuleId> {
        self.filter(ModuleOutcome::is_skipped)
    }

    /// Returns true if every module completed
    pub fn is_success(&self) -> bool {
        self.modules.iter().all(|entry| entry.outcome.is_done())
    }

    /// Returns outcome counts
    pub fn summary(&self) -> RunSummary {
        self.modules
            .iter()
            .fold(RunSummary::default(), |mut summary, entry| {
                match entry.outcome {
                    ModuleOutcome::Done { .. } => summary.done += 1,
                    ModuleOutcome::Failed { .. } => summary.failed += 1,
                    ModuleOutcome::Skipped { .. } => summary.skipped += 1,
                }
                summary
            })
    }

    fn filter(&self, predicate: fn(&ModuleOutcome) -> bool) -> Vec<&ModuleId> {
        self.modules
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .map(|entry| &entry.module)
            .collect()
    }
}
