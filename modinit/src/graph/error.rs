//! Error types for graph operations
//!
//! Every structural problem with a set of module declarations surfaces as a
//! [`GraphError`]. These are raised before any initializer runs.

use crate::ModuleId;
use thiserror::Error;

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while building, validating or scheduling a graph
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    /// A module was registered twice under the `Reject` policy
    #[error("Duplicate module: {module}")]
    DuplicateModule {
        /// The name registered twice
        module: ModuleId,
    },

    /// A module depends on a name that was never registered
    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency {
        /// The module that declared the dependency
        module: ModuleId,
        /// The dependency that is not registered
        dependency: ModuleId,
    },

    /// The dependency relation contains a cycle
    ///
    /// Each module in `cycle` depends on the next one; the last depends on
    /// the first.
    #[error("Cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// The modules forming the cycle, in dependency order
        cycle: Vec<ModuleId>,
    },

    /// The graph is being initialized and cannot be modified or re-run
    #[error("Graph is locked: an initialization pass is in progress")]
    GraphLocked,

    /// A module was not found in the graph
    #[error("Module not found: {module}")]
    ModuleNotFound {
        /// The name that was looked up
        module: ModuleId,
    },

    /// The graph already completed a pass and must be reset first
    #[error("Initialization pass already completed; reset the graph to run again")]
    PassCompleted,

    /// A caller-supplied execution order does not fit the graph
    #[error("Invalid execution order: {reason}")]
    InvalidOrder {
        /// Why the order was rejected
        reason: String,
    },
}

fn format_cycle(cycle: &[ModuleId]) -> String {
    let mut path: Vec<&str> = cycle.iter().map(ModuleId::name).collect();
    if let Some(first) = cycle.first() {
        path.push(first.name());
    }
    path.join(" -> ")
}

impl GraphError {
    /// Creates a duplicate module error
    pub fn duplicate_module(module: impl Into<ModuleId>) -> Self {
        Self::DuplicateModule {
            module: module.into(),
        }
    }

    /// Creates an unknown dependency error
    pub fn unknown_dependency(module: impl Into<ModuleId>, dependency: impl Into<ModuleId>) -> Self {
        Self::UnknownDependency {
            module: module.into(),
            dependency: dependency.into(),
        }
    }

    /// Creates a cyclic dependency error from the modules on the cycle
    pub fn cyclic(cycle: Vec<ModuleId>) -> Self {
        Self::CyclicDependency { cycle }
    }

    /// Creates a module not found error
    pub fn module_not_found(module: impl Into<ModuleId>) -> Self {
        Self::ModuleNotFound {
            module: module.into(),
        }
    }

    /// Creates an invalid order error
    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidOrder {
            reason: reason.into(),
        }
    }

    /// Returns the cycle if this is a cyclic dependency error
    pub fn cycle(&self) -> Option<&[ModuleId]> {
        match self {
            Self::CyclicDependency { cycle } => Some(cycle),
            _ => None,
        }
    }
}
