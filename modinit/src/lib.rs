//! modinit: dependency-ordered module initialization
//!
//! Modules declare which other modules they depend on. `modinit` builds the
//! dependency graph, rejects graphs that cannot be initialized, computes a
//! deterministic order and runs each module's initializer once, after all
//! of its dependencies.
//!
//! # Features
//!
//! - **Validation**: unknown dependencies and cycles are reported before
//!   anything runs, with the full cycle path
//! - **Deterministic order**: ties are broken by registration order
//! - **Fail-propagate**: a failed module skips its dependents while
//!   independent modules keep going
//! - **Bounded concurrency**: independent modules can run side by side
//! - **Cancellation**: stop starting new modules on a token or a deadline
//!
//! # Quick Start
//!
//! ```
//! use modinit::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), GraphError> {
//! let coordinator = Coordinator::new(RunConfig::default());
//!
//! coordinator.register("config", &[], || async { Ok(()) })?;
//! coordinator.register("database", &["config"], || async { Ok(()) })?;
//! coordinator.register("cache", &["config"], || async {
//!     Err(InitError::new("redis unreachable"))
//! })?;
//! coordinator.register("api", &["database", "cache"], || async { Ok(()) })?;
//!
//! let report = coordinator.run().await?;
//! assert_eq!(report.summary().to_string(), "2 done, 1 failed, 1 skipped");
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`core`]: initializer contract and configuration
//! - [`graph`]: graph structure, validation and scheduling
//! - [`executor`]: driver, coordinator and run reports

pub mod core;
pub mod executor;
pub mod graph;

pub use crate::core::{
    ExecutionMode, InitError, InitResult, Initializer, RegistrationPolicy, RunConfig,
    SyncInitializer,
};

pub use executor::{
    Coordinator, Driver, InitializerFailure, ModuleOutcome, ModuleReport, RunReport, RunSummary,
    SkipReason,
};

pub use graph::{
    compute_levels, compute_order, find_cycle, is_cycle_of, validate, ExecutionOrder, Frontier,
    GraphError, GraphResult, ModuleGraph, ModuleId, ModuleNode, ModuleStatus,
};

// Re-export dependencies used in public API
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```
/// use modinit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        ExecutionMode, InitError, InitResult, Initializer, RegistrationPolicy, RunConfig,
    };

    pub use crate::executor::{Coordinator, ModuleOutcome, RunReport, SkipReason};

    pub use crate::graph::{GraphError, GraphResult, ModuleGraph, ModuleId, ModuleStatus};

    pub use async_trait::async_trait;
    pub use std::sync::Arc;
    pub use tokio_util::sync::CancellationToken;
}
