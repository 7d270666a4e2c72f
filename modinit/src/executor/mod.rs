//! Execution layer: running a module graph
//!
//! Module organization:
//! - driver: hides the execution strategy (sequential or bounded
//!   concurrency, cancellation, failure capture)
//! - coordinator: owns the graph and enforces the pass lifecycle
//! - report: the structured outcome of a pass

mod coordinator;
mod driver;
mod report;

pub use coordinator::Coordinator;
pub use driver::Driver;
pub use report::{
    InitializerFailure, ModuleOutcome, ModuleReport, RunReport, RunSummary, SkipReason,
};

// Re-export graph types the execution API hands out
pub use crate::graph::{ExecutionOrder, GraphError, GraphResult, ModuleId};
