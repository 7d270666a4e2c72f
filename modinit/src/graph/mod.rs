//! Dependency graph of initializable modules
//!
//! This module provides the graph data structure and the algorithms that
//! turn a set of module declarations into a safe initialization order:
//!
//! - Registration of modules and their declared dependencies
//! - Validation: unknown dependencies and cycles, with the full cycle path
//! - Topological ordering that breaks ties by registration order
//! - The ready frontier, for starting modules as soon as they can run
//!
//! # Algorithm References
//!
//! - Kahn's algorithm for topological sort, with a priority queue in place
//!   of the usual FIFO queue
//! - Depth-first search with three-color marking for cycle detection

mod error;
mod module_graph;
mod module_id;
mod scheduler;
mod validator;

pub use error::{GraphError, GraphResult};
pub use module_graph::{ModuleGraph, ModuleNode, ModuleStatus};
pub use module_id::ModuleId;
pub use scheduler::{compute_levels, compute_order, ExecutionOrder, Frontier};
pub use validator::{find_cycle, is_cycle_of, validate};
