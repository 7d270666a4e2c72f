//! Foundation types shared by the graph and the executor.
//!
//! - [`Initializer`]: the unit of work a module runs once per pass
//! - [`InitError`] / [`InitResult`]: what an initializer returns
//! - [`RunConfig`]: execution mode, timeouts and registration policy

mod config;
mod initializer;

pub use config::{ExecutionMode, RegistrationPolicy, RunConfig};
pub use initializer::{InitError, InitResult, Initializer, SyncInitializer};
