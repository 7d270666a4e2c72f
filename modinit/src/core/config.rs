// =============================================================================
// RUN CONFIGURATION
// =============================================================================
//
// Three knobs shape an initialization pass:
//
// 1. EXECUTION MODE: one module at a time, or independent modules together
//    up to a concurrency limit.
// 2. TIMEOUTS: a per-module limit (the initializer is failed when it runs
//    over) and a whole-pass limit (no new modules start after it elapses).
// 3. REGISTRATION POLICY: what happens when a name is registered twice.
//
// Everything is plain data with `const` presets so a host can embed it in
// its own configuration file through serde.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens when a module name is registered a second time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// The second registration fails with `GraphError::DuplicateModule`.
    #[default]
    Reject,
    /// The second registration replaces dependencies and initializer.
    ///
    /// The module keeps the registration position of its first
    /// registration, so tie-breaking in the schedule does not move.
    Overwrite,
}

/// How the driver schedules ready modules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Strictly one initializer at a time, in execution order.
    #[default]
    Sequential,
    /// Independent modules run concurrently, at most `max_in_flight` at once.
    Concurrent {
        /// Upper bound on initializers running together (0 is treated as 1)
        max_in_flight: usize,
    },
}

impl ExecutionMode {
    /// Returns how many initializers may run at the same time.
    pub fn max_in_flight(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Concurrent { max_in_flight } => (*max_in_flight).max(1),
        }
    }
}

/// Configuration for an initialization pass.
///
/// # Examples
///
/// ```
/// use modinit::{ExecutionMode, RunConfig};
/// use std::time::Duration;
///
/// let config = RunConfig::concurrent(4)
///     .with_module_timeout(Duration::from_secs(5))
///     .with_pass_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.mode, ExecutionMode::Concurrent { max_in_flight: 4 });
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Sequential or concurrent scheduling.
    ///
    /// Default: `Sequential`
    pub mode: ExecutionMode,

    /// Maximum time a single initializer may run before it is failed.
    ///
    /// Default: none
    pub module_timeout: Option<Duration>,

    /// Time after which no new initializer is started.
    ///
    /// Initializers already running are allowed to finish; the rest are
    /// reported as skipped.
    ///
    /// Default: none
    pub pass_timeout: Option<Duration>,

    /// Duplicate registration behavior.
    ///
    /// Default: `Reject`
    pub registration_policy: RegistrationPolicy,
}

impl RunConfig {
    /// One module at a time, no timeouts, duplicates rejected.
    pub const SEQUENTIAL: Self = Self {
        mode: ExecutionMode::Sequential,
        module_timeout: None,
        pass_timeout: None,
        registration_policy: RegistrationPolicy::Reject,
    };

    /// Concurrent execution with the given limit and otherwise default settings.
    pub const fn concurrent(max_in_flight: usize) -> Self {
        Self {
            mode: ExecutionMode::Concurrent { max_in_flight },
            ..Self::SEQUENTIAL
        }
    }

    /// Sets the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the per-module timeout.
    pub fn with_module_timeout(mut self, timeout: Duration) -> Self {
        self.module_timeout = Some(timeout);
        self
    }

    /// Sets the whole-pass timeout.
    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = Some(timeout);
        self
    }

    /// Sets the duplicate registration policy.
    pub fn with_registration_policy(mut self, policy: RegistrationPolicy) -> Self {
        self.registration_policy = policy;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::SEQUENTIAL
    }
}
