//! Initializer contract
//!
//! An initializer is the unit of work a module runs once during a pass. It
//! reports its outcome as an explicit [`InitResult`] instead of relying on
//! panics, so the driver can classify it. Panics are still caught by the
//! driver and reported, but they are the exception path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::future::Future;
use thiserror::Error;

/// Error returned by a module initializer.
///
/// Carries a message only, which keeps run reports `Clone` and serializable
/// regardless of the error type the initializer used internally.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct InitError {
    message: String,
}

impl InitError {
    /// Creates an error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Captures an error and its whole `source()` chain as one message
    ///
    /// ```
    /// use modinit::InitError;
    ///
    /// let io = std::io::Error::new(std::io::ErrorKind::NotFound, "settings.json");
    /// let err = InitError::from_error(&io);
    /// assert_eq!(err.message(), "settings.json");
    /// ```
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(message, ": {}", cause);
            source = cause.source();
        }
        Self { message }
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for InitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for InitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Outcome of running an initializer
pub type InitResult = Result<(), InitError>;

/// A module's initialization logic.
///
/// Implemented for every `Fn() -> impl Future<Output = InitResult>` closure,
/// and for [`SyncInitializer`] which wraps a synchronous closure. The driver
/// calls `initialize` at most once per pass.
#[async_trait]
pub trait Initializer: Send + Sync {
    /// Runs the initialization logic
    async fn initialize(&self) -> InitResult;
}

#[async_trait]
impl<F, Fut> Initializer for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = InitResult> + Send + 'static,
{
    async fn initialize(&self) -> InitResult {
        (self)().await
    }
}

/// Adapts a synchronous closure into an [`Initializer`]
///
/// The closure runs on the driver's task, so it should not block for long.
pub struct SyncInitializer<F>(F);

impl<F> SyncInitializer<F>
where
    F: Fn() -> InitResult + Send + Sync,
{
    /// Wraps the closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Initializer for SyncInitializer<F>
where
    F: Fn() -> InitResult + Send + Sync,
{
    async fn initialize(&self) -> InitResult {
        (self.0)()
    }
}
