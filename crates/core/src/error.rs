//! Error types for the scatter/gather runner.

use crate::types::{RunId, RunPhase};

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that escape the runner. Unit failures, timeouts and total
/// mismatches are reported in the run outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The run or runner configuration is malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cancellation was requested for a run that is not executing.
    #[error("Run {0} is not active")]
    RunNotActive(RunId),

    /// The phase tracker saw a transition the lifecycle does not allow.
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },
}

/// Error produced by a single work unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// The unit returned an error.
    #[error("unit failed: {0}")]
    Failed(String),

    /// The unit panicked while executing.
    #[error("unit panicked: {0}")]
    Panicked(String),
}

impl UnitError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
