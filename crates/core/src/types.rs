use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RunnerError;

/// Unique identifier for a scatter/gather run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Input of a single run. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub fan_out_count: i64,
    pub expected_total: i64,
}

impl RunConfig {
    pub fn new(fan_out_count: i64, expected_total: i64) -> Self {
        Self {
            fan_out_count,
            expected_total,
        }
    }

    /// Reject configurations that must not reach the scatter stage
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.fan_out_count < 0 {
            return Err(RunnerError::InvalidConfig(format!(
                "fan_out_count must be non-negative, got {}",
                self.fan_out_count
            )));
        }
        Ok(())
    }
}

/// A spawn directive emitted by a router: "run `target` once with `payload`".
/// Target and payload are shared by every descriptor of a scatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub index: u64,
    pub target: Arc<str>,
    pub payload: Arc<serde_json::Value>,
}

/// Contribution of one completed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub index: u64,
    pub value: i64,
}

/// A unit that did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub index: u64,
    pub error: String,
}

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Preparing,
    Scattering,
    Waiting,
    Reducing,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Scattering => "scattering",
            Self::Waiting => "waiting",
            Self::Reducing => "reducing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a finished run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every unit completed and the total matched
    Succeeded,
    /// Every unit completed but the total differs from the expectation
    Mismatch,
    /// Some units failed, the rest were folded (fail-soft)
    PartialFailure,
    /// A unit failed and the run stopped scheduling (fail-fast)
    Failed,
    /// The barrier did not release before the deadline
    TimedOut,
    /// The run was cancelled before the barrier released
    Cancelled,
}

/// Terminal result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub final_value: i64,
    pub expected: i64,
    pub succeeded: bool,
    pub status: OutcomeStatus,
    pub message: String,
    pub units_total: u64,
    pub units_completed: u64,
    pub units_failed: u64,
    pub units_skipped: u64,
    pub failures: Vec<UnitFailure>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunOutcome {
    /// Summary for a given status and totals. Depends only on its inputs.
    pub fn describe(
        status: OutcomeStatus,
        expected: i64,
        got: i64,
        units_total: u64,
        units_completed: u64,
        units_failed: u64,
    ) -> String {
        match status {
            OutcomeStatus::Succeeded => {
                format!("✅ Success! Counter reached {} as expected.", got)
            }
            OutcomeStatus::Mismatch => {
                format!("❌ Failure! Expected {}, but got {}.", expected, got)
            }
            OutcomeStatus::PartialFailure | OutcomeStatus::Failed => format!(
                "❌ Failure! Expected {}, but got {}. {} unit(s) failed.",
                expected, got, units_failed
            ),
            OutcomeStatus::TimedOut => format!(
                "⏱ Timed out! Expected {}, but got {}. {} of {} units completed before the deadline.",
                expected, got, units_completed, units_total
            ),
            OutcomeStatus::Cancelled => format!(
                "⏹ Cancelled! Expected {}, but got {}. {} of {} units completed.",
                expected, got, units_completed, units_total
            ),
        }
    }
}
