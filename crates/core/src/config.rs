use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{RunnerError, RunnerResult};

/// What the runner does when a unit fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Collect every failure and let sibling units finish
    #[default]
    FailSoft,
    /// Stop scheduling new units after the first failure
    FailFast,
}

/// Runner settings, usually loaded from the `[runner]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on concurrently executing units
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Barrier deadline in seconds (none = wait forever)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Units a worker runs between cooperative yields
    #[serde(default = "default_yield_every")]
    pub yield_every: usize,
}

fn default_workers() -> usize {
    64
}

fn default_yield_every() -> usize {
    128
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: None,
            failure_policy: FailurePolicy::default(),
            yield_every: default_yield_every(),
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> RunnerResult<()> {
        if self.workers == 0 {
            return Err(RunnerError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(RunnerError::InvalidConfig(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.yield_every == 0 {
            return Err(RunnerError::InvalidConfig(
                "yield_every must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
