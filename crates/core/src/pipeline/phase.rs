use crate::error::{RunnerError, RunnerResult};
use crate::types::RunPhase;

/// Forward-only run lifecycle:
/// Idle -> Preparing -> Scattering -> Waiting -> Reducing -> Done
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: RunPhase,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: RunPhase::Idle,
        }
    }

    /// Move to `to`, returning the phase that was left
    pub fn advance(&mut self, to: RunPhase) -> RunnerResult<RunPhase> {
        let from = self.current;
        if next_phase(from) != Some(to) {
            return Err(RunnerError::InvalidTransition { from, to });
        }

        self.current = to;
        Ok(from)
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn next_phase(phase: RunPhase) -> Option<RunPhase> {
    match phase {
        RunPhase::Idle => Some(RunPhase::Preparing),
        RunPhase::Preparing => Some(RunPhase::Scattering),
        RunPhase::Scattering => Some(RunPhase::Waiting),
        RunPhase::Waiting => Some(RunPhase::Reducing),
        RunPhase::Reducing => Some(RunPhase::Done),
        RunPhase::Done => None,
    }
}
