use crate::types::RunId;

/// Hooks called by the runner at the scatter, barrier and verify points
pub trait Progress: Send + Sync {
    /// Units are about to be scattered
    fn on_scatter(&self, run_id: RunId, units: u64);

    /// The barrier released
    fn on_barrier(&self, run_id: RunId, completed: u64, failed: u64);

    /// The accumulator was compared against the expectation
    fn on_result(&self, run_id: RunId, expected: i64, got: i64);
}

/// Reports progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn on_scatter(&self, run_id: RunId, units: u64) {
        tracing::info!(%run_id, units, "Routing... Spawning tasks.");
    }

    fn on_barrier(&self, run_id: RunId, completed: u64, failed: u64) {
        tracing::info!(%run_id, completed, failed, "Collector: all units finished");
    }

    fn on_result(&self, run_id: RunId, expected: i64, got: i64) {
        tracing::info!(%run_id, "Result (Expected={}, Got={})", expected, got);
    }
}

/// Swallows every report
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn on_scatter(&self, _run_id: RunId, _units: u64) {}

    fn on_barrier(&self, _run_id: RunId, _completed: u64, _failed: u64) {}

    fn on_result(&self, _run_id: RunId, _expected: i64, _got: i64) {}
}
