use super::reducer::Reducer;
use super::router::Router;
use super::unit::WorkUnit;
use crate::config::FailurePolicy;
use crate::error::UnitError;
use crate::types::{TaskResult, UnitFailure};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

/// Bounded pool: at most `workers` tasks claim unit indices from a shared
/// cursor, however wide the scatter is.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
    yield_every: usize,
}

/// What one worker did before it stopped
#[derive(Debug, Default)]
struct WorkerReport {
    partial: Option<i64>,
    completed: u64,
}

/// Everything the barrier collected
#[derive(Debug, Default)]
pub struct BarrierReport {
    /// One folded value per worker that completed at least one unit
    pub partials: Vec<i64>,
    pub completed: u64,
    /// Sorted by unit index
    pub failures: Vec<UnitFailure>,
    /// Workers that died outside a unit. Each one also adds a failure
    /// for the unit it last claimed.
    pub lost_workers: usize,
}

/// Live counters of a scatter, readable before and after the barrier
#[derive(Debug, Clone, Default)]
pub struct ScatterProgress {
    completed: Arc<AtomicU64>,
    failures: Arc<Mutex<Vec<UnitFailure>>>,
}

// A poisoned sink still holds every failure pushed before the panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScatterProgress {
    /// Units that finished successfully so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Drain the failures recorded so far, ordered by unit index
    pub fn take_failures(&self) -> Vec<UnitFailure> {
        let mut failures = std::mem::take(&mut *lock(&self.failures));
        failures.sort_by_key(|f| f.index);
        failures
    }

    fn record_failure(&self, failure: UnitFailure) {
        lock(&self.failures).push(failure);
    }
}

/// Live handle over a scatter; `join_all` is the barrier
pub struct PoolHandle {
    set: JoinSet<WorkerReport>,
    claims: HashMap<Id, Arc<AtomicU64>>,
    progress: ScatterProgress,
}

impl WorkerPool {
    pub fn new(workers: usize, yield_every: usize) -> Self {
        Self {
            workers: workers.max(1),
            yield_every: yield_every.max(1),
        }
    }

    /// Start executing units `0..width`. Returns immediately.
    pub fn submit_all(
        &self,
        width: u64,
        router: Arc<dyn Router>,
        unit: Arc<dyn WorkUnit>,
        reducer: Reducer,
        policy: FailurePolicy,
        token: CancellationToken,
    ) -> PoolHandle {
        let cursor = Arc::new(AtomicU64::new(0));
        let progress = ScatterProgress::default();
        let mut set = JoinSet::new();
        let mut claims = HashMap::new();

        let spawn_count = (self.workers as u64).min(width);
        for worker_id in 0..spawn_count {
            let claim = Arc::new(AtomicU64::new(0));
            let worker = Worker {
                id: worker_id,
                width,
                cursor: cursor.clone(),
                claim: claim.clone(),
                router: router.clone(),
                unit: unit.clone(),
                reducer: reducer.clone(),
                progress: progress.clone(),
                policy,
                token: token.clone(),
                yield_every: self.yield_every,
            };
            let handle = set.spawn(worker.run());
            claims.insert(handle.id(), claim);
        }

        tracing::debug!("Scattered {} units across {} workers", width, spawn_count);

        PoolHandle {
            set,
            claims,
            progress,
        }
    }
}

impl PoolHandle {
    pub fn spawned_workers(&self) -> usize {
        self.set.len()
    }

    pub fn progress(&self) -> ScatterProgress {
        self.progress.clone()
    }

    /// Wait for every worker. Dropping this future aborts the workers.
    pub async fn join_all(mut self) -> BarrierReport {
        let mut report = BarrierReport::default();

        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(worker) => {
                    report.partials.extend(worker.partial);
                    report.completed += worker.completed;
                }
                Err(e) => {
                    tracing::error!("Worker task failed: {}", e);
                    report.lost_workers += 1;

                    let claim = self.claims.get(&e.id()).map(|c| c.load(Ordering::Relaxed));
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic().as_ref())
                    } else {
                        e.to_string()
                    };
                    if let Some(index) = claim {
                        self.progress.record_failure(UnitFailure {
                            index,
                            error: format!("worker lost: {}", reason),
                        });
                    }
                }
            }
        }

        report.failures = self.progress.take_failures();
        report
    }
}

struct Worker {
    id: u64,
    width: u64,
    cursor: Arc<AtomicU64>,
    claim: Arc<AtomicU64>,
    router: Arc<dyn Router>,
    unit: Arc<dyn WorkUnit>,
    reducer: Reducer,
    progress: ScatterProgress,
    policy: FailurePolicy,
    token: CancellationToken,
    yield_every: usize,
}

impl Worker {
    async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::default();
        let mut since_yield = 0;

        loop {
            if self.token.is_cancelled() {
                break;
            }

            let index = self.cursor.fetch_add(1, Ordering::Relaxed);
            if index >= self.width {
                break;
            }
            self.claim.store(index, Ordering::Relaxed);
            let task = self.router.route(index);

            let execution = AssertUnwindSafe(self.unit.execute(&task)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                outcome = execution => outcome,
            };

            let error = match outcome {
                Ok(Ok(value)) => {
                    report.partial = self.reducer.absorb(report.partial, &TaskResult { index, value });
                    report.completed += 1;
                    self.progress.completed.fetch_add(1, Ordering::Relaxed);
                    None
                }
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(UnitError::Panicked(panic_message(panic.as_ref()))),
            };

            if let Some(error) = error {
                tracing::warn!("Worker {}: unit {} failed: {}", self.id, index, error);
                self.progress.record_failure(UnitFailure {
                    index,
                    error: error.to_string(),
                });

                if self.policy == FailurePolicy::FailFast {
                    self.token.cancel();
                    break;
                }
            }

            since_yield += 1;
            if since_yield >= self.yield_every {
                since_yield = 0;
                tokio::task::yield_now().await;
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
