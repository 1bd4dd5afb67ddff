use super::phase::PhaseTracker;
use super::pool::{BarrierReport, WorkerPool};
use super::reducer::Reducer;
use super::router::{FanOutSource, Router};
use super::unit::WorkUnit;
use super::builder::RunnerBuilder;
use crate::config::{FailurePolicy, RunnerConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::events::{Event, EventLog, EventType};
use crate::metrics::MetricsCollector;
use crate::progress::Progress;
use crate::types::{OutcomeStatus, RunConfig, RunId, RunOutcome, RunPhase, UnitFailure};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Fans a run out over a bounded pool, waits on the barrier and folds
/// the results into one accumulator.
pub struct ScatterGatherRunner {
    pub(super) config: RunnerConfig,
    pub(super) deadline: Option<Duration>,
    pub(super) unit: Arc<dyn WorkUnit>,
    pub(super) router: Arc<dyn Router>,
    pub(super) fan_out: Arc<dyn FanOutSource>,
    pub(super) reducer: Reducer,
    pub(super) progress: Arc<dyn Progress>,
    pub(super) event_log: Option<Arc<dyn EventLog>>,
    pub(super) metrics: Option<Arc<MetricsCollector>>,
    // Track active runs for cancellation
    pub(super) active_runs: Arc<RwLock<HashMap<RunId, CancellationToken>>>,
}

/// `UnitFailed` events recorded per run
pub const MAX_FAILURE_EVENTS: usize = 100;

enum Barrier {
    Released(BarrierReport),
    TimedOut,
}

impl ScatterGatherRunner {
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    /// Execute one run under a fresh id
    pub async fn run(&self, config: RunConfig) -> RunnerResult<RunOutcome> {
        self.run_as(RunId::new(), config).await
    }

    /// Execute one run under a caller-chosen id, so it can be cancelled
    /// while it is in flight
    pub async fn run_as(&self, run_id: RunId, config: RunConfig) -> RunnerResult<RunOutcome> {
        config.validate()?;

        let token = CancellationToken::new();
        self.active_runs.write().await.insert(run_id, token.clone());

        let result = self.execute(run_id, config, token).await;

        self.active_runs.write().await.remove(&run_id);

        result
    }

    /// Cancel a running scatter. Units not yet started are skipped.
    pub async fn cancel(&self, run_id: RunId) -> RunnerResult<()> {
        let active_runs = self.active_runs.read().await;

        let token = active_runs
            .get(&run_id)
            .ok_or(RunnerError::RunNotActive(run_id))?;
        token.cancel();
        tracing::info!("Cancellation signal sent for run {}", run_id);

        Ok(())
    }

    pub async fn active_runs(&self) -> Vec<RunId> {
        self.active_runs.read().await.keys().copied().collect()
    }

    async fn execute(
        &self,
        run_id: RunId,
        config: RunConfig,
        token: CancellationToken,
    ) -> RunnerResult<RunOutcome> {
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let mut phases = PhaseTracker::new();

        tracing::info!(
            "Starting run {}: fan_out={}, expected={}",
            run_id,
            config.fan_out_count,
            config.expected_total
        );
        self.emit(run_id, EventType::RunStarted { config }).await;

        // Prepare
        self.advance(&mut phases, run_id, RunPhase::Preparing).await?;
        let units_total = self.fan_out.fan_out(&config);

        // Scatter
        self.advance(&mut phases, run_id, RunPhase::Scattering).await?;
        self.progress.on_scatter(run_id, units_total);

        if let Some(metrics) = &self.metrics {
            metrics.run_started();
        }
        let pool = WorkerPool::new(self.config.workers, self.config.yield_every);
        let handle = pool.submit_all(
            units_total,
            self.router.clone(),
            self.unit.clone(),
            self.reducer.clone(),
            self.config.failure_policy,
            token.clone(),
        );
        let scatter = handle.progress();
        self.emit(
            run_id,
            EventType::UnitsScattered {
                count: units_total,
                workers: handle.spawned_workers(),
            },
        )
        .await;

        // Barrier
        self.advance(&mut phases, run_id, RunPhase::Waiting).await?;
        let barrier = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, handle.join_all()).await {
                Ok(report) => Barrier::Released(report),
                Err(_) => {
                    // The dropped join future has aborted every worker
                    token.cancel();
                    Barrier::TimedOut
                }
            },
            None => Barrier::Released(handle.join_all().await),
        };

        // Reduce
        self.advance(&mut phases, run_id, RunPhase::Reducing).await?;
        let (final_value, units_completed, failures, status) = match barrier {
            Barrier::TimedOut => {
                let units_completed = scatter.completed();
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::warn!("Run {} timed out waiting on the barrier", run_id);
                self.emit(
                    run_id,
                    EventType::BarrierTimedOut {
                        completed: units_completed,
                        elapsed_ms,
                    },
                )
                .await;

                let failures = scatter.take_failures();
                self.emit_failures(run_id, &failures).await;
                (
                    self.reducer.initial(),
                    units_completed,
                    failures,
                    OutcomeStatus::TimedOut,
                )
            }
            Barrier::Released(report) => {
                let failed = report.failures.len() as u64;
                let skipped = units_total.saturating_sub(report.completed + failed);
                if report.lost_workers > 0 {
                    tracing::error!("Run {} lost {} worker(s)", run_id, report.lost_workers);
                }
                self.progress.on_barrier(run_id, report.completed, failed);
                self.emit(
                    run_id,
                    EventType::BarrierReleased {
                        completed: report.completed,
                        failed,
                        skipped,
                    },
                )
                .await;
                self.emit_failures(run_id, &report.failures).await;

                let fail_fast_tripped =
                    self.config.failure_policy == FailurePolicy::FailFast && failed > 0;
                let final_value = self.reducer.finish(report.partials);

                let status = if fail_fast_tripped {
                    OutcomeStatus::Failed
                } else if token.is_cancelled() && skipped > 0 {
                    self.emit(
                        run_id,
                        EventType::RunCancelled {
                            reason: "Cancellation requested".to_string(),
                        },
                    )
                    .await;
                    OutcomeStatus::Cancelled
                } else if failed > 0 {
                    OutcomeStatus::PartialFailure
                } else if final_value == config.expected_total {
                    OutcomeStatus::Succeeded
                } else {
                    OutcomeStatus::Mismatch
                };

                (final_value, report.completed, report.failures, status)
            }
        };

        // Verify
        self.advance(&mut phases, run_id, RunPhase::Done).await?;
        self.progress
            .on_result(run_id, config.expected_total, final_value);

        let units_failed = failures.len() as u64;
        let units_skipped = units_total.saturating_sub(units_completed + units_failed);
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = RunOutcome {
            run_id,
            final_value,
            expected: config.expected_total,
            succeeded: status == OutcomeStatus::Succeeded,
            status,
            message: RunOutcome::describe(
                status,
                config.expected_total,
                final_value,
                units_total,
                units_completed,
                units_failed,
            ),
            units_total,
            units_completed,
            units_failed,
            units_skipped,
            failures,
            started_at,
            completed_at: chrono::Utc::now(),
            duration_ms,
        };

        self.emit(
            run_id,
            EventType::RunCompleted {
                status,
                final_value,
                duration_ms,
            },
        )
        .await;
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(&outcome);
        }

        if outcome.succeeded {
            tracing::info!("Run {} completed: {}", run_id, outcome.message);
        } else {
            tracing::warn!("Run {} did not succeed: {}", run_id, outcome.message);
        }

        Ok(outcome)
    }

    // The outcome keeps every failure; the log keeps the first few.
    async fn emit_failures(&self, run_id: RunId, failures: &[UnitFailure]) {
        for failure in failures.iter().take(MAX_FAILURE_EVENTS) {
            self.emit(
                run_id,
                EventType::UnitFailed {
                    index: failure.index,
                    error: failure.error.clone(),
                },
            )
            .await;
        }
    }

    async fn advance(
        &self,
        phases: &mut PhaseTracker,
        run_id: RunId,
        to: RunPhase,
    ) -> RunnerResult<()> {
        let from = phases.advance(to)?;
        tracing::debug!("Run {}: {} -> {}", run_id, from, to);
        self.emit(run_id, EventType::PhaseChanged { from, to }).await;
        Ok(())
    }

    // Event recording is best effort: a broken log must not fail the run.
    async fn emit(&self, run_id: RunId, event_type: EventType) {
        if let Some(event_log) = &self.event_log {
            if let Err(e) = event_log.append(Event::new(run_id, event_type)).await {
                tracing::warn!("Failed to record event for run {}: {}", run_id, e);
            }
        }
    }
}
