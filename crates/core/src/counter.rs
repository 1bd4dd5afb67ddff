//! The counter pipeline: every unit adds 1 and the total must equal the
//! number of spawned units.

use crate::config::RunnerConfig;
use crate::error::RunnerResult;
use crate::events::EventLog;
use crate::metrics::MetricsCollector;
use crate::pipeline::{IncrementUnit, Reducer, ScatterGatherRunner, SpawnRouter};
use crate::progress::{Progress, TracingProgress};
use crate::types::{RunConfig, RunOutcome};
use std::sync::Arc;

pub const DEFAULT_FAN_OUT: i64 = 10_000;

/// Counter pipeline with configurable width, expectation and runner settings
pub struct CounterPipeline {
    run: RunConfig,
    runner: RunnerConfig,
    progress: Arc<dyn Progress>,
    event_log: Option<Arc<dyn EventLog>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CounterPipeline {
    pub fn new() -> Self {
        Self {
            run: RunConfig::new(DEFAULT_FAN_OUT, DEFAULT_FAN_OUT),
            runner: RunnerConfig::default(),
            progress: Arc::new(TracingProgress),
            event_log: None,
            metrics: None,
        }
    }

    pub fn run_config(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn runner_config(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    pub fn progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the runner without executing it
    pub fn build(&self) -> RunnerResult<ScatterGatherRunner> {
        let mut builder = ScatterGatherRunner::builder()
            .config(self.runner.clone())
            .unit(IncrementUnit::new())
            .router(SpawnRouter::new("increment"))
            .reducer(Reducer::sum())
            .shared_progress(self.progress.clone());

        if let Some(event_log) = &self.event_log {
            builder = builder.event_log(event_log.clone());
        }
        if let Some(metrics) = &self.metrics {
            builder = builder.metrics(metrics.clone());
        }

        builder.build()
    }

    pub async fn run(self) -> RunnerResult<RunOutcome> {
        let runner = self.build()?;
        runner.run(self.run).await
    }
}

impl Default for CounterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the default counter pipeline: 10 000 units, expecting 10 000
pub async fn run_pipeline() -> RunnerResult<RunOutcome> {
    CounterPipeline::new().run().await
}
