use super::executor::ScatterGatherRunner;
use super::reducer::Reducer;
use super::router::{ConfiguredFanOut, FanOutSource, Router, SpawnRouter};
use super::unit::WorkUnit;
use crate::config::{FailurePolicy, RunnerConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::events::EventLog;
use crate::metrics::MetricsCollector;
use crate::progress::{Progress, TracingProgress};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Assembles a runner: build, then validate, then execute
pub struct RunnerBuilder {
    config: RunnerConfig,
    deadline: Option<Duration>,
    unit: Option<Arc<dyn WorkUnit>>,
    router: Arc<dyn Router>,
    fan_out: Arc<dyn FanOutSource>,
    reducer: Reducer,
    progress: Arc<dyn Progress>,
    event_log: Option<Arc<dyn EventLog>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
            deadline: None,
            unit: None,
            router: Arc::new(SpawnRouter::default()),
            fan_out: Arc::new(ConfiguredFanOut),
            reducer: Reducer::sum(),
            progress: Arc::new(TracingProgress),
            event_log: None,
            metrics: None,
        }
    }

    /// Replace every setting at once
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Barrier deadline; takes precedence over `timeout_secs`
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn unit(mut self, unit: impl WorkUnit + 'static) -> Self {
        self.unit = Some(Arc::new(unit));
        self
    }

    pub fn shared_unit(mut self, unit: Arc<dyn WorkUnit>) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn router(mut self, router: impl Router + 'static) -> Self {
        self.router = Arc::new(router);
        self
    }

    pub fn fan_out(mut self, fan_out: impl FanOutSource + 'static) -> Self {
        self.fan_out = Arc::new(fan_out);
        self
    }

    pub fn reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn progress(mut self, progress: impl Progress + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn shared_progress(mut self, progress: Arc<dyn Progress>) -> Self {
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

    pub fn build(self) -> RunnerResult<ScatterGatherRunner> {
        self.config.validate()?;

        let unit = self
            .unit
            .ok_or_else(|| RunnerError::InvalidConfig("Work unit is required".to_string()))?;

        let deadline = match self.deadline {
            Some(d) if d.is_zero() => {
                return Err(RunnerError::InvalidConfig(
                    "deadline must be greater than 0".to_string(),
                ))
            }
            Some(d) => Some(d),
            None => self.config.timeout(),
        };

        tracing::debug!(
            "Built runner: workers={}, policy={:?}, deadline={:?}, reducer={}",
            self.config.workers,
            self.config.failure_policy,
            deadline,
            self.reducer.name()
        );

        Ok(ScatterGatherRunner {
            config: self.config,
            deadline,
            unit,
            router: self.router,
            fan_out: self.fan_out,
            reducer: self.reducer,
            progress: self.progress,
            event_log: self.event_log,
            metrics: self.metrics,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::unit::IncrementUnit;

    #[test]
    fn test_unit_is_required() {
        let result = RunnerBuilder::new().build();
        match result {
            Err(RunnerError::InvalidConfig(msg)) => assert!(msg.contains("Work unit is required")),
            _ => panic!("expected InvalidConfig"),
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = RunnerBuilder::new()
            .workers(0)
            .unit(IncrementUnit::new())
            .build();
        assert!(matches!(result, Err(RunnerError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let result = RunnerBuilder::new()
            .deadline(Duration::ZERO)
            .unit(IncrementUnit::new())
            .build();
        assert!(matches!(result, Err(RunnerError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_timeout_becomes_deadline() {
        let runner = RunnerBuilder::new()
            .config(RunnerConfig {
                timeout_secs: Some(30),
                failure_policy: FailurePolicy::FailFast,
                ..Default::default()
            })
            .unit(IncrementUnit::new())
            .build()
            .unwrap();

        assert_eq!(runner.deadline, Some(Duration::from_secs(30)));
        assert_eq!(runner.config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(runner.reducer.name(), "sum");
    }
}
