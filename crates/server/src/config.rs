use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fanout_core::events::MemoryEventLog;
use fanout_core::metrics::MetricsCollector;
use fanout_core::progress::TracingProgress;
use fanout_core::{CounterPipeline, RunConfig, RunId, RunOutcome, RunnerConfig, ScatterGatherRunner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub server: ServerSection,
}

/// Default run parameters for the counter pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_fan_out")]
    pub fan_out_count: i64,

    #[serde(default = "default_fan_out")]
    pub expected_total: i64,
}

fn default_fan_out() -> i64 {
    fanout_core::counter::DEFAULT_FAN_OUT
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fan_out_count: default_fan_out(),
            expected_total: default_fan_out(),
        }
    }
}

impl PipelineConfig {
    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(self.fan_out_count, self.expected_total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Finished runs kept for the API; the oldest are evicted first
    #[serde(default = "default_max_retained_runs")]
    pub max_retained_runs: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_retained_runs() -> usize {
    1000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_retained_runs: default_max_retained_runs(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        // Load config file if it exists, otherwise use defaults
        let config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            toml::from_str(&content).context("Failed to parse configuration file")?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        config
            .runner
            .validate()
            .context("Invalid [runner] configuration")?;

        Ok(config)
    }
}

/// Where a submitted run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Finished,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub config: RunConfig,
    pub state: RunState,
    pub submitted_at: DateTime<Utc>,
    pub outcome: Option<RunOutcome>,
    pub error: Option<String>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub runner: Arc<ScatterGatherRunner>,
    pub event_log: Arc<MemoryEventLog>,
    pub metrics: Arc<MetricsCollector>,
    pub runs: Arc<RwLock<HashMap<RunId, RunRecord>>>,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let event_log = Arc::new(MemoryEventLog::new());
        let metrics = Arc::new(MetricsCollector::new());

        let runner = CounterPipeline::new()
            .runner_config(config.runner.clone())
            .progress(Arc::new(TracingProgress))
            .event_log(event_log.clone())
            .metrics(metrics.clone())
            .build()
            .context("Failed to build runner")?;

        Ok(Self {
            config: config.clone(),
            runner: Arc::new(runner),
            event_log,
            metrics,
            runs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Track a submitted run, evicting the oldest finished runs (and
    /// their events) once more than `max_retained_runs` are held
    pub async fn record_run(&self, record: RunRecord) {
        let mut runs = self.runs.write().await;
        runs.insert(record.run_id, record);

        let mut finished: Vec<(DateTime<Utc>, RunId)> = runs
            .values()
            .filter(|r| r.state != RunState::Running)
            .map(|r| (r.submitted_at, r.run_id))
            .collect();
        finished.sort_by_key(|(submitted_at, _)| *submitted_at);

        let excess = runs.len().saturating_sub(self.config.server.max_retained_runs);
        let evicted: Vec<RunId> = finished.into_iter().take(excess).map(|(_, id)| id).collect();
        for run_id in &evicted {
            runs.remove(run_id);
        }
        drop(runs);

        for run_id in &evicted {
            self.event_log.forget(run_id).await;
        }
        if !evicted.is_empty() {
            tracing::debug!("Evicted {} finished run(s)", evicted.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_core::FailurePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load(&temp_dir.path().join("fanout.toml")).unwrap();

        assert_eq!(config.pipeline.fan_out_count, 10_000);
        assert_eq!(config.runner.workers, 64);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fanout.toml");
        std::fs::write(
            &path,
            r#"
[runner]
workers = 8
failure_policy = "fail_fast"

[pipeline]
fan_out_count = 500
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.runner.workers, 8);
        assert_eq!(config.runner.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.pipeline.fan_out_count, 500);
        assert_eq!(config.pipeline.expected_total, 10_000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    fn record(state: RunState, age_secs: i64) -> RunRecord {
        RunRecord {
            run_id: RunId::new(),
            config: RunConfig::new(1, 1),
            state,
            submitted_at: Utc::now() - chrono::Duration::seconds(age_secs),
            outcome: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_oldest_finished_runs_evicted() {
        use fanout_core::events::{Event, EventLog, EventType};

        let mut config = AppConfig::default();
        config.server.max_retained_runs = 2;
        let state = AppState::new(&config).unwrap();

        let oldest = record(RunState::Finished, 30);
        let running = record(RunState::Running, 60);
        state
            .event_log
            .append(Event::new(
                oldest.run_id,
                EventType::RunCancelled {
                    reason: "test".to_string(),
                },
            ))
            .await
            .unwrap();

        state.record_run(running.clone()).await;
        state.record_run(oldest.clone()).await;
        state.record_run(record(RunState::Finished, 10)).await;

        let runs = state.runs.read().await;
        assert_eq!(runs.len(), 2);
        assert!(!runs.contains_key(&oldest.run_id));
        // Running runs are never evicted, even when older
        assert!(runs.contains_key(&running.run_id));
        drop(runs);

        assert!(state
            .event_log
            .get_run_events(oldest.run_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_runner_section_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fanout.toml");
        std::fs::write(&path, "[runner]\nworkers = 0\n").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid [runner] configuration"));
    }
}
