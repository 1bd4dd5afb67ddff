use crate::types::{RunConfig, TaskDescriptor};
use std::sync::Arc;

/// Prepare stage: decides how wide the scatter is. Receives an already
/// validated configuration.
pub trait FanOutSource: Send + Sync {
    fn fan_out(&self, config: &RunConfig) -> u64;
}

/// Takes the width from the run configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredFanOut;

impl FanOutSource for ConfiguredFanOut {
    fn fan_out(&self, config: &RunConfig) -> u64 {
        u64::try_from(config.fan_out_count).unwrap_or(0)
    }
}

/// Always scatters the same number of units, whatever the run asks for
#[derive(Debug, Clone, Copy)]
pub struct FixedFanOut(pub u64);

impl FanOutSource for FixedFanOut {
    fn fan_out(&self, _config: &RunConfig) -> u64 {
        self.0
    }
}

/// Turns a unit index into its spawn directive. Called by the pool when a
/// worker claims the index, so a scatter never materializes its whole width.
pub trait Router: Send + Sync {
    fn route(&self, index: u64) -> TaskDescriptor;
}

/// Sends every unit the same payload, to one target
#[derive(Debug, Clone)]
pub struct SpawnRouter {
    target: Arc<str>,
    payload: Arc<serde_json::Value>,
}

impl SpawnRouter {
    pub fn new(target: impl Into<Arc<str>>) -> Self {
        Self {
            target: target.into(),
            payload: Arc::new(serde_json::Value::Null),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Arc::new(payload);
        self
    }
}

impl Default for SpawnRouter {
    fn default() -> Self {
        Self::new("increment")
    }
}

impl Router for SpawnRouter {
    fn route(&self, index: u64) -> TaskDescriptor {
        TaskDescriptor {
            index,
            target: self.target.clone(),
            payload: self.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_fan_out() {
        assert_eq!(ConfiguredFanOut.fan_out(&RunConfig::new(7, 0)), 7);
        assert_eq!(ConfiguredFanOut.fan_out(&RunConfig::new(1 << 40, 0)), 1 << 40);
    }

    #[test]
    fn test_fixed_fan_out_ignores_config() {
        assert_eq!(FixedFanOut(10_000).fan_out(&RunConfig::new(1, 1)), 10_000);
    }

    #[test]
    fn test_spawn_router() {
        let router = SpawnRouter::new("worker").with_payload(serde_json::json!({"n": 1}));
        let tasks: Vec<TaskDescriptor> = (0..3).map(|i| router.route(i)).collect();

        assert_eq!(
            tasks.iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(tasks.iter().all(|t| &*t.target == "worker"));
        assert_eq!(tasks[2].payload["n"], 1);
    }

    #[test]
    fn test_descriptors_share_payload() {
        let router = SpawnRouter::default().with_payload(serde_json::json!({"big": [1, 2, 3]}));
        let first = router.route(0);
        let last = router.route(u64::MAX - 1);

        assert_eq!(last.index, u64::MAX - 1);
        assert!(Arc::ptr_eq(&first.payload, &last.payload));
        assert!(Arc::ptr_eq(&first.target, &last.target));
    }
}
