use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An event in a run's lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
}

impl Event {
    pub fn new(run_id: RunId, event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id,
            timestamp: Utc::now(),
            event_type,
        }
    }
}

/// Types of events a run can emit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    // Run lifecycle events
    RunStarted {
        config: RunConfig,
    },
    PhaseChanged {
        from: RunPhase,
        to: RunPhase,
    },
    RunCompleted {
        status: OutcomeStatus,
        final_value: i64,
        duration_ms: u64,
    },
    RunCancelled {
        reason: String,
    },

    // Scatter / barrier events
    UnitsScattered {
        count: u64,
        workers: usize,
    },
    UnitFailed {
        index: u64,
        error: String,
    },
    BarrierReleased {
        completed: u64,
        failed: u64,
        skipped: u64,
    },
    BarrierTimedOut {
        completed: u64,
        elapsed_ms: u64,
    },
}

/// Event log writer trait
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event to the log
    async fn append(&self, event: Event) -> anyhow::Result<()>;

    /// Get all events for a run
    async fn get_run_events(&self, run_id: RunId) -> anyhow::Result<Vec<Event>>;
}

/// Event log held in memory, keyed by run
#[derive(Default)]
pub struct MemoryEventLog {
    events: RwLock<HashMap<RunId, Vec<Event>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all events of a run
    pub async fn forget(&self, run_id: &RunId) {
        self.events.write().await.remove(run_id);
    }
}

#[async_trait::async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: Event) -> anyhow::Result<()> {
        self.events
            .write()
            .await
            .entry(event.run_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn get_run_events(&self, run_id: RunId) -> anyhow::Result<Vec<Event>> {
        let mut events = self
            .events
            .read()
            .await
            .get(&run_id)
            .cloned()
            .unwrap_or_default();

        // Appends are ordered per run, but keep the contract explicit
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_event_log() {
        let log = MemoryEventLog::new();
        let run_id = RunId::new();

        let event = Event::new(
            run_id,
            EventType::RunStarted {
                config: RunConfig::new(3, 3),
            },
        );
        log.append(event.clone()).await.unwrap();
        log.append(Event::new(RunId::new(), EventType::RunCancelled {
            reason: "other run".to_string(),
        }))
        .await
        .unwrap();

        let events = log.get_run_events(run_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event.id);

        log.forget(&run_id).await;
        assert!(log.get_run_events(run_id).await.unwrap().is_empty());
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = Event::new(
            RunId::new(),
            EventType::UnitsScattered {
                count: 10,
                workers: 4,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"]["type"], "units_scattered");
        assert_eq!(json["event_type"]["count"], 10);
    }
}
