use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::types::{OutcomeStatus, RunOutcome};

pub const RUNS_TOTAL: &str = "runs_total";
pub const RUNS_ACTIVE: &str = "runs_active";
pub const UNITS_COMPLETED_TOTAL: &str = "units_completed_total";
pub const UNITS_FAILED_TOTAL: &str = "units_failed_total";
pub const UNITS_SKIPPED_TOTAL: &str = "units_skipped_total";
pub const RUN_DURATION_SECONDS: &str = "run_duration_seconds";

const DEFAULT_BUCKETS: [f64; 10] = [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Runner metrics: counters, gauges and duration histograms
pub struct MetricsCollector {
    counters: Mutex<HashMap<String, Counter>>,
    gauges: Mutex<HashMap<String, Gauge>>,
    histograms: Mutex<HashMap<String, Histogram>>,
}

/// Counter - monotonically increasing value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: u64,
    pub labels: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

/// Gauge - value that can go up or down
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

/// Histogram - cumulative bucket counts of observed values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Histogram {
    pub name: String,
    pub buckets: Vec<f64>,
    pub counts: Vec<u64>,
    pub sum: f64,
    pub count: u64,
    pub labels: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

/// Point-in-time copy of every metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<Counter>,
    pub gauges: Vec<Gauge>,
    pub histograms: Vec<Histogram>,
}

// A poisoned metrics map still holds usable numbers.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    /// Increment a counter by a specific amount
    pub fn increment_counter_by(&self, name: &str, value: u64, labels: HashMap<String, String>) {
        let key = Self::metric_key(name, &labels);
        let now = Utc::now();

        lock(&self.counters)
            .entry(key)
            .and_modify(|c| {
                c.value += value;
                c.last_updated = now;
            })
            .or_insert_with(|| Counter {
                name: name.to_string(),
                value,
                labels,
                last_updated: now,
            });
    }

    /// Add `delta` (possibly negative) to a gauge
    pub fn add_gauge(&self, name: &str, delta: f64, labels: HashMap<String, String>) {
        let key = Self::metric_key(name, &labels);
        let now = Utc::now();

        lock(&self.gauges)
            .entry(key)
            .and_modify(|g| {
                g.value += delta;
                g.last_updated = now;
            })
            .or_insert_with(|| Gauge {
                name: name.to_string(),
                value: delta,
                labels,
                last_updated: now,
            });
    }

    /// Record a histogram observation
    pub fn observe_histogram(&self, name: &str, value: f64, labels: HashMap<String, String>) {
        let key = Self::metric_key(name, &labels);
        let now = Utc::now();

        let mut histograms = lock(&self.histograms);
        let histogram = histograms.entry(key).or_insert_with(|| Histogram {
            name: name.to_string(),
            buckets: DEFAULT_BUCKETS.to_vec(),
            counts: vec![0; DEFAULT_BUCKETS.len()],
            sum: 0.0,
            count: 0,
            labels,
            last_updated: now,
        });

        histogram.sum += value;
        histogram.count += 1;
        for (i, bucket) in histogram.buckets.iter().enumerate() {
            if value <= *bucket {
                histogram.counts[i] += 1;
            }
        }
        histogram.last_updated = now;
    }

    /// Mark a run as started
    pub fn run_started(&self) {
        self.add_gauge(RUNS_ACTIVE, 1.0, HashMap::new());
    }

    /// Fold a finished run into the counters
    pub fn record_outcome(&self, outcome: &RunOutcome) {
        let status = HashMap::from([("status".to_string(), status_label(outcome.status).to_string())]);

        self.add_gauge(RUNS_ACTIVE, -1.0, HashMap::new());
        self.increment_counter_by(RUNS_TOTAL, 1, status.clone());
        self.increment_counter_by(UNITS_COMPLETED_TOTAL, outcome.units_completed, HashMap::new());
        self.increment_counter_by(UNITS_FAILED_TOTAL, outcome.units_failed, HashMap::new());
        self.increment_counter_by(UNITS_SKIPPED_TOTAL, outcome.units_skipped, HashMap::new());
        self.observe_histogram(
            RUN_DURATION_SECONDS,
            outcome.duration_ms as f64 / 1000.0,
            status,
        );
    }

    pub fn get_counter(&self, name: &str, labels: &HashMap<String, String>) -> Option<Counter> {
        let key = Self::metric_key(name, labels);
        lock(&self.counters).get(&key).cloned()
    }

    pub fn get_gauge(&self, name: &str, labels: &HashMap<String, String>) -> Option<Gauge> {
        let key = Self::metric_key(name, labels);
        lock(&self.gauges).get(&key).cloned()
    }

    pub fn get_histogram(&self, name: &str, labels: &HashMap<String, String>) -> Option<Histogram> {
        let key = Self::metric_key(name, labels);
        lock(&self.histograms).get(&key).cloned()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: lock(&self.counters).values().cloned().collect(),
            gauges: lock(&self.gauges).values().cloned().collect(),
            histograms: lock(&self.histograms).values().cloned().collect(),
        }
    }

    /// Generate a unique key for a metric with labels
    fn metric_key(name: &str, labels: &HashMap<String, String>) -> String {
        if labels.is_empty() {
            return name.to_string();
        }

        let mut sorted_labels: Vec<_> = labels.iter().collect();
        sorted_labels.sort_by_key(|(k, _)| *k);

        let label_str = sorted_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");

        format!("{}:{}", name, label_str)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn status_label(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Succeeded => "succeeded",
        OutcomeStatus::Mismatch => "mismatch",
        OutcomeStatus::PartialFailure => "partial_failure",
        OutcomeStatus::Failed => "failed",
        OutcomeStatus::TimedOut => "timed_out",
        OutcomeStatus::Cancelled => "cancelled",
    }
}
