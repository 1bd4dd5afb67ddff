use super::{ApiError, ApiResult};
use crate::config::{AppState, RunRecord, RunState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use fanout_core::{
    events::{Event, EventLog},
    metrics::MetricsSnapshot,
    RunConfig, RunId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn parse_run_id(raw: &str) -> ApiResult<RunId> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid run ID: {}", raw)))
}

/// List all runs
pub async fn list_runs(State(state): State<Arc<AppState>>) -> ApiResult<Json<ListRunsResponse>> {
    let mut runs: Vec<RunRecord> = state.runs.read().await.values().cloned().collect();
    runs.sort_by_key(|r| r.submitted_at);
    Ok(Json(ListRunsResponse { runs }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunRecord>,
}

/// Get a specific run
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<RunRecord>> {
    let run_id = parse_run_id(&run_id)?;

    let record = state
        .runs
        .read()
        .await
        .get(&run_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Run not found: {}", run_id)))?;

    Ok(Json(record))
}

/// Get events for a run
pub async fn get_run_events(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<GetRunEventsResponse>> {
    let run_id = parse_run_id(&run_id)?;

    let events = state.event_log.get_run_events(run_id).await?;

    Ok(Json(GetRunEventsResponse { events }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetRunEventsResponse {
    pub events: Vec<Event>,
}

/// Start a run in the background
pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRunRequest>,
) -> ApiResult<(StatusCode, Json<CreateRunResponse>)> {
    let defaults = state.config.pipeline.run_config();
    let config = RunConfig::new(
        req.fan_out_count.unwrap_or(defaults.fan_out_count),
        req.expected_total.unwrap_or(defaults.expected_total),
    );
    config.validate()?;

    let run_id = RunId::new();
    state
        .record_run(RunRecord {
            run_id,
            config,
            state: RunState::Running,
            submitted_at: chrono::Utc::now(),
            outcome: None,
            error: None,
        })
        .await;

    let runner = state.runner.clone();
    let runs = state.runs.clone();
    tokio::spawn(async move {
        let result = runner.run_as(run_id, config).await;

        let mut runs = runs.write().await;
        if let Some(record) = runs.get_mut(&run_id) {
            match result {
                Ok(outcome) => {
                    record.state = RunState::Finished;
                    record.outcome = Some(outcome);
                }
                Err(e) => {
                    tracing::error!("Run {} was rejected: {}", run_id, e);
                    record.state = RunState::Rejected;
                    record.error = Some(e.to_string());
                }
            }
        }
    });

    tracing::info!("Submitted run {}", run_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateRunResponse {
            run_id,
            message: format!("Run started with {} units", config.fan_out_count),
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRunRequest {
    /// Falls back to `[pipeline] fan_out_count`
    pub fan_out_count: Option<i64>,
    /// Falls back to `[pipeline] expected_total`
    pub expected_total: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRunResponse {
    pub run_id: RunId,
    pub message: String,
}

/// Cancel a running run
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let run_id = parse_run_id(&run_id)?;

    state.runner.cancel(run_id).await?;

    Ok(Json(serde_json::json!({
        "run_id": run_id,
        "message": "Cancellation requested",
    })))
}

/// Current metrics snapshot
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> ApiResult<Json<MetricsSnapshot>> {
    Ok(Json(state.metrics.snapshot()))
}
