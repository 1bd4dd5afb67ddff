use crate::config::{AppConfig, AppState};
use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fanout_core::RunnerError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod handlers;

/// Start the API server
pub async fn serve(addr: &str, config: AppConfig) -> Result<()> {
    let state = AppState::new(&config)?;

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/runs", get(handlers::list_runs).post(handlers::create_run))
        .route("/api/runs/{run_id}", get(handlers::get_run))
        .route("/api/runs/{run_id}/events", get(handlers::get_run_events))
        .route("/api/runs/{run_id}/cancel", post(handlers::cancel_run))
        .route("/api/metrics", get(handlers::get_metrics))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "fanout",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Custom error type for API handlers
pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_msg = self.error.to_string();
        let details = self
            .error
            .chain()
            .skip(1)
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(": ");

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (self.status, Json(response)).into_response()
    }
}

impl From<RunnerError> for ApiError {
    fn from(err: RunnerError) -> Self {
        let status = match &err {
            RunnerError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            RunnerError::RunNotActive(_) => StatusCode::CONFLICT,
            RunnerError::InvalidTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: err.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use fanout_core::RunnerConfig;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let config = AppConfig {
            runner: RunnerConfig {
                workers: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        create_router(AppState::new(&config).unwrap())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_router();
        let (status, body) = send(&app, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_fetch_run() {
        let app = test_router();
        let (status, body) = send(
            &app,
            post_json(
                "/api/runs",
                serde_json::json!({"fan_out_count": 100, "expected_total": 100}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["run_id"].as_str().unwrap().to_string();

        let mut record = serde_json::Value::Null;
        for _ in 0..200 {
            let (status, body) = send(&app, get(&format!("/api/runs/{}", run_id))).await;
            assert_eq!(status, StatusCode::OK);
            if body["state"] == "finished" {
                record = body;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(record["outcome"]["final_value"], 100);
        assert_eq!(record["outcome"]["succeeded"], true);

        let (status, body) = send(&app, get(&format!("/api/runs/{}/events", run_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["events"].as_array().unwrap().is_empty());

        let (_, body) = send(&app, get("/api/runs")).await;
        assert_eq!(body["runs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_fan_out_is_bad_request() {
        let app = test_router();
        let (status, body) = send(
            &app,
            post_json(
                "/api/runs",
                serde_json::json!({"fan_out_count": -1, "expected_total": 0}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid configuration"));
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_run_ids() {
        let app = test_router();

        let (status, _) = send(&app, get(&format!("/api/runs/{}", uuid::Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get("/api/runs/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            post_json(
                &format!("/api/runs/{}/cancel", uuid::Uuid::new_v4()),
                serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_run() {
        let app = test_router();
        let (status, body) = send(
            &app,
            post_json(
                "/api/runs",
                serde_json::json!({"fan_out_count": 1_i64 << 40, "expected_total": 1_i64 << 40}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["run_id"].as_str().unwrap().to_string();
        let cancel_uri = format!("/api/runs/{}/cancel", run_id);

        // 409 until the background task has registered the run
        let mut cancelled = false;
        for _ in 0..200 {
            let (status, _) = send(&app, post_json(&cancel_uri, serde_json::json!({}))).await;
            if status == StatusCode::OK {
                cancelled = true;
                break;
            }
            assert_eq!(status, StatusCode::CONFLICT);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(cancelled);

        let mut record = serde_json::Value::Null;
        for _ in 0..200 {
            let (_, body) = send(&app, get(&format!("/api/runs/{}", run_id))).await;
            if body["state"] == "finished" {
                record = body;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(record["outcome"]["status"], "cancelled");
        assert_eq!(record["outcome"]["succeeded"], false);
        assert!(record["outcome"]["message"]
            .as_str()
            .unwrap()
            .contains("Expected 1099511627776"));

        // The run is gone from the active set
        let (status, _) = send(&app, post_json(&cancel_uri, serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = test_router();
        let (status, body) = send(&app, get("/api/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["counters"].is_array());
    }
}
