//! HTTP API for health checks, Prometheus metrics and the forecast history

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use forecast_lib::{
    health::{HealthRegistry, HealthResponse},
    model::{ArtifactStore, ArtifactVersion},
    observability::ForecastMetrics,
    store::ForecastStore,
    ForecastError, HistoryRow, Prediction,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ForecastMetrics,
    pub store: Arc<ForecastStore>,
    pub artifacts: ArtifactStore,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ForecastMetrics,
        store: Arc<ForecastStore>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            store,
            artifacts,
        }
    }
}

/// Error body returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

struct ApiError(ForecastError);

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "API request failed");
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Keep only the most recent rows
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub rows: Vec<HistoryRow>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub artifact: Option<ArtifactVersion>,
    pub latest_reading: Option<DateTime<Utc>>,
    pub latest_prediction: Option<Prediction>,
    pub health: HealthResponse,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Readings joined with predictions, oldest first
async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let rows = state.store.history(query.limit)?;
    Ok(Json(HistoryResponse {
        total: rows.len(),
        rows,
    }))
}

async fn latest_prediction(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let response = match state.store.latest_prediction()? {
        Some(prediction) => Json(prediction).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no prediction has been made yet".to_string(),
                kind: "not_found".to_string(),
            }),
        )
            .into_response(),
    };
    Ok(response)
}

async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(StatusResponse {
        artifact: state.artifacts.current_version()?,
        latest_reading: state.store.latest_reading_timestamp()?,
        latest_prediction: state.store.latest_prediction()?,
        health: state.health_registry.health().await,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/history", get(history))
        .route("/api/v1/predictions/latest", get(latest_prediction))
        .route("/api/v1/status", get(status))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
