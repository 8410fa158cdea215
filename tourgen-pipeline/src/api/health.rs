//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when any breaker is not CLOSED
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub open_breakers: usize,
    /// Last pipeline error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let open_breakers = state
        .breakers
        .snapshots()
        .iter()
        .filter(|s| s.state != crate::resilience::CircuitState::Closed)
        .count();

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if open_breakers == 0 { "ok" } else { "degraded" }.to_string(),
        module: "tourgen-pipeline".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        open_breakers,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
