//! Fact aggregation endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::time::Duration;

use crate::aggregator::AggregationReport;
use crate::error::{ApiError, ApiResult};
use crate::types::LanguageCode;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FactsRequest {
    pub subject: String,
    pub language: String,
    /// Aggregation budget; capped at the configured budget
    #[serde(default)]
    pub budget_ms: Option<u64>,
}

/// POST /facts
pub async fn aggregate_facts(
    State(state): State<AppState>,
    Json(request): Json<FactsRequest>,
) -> ApiResult<Json<AggregationReport>> {
    let subject = request.subject.trim();
    if subject.is_empty() {
        return Err(ApiError::BadRequest("subject must not be empty".to_string()));
    }
    let language = LanguageCode::parse(&request.language).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let configured = state.orchestrator.aggregation_budget();
    let budget = request
        .budget_ms
        .map(Duration::from_millis)
        .map_or(configured, |requested| requested.min(configured));

    let report = state
        .orchestrator
        .aggregator()
        .aggregate_detailed(subject, &language, budget)
        .await;
    Ok(Json(report))
}

pub fn fact_routes() -> Router<AppState> {
    Router::new().route("/facts", post(aggregate_facts))
}
