//! Location resolution endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::api::LocationRequest;
use crate::error::{ApiError, ApiResult};
use crate::resolver::LocationResolver;
use crate::types::ResolvedLocation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(flatten)]
    pub location: LocationRequest,
    /// Confidence floor; defaults to the orchestrator's configured floor
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

/// POST /resolve
pub async fn resolve_location(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolvedLocation>> {
    let min_confidence = request
        .min_confidence
        .unwrap_or_else(|| state.orchestrator.min_confidence());
    if !(0.0..=1.0).contains(&min_confidence) {
        return Err(ApiError::BadRequest(format!(
            "min_confidence must be within 0.0-1.0, got {min_confidence}"
        )));
    }

    let query = request.location.into_query()?;
    let resolved = state
        .orchestrator
        .resolver()
        .resolve(&query, min_confidence)
        .await?;
    Ok(Json(resolved))
}

pub fn resolve_routes() -> Router<AppState> {
    Router::new().route("/resolve", post(resolve_location))
}
