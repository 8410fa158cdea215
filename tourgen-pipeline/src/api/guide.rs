//! Guide generation and lookup endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::LocationRequest;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::GuideResult;
use crate::store::{GuideKey, StoredGuide};
use crate::types::LanguageCode;
use crate::AppState;

/// POST /guide
///
/// Runs the full pipeline. Failures are also recorded as the service's last error.
pub async fn generate_guide(
    State(state): State<AppState>,
    Json(request): Json<LocationRequest>,
) -> ApiResult<Json<GuideResult>> {
    let query = request.into_query()?;
    match state.orchestrator.run(query).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GuideLookup {
    pub name: String,
    pub language: String,
}

/// GET /guide?name=..&language=..
pub async fn load_guide(
    State(state): State<AppState>,
    Query(lookup): Query<GuideLookup>,
) -> ApiResult<Json<StoredGuide>> {
    let language = LanguageCode::parse(&lookup.language).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let key = GuideKey::new(&lookup.name, language);

    let store = state
        .orchestrator
        .store()
        .ok_or_else(|| ApiError::NotFound("guide storage is disabled".to_string()))?;

    store
        .load(&key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no guide for {:?} ({})", key.normalized_name, key.language)))
}

pub fn guide_routes() -> Router<AppState> {
    Router::new().route("/guide", post(generate_guide).get(load_guide))
}
