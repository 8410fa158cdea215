//! Circuit breaker diagnostics

use axum::{extract::State, routing::get, Json, Router};

use crate::resilience::CircuitSnapshot;
use crate::AppState;

/// GET /breakers
///
/// One snapshot per registered source, sorted by source id.
pub async fn list_breakers(State(state): State<AppState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.breakers.snapshots())
}

pub fn breaker_routes() -> Router<AppState> {
    Router::new().route("/breakers", get(list_breakers))
}
