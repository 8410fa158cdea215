//! tourgen-pipeline library interface
//!
//! Location pipeline for generated audio tours: resolve a place name to a
//! coordinate, aggregate facts about it, verify them, hand them to a narrative
//! generator and anchor each resulting stop.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod narrative;
pub mod orchestrator;
pub mod planner;
pub mod resilience;
pub mod resolver;
pub mod sources;
pub mod store;
pub mod types;
pub mod verifier;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::orchestrator::PipelineOrchestrator;
use crate::resilience::BreakerRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Same registry the orchestrator's adapters were built with
    pub breakers: Arc<BreakerRegistry>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pipeline error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            orchestrator,
            breakers,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::resolve_routes())
        .merge(api::fact_routes())
        .merge(api::guide_routes())
        .merge(api::breaker_routes())
        .with_state(state)
}
