//! Registry cross-reference (resolver tier 2)
//!
//! Asks every coordinate-capable registry concurrently, each through its own
//! breaker, and rewards candidates that another registry independently places
//! within `AGREEMENT_RADIUS_KM`.

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::resilience::{call_resilient, BreakerRegistry, RetryPolicy};
use crate::types::{CandidateCoordinate, CoordinateSource, LocationQuery, SourceError, SourceId};

/// Two registries agree when their points are this close
pub const AGREEMENT_RADIUS_KM: f64 = 0.5;
pub const AGREEMENT_BONUS: f64 = 0.1;
pub const MAX_AGREED_CONFIDENCE: f64 = 0.95;

pub struct RegistryCrossReference {
    id: SourceId,
    registries: Vec<Arc<dyn CoordinateSource>>,
    breakers: Arc<BreakerRegistry>,
}

impl RegistryCrossReference {
    pub const SOURCE_ID: &'static str = "registry-xref";

    pub fn new(registries: Vec<Arc<dyn CoordinateSource>>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            id: SourceId::from(Self::SOURCE_ID),
            registries,
            breakers,
        }
    }

    pub fn registry_ids(&self) -> Vec<SourceId> {
        self.registries.iter().map(|r| r.id().clone()).collect()
    }
}

/// Apply the agreement bonus and order by confidence (stable within ties)
pub fn cross_reference(candidates: Vec<CandidateCoordinate>) -> Vec<CandidateCoordinate> {
    let mut scored: Vec<CandidateCoordinate> = candidates
        .iter()
        .map(|c| {
            let agreed = candidates.iter().any(|other| {
                other.source != c.source
                    && c.point().distance_km(&other.point()) <= AGREEMENT_RADIUS_KM
            });
            let mut scored = c.clone();
            if agreed {
                scored.confidence = (c.confidence + AGREEMENT_BONUS).min(MAX_AGREED_CONFIDENCE);
            }
            scored
        })
        .collect();

    scored.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    scored
}

#[async_trait]
impl CoordinateSource for RegistryCrossReference {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        let no_retry = RetryPolicy::none();
        let calls = self.registries.iter().map(|registry| {
            let breaker = self.breakers.breaker(registry.id());
            let no_retry = &no_retry;
            async move {
                let outcome = call_resilient(&breaker, timeout, no_retry, |remaining| {
                    registry.fetch_candidates(query, remaining)
                })
                .await;
                (registry.id().clone(), outcome)
            }
        });

        let mut candidates = Vec::new();
        let mut first_error = None;
        let mut answered = 0usize;
        for (registry, outcome) in join_all(calls).await {
            match outcome {
                Ok(found) => {
                    answered += 1;
                    tracing::debug!(source = %registry, candidates = found.len(), "Registry answered");
                    candidates.extend(found);
                }
                Err(e) => {
                    tracing::debug!(source = %registry, error = %e, "Registry lookup failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (answered, first_error) {
            (0, Some(err)) => Err(err),
            _ => Ok(cross_reference(candidates)),
        }
    }
}
