//! Tiered location resolver
//!
//! Strategies run strictly in configured order, each through its breaker with
//! its own timeout and no retry. The first candidate clearing the tier's
//! threshold wins; when nothing does, the regional default centroid for the
//! query's hints is accepted as the last tier.
//!
//! **Tie-break:** among candidates clearing the threshold, the first one whose
//! country or address matches the hints wins, otherwise the source's first.

pub mod regions;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tourgen_common::text::normalize_name;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::resilience::{call_resilient, BreakerRegistry, RetryPolicy};
use crate::types::{CandidateCoordinate, CoordinateSource, LocationQuery, ResolvedLocation, SourceId};
use regions::{country_for_point, find_country, find_region, iso3_for, region_for_point, RegionalDefault};

/// Alternates kept on a resolved location
const MAX_ALTERNATES: usize = 10;

/// ISO 3166-1 user-assigned code for "unknown country"
pub const UNKNOWN_COUNTRY: &str = "ZZZ";

/// One coordinate strategy with its acceptance threshold and timeout
#[derive(Clone)]
pub struct TierStrategy {
    pub source: Arc<dyn CoordinateSource>,
    pub min_confidence: f64,
    pub timeout: Duration,
}

impl TierStrategy {
    pub fn new(source: Arc<dyn CoordinateSource>, min_confidence: f64, timeout: Duration) -> Self {
        Self {
            source,
            min_confidence,
            timeout,
        }
    }
}

/// Location resolution capability
///
/// The chapter planner depends on this trait rather than on `TieredResolver`
/// so tests can substitute a scripted resolver.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// Resolve `query`, accepting nothing below `min_confidence` except the regional default
    ///
    /// # Errors
    /// `PipelineError::ResolutionExhausted` when no tier, not even the regional
    /// default, produced a coordinate.
    async fn resolve(
        &self,
        query: &LocationQuery,
        min_confidence: f64,
    ) -> Result<ResolvedLocation, PipelineError>;
}

pub struct TieredResolver {
    tiers: Vec<TierStrategy>,
    regional: RegionalDefault,
    breakers: Arc<BreakerRegistry>,
}

impl TieredResolver {
    pub fn new(tiers: Vec<TierStrategy>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            tiers,
            regional: RegionalDefault::new(),
            breakers,
        }
    }

    /// Source ids in resolution order, regional default last
    pub fn tier_ids(&self) -> Vec<SourceId> {
        self.tiers
            .iter()
            .map(|t| t.source.id().clone())
            .chain(std::iter::once(self.regional.source().clone()))
            .collect()
    }

    /// Index of the regional-default tier
    pub fn regional_tier(&self) -> usize {
        self.tiers.len()
    }
}

/// Whole-word containment on normalized text
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// True when the candidate agrees with any hint the query carries
fn matches_hints(candidate: &CandidateCoordinate, query: &LocationQuery) -> bool {
    let address = candidate
        .formatted_address
        .as_deref()
        .map(normalize_name)
        .unwrap_or_default();

    let country_match = query.hint_country.as_deref().is_some_and(|hint| {
        let hinted = find_country(hint);
        let by_code = match (hinted, candidate.country_code.as_deref().and_then(iso3_for)) {
            (Some(h), Some(code)) => h.iso3 == code,
            _ => false,
        };
        let by_name = hinted.is_some_and(|h| {
            std::iter::once(h.name)
                .chain(h.aliases.iter().copied())
                .any(|n| contains_phrase(&address, &normalize_name(n)))
        }) || (hinted.is_none() && contains_phrase(&address, &normalize_name(hint)));
        by_code || by_name
    });

    let region_match = query.hint_region.as_deref().is_some_and(|hint| {
        let by_address = contains_phrase(&address, &normalize_name(hint));
        let by_point = match (find_region(hint, None), region_for_point(&candidate.point())) {
            (Some(hinted), Some(found)) => hinted.name == found.name,
            _ => false,
        };
        by_address || by_point
    });

    country_match || region_match
}

/// Pick the winning candidate index among those clearing `threshold`
fn select_candidate(
    candidates: &[CandidateCoordinate],
    threshold: f64,
    query: &LocationQuery,
) -> Option<usize> {
    let eligible: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.confidence >= threshold)
        .map(|(i, _)| i)
        .collect();

    eligible
        .iter()
        .copied()
        .find(|&i| matches_hints(&candidates[i], query))
        .or_else(|| eligible.first().copied())
}

/// Assemble the resolved location, deriving country and region labels
fn build_resolved(
    query: &LocationQuery,
    coordinate: CandidateCoordinate,
    resolution_tier: usize,
    mut alternates: Vec<CandidateCoordinate>,
) -> ResolvedLocation {
    let point = coordinate.point();

    let country_code = coordinate
        .country_code
        .as_deref()
        .and_then(|code| iso3_for(code).map(str::to_string).or_else(|| {
            (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())).then(|| code.to_string())
        }))
        .or_else(|| country_for_point(&point).map(|c| c.iso3.to_string()))
        .or_else(|| query.hint_country.as_deref().and_then(find_country).map(|c| c.iso3.to_string()))
        .unwrap_or_else(|| UNKNOWN_COUNTRY.to_string());

    let region_name = region_for_point(&point)
        .map(|r| r.name.to_string())
        .or_else(|| query.hint_region.clone())
        .or_else(|| find_country(&country_code).map(|c| c.name.to_string()))
        .unwrap_or_default();

    alternates.truncate(MAX_ALTERNATES);

    ResolvedLocation {
        query: query.clone(),
        coordinate,
        country_code,
        region_name,
        resolution_tier,
        alternates,
    }
}

#[async_trait]
impl LocationResolver for TieredResolver {
    async fn resolve(
        &self,
        query: &LocationQuery,
        min_confidence: f64,
    ) -> Result<ResolvedLocation, PipelineError> {
        let started = Instant::now();
        let no_retry = RetryPolicy::none();
        let mut alternates = Vec::new();

        for (tier, strategy) in self.tiers.iter().enumerate() {
            let threshold = strategy.min_confidence.max(min_confidence);
            let breaker = self.breakers.breaker(strategy.source.id());

            let outcome = call_resilient(&breaker, strategy.timeout, &no_retry, |remaining| {
                strategy.source.fetch_candidates(query, remaining)
            })
            .await;

            let mut candidates = match outcome {
                Ok(candidates) => candidates,
                Err(e) => {
                    debug!(
                        tier,
                        source = %strategy.source.id(),
                        error = %e,
                        "Strategy produced no result"
                    );
                    continue;
                }
            };

            if let Some(index) = select_candidate(&candidates, threshold, query) {
                let winner = candidates.remove(index);
                alternates.extend(candidates);
                info!(
                    query = %query.raw_name,
                    tier,
                    source = %winner.source,
                    confidence = winner.confidence,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Location resolved"
                );
                return Ok(build_resolved(query, winner, tier, alternates));
            }

            debug!(
                tier,
                source = %strategy.source.id(),
                candidates = candidates.len(),
                threshold,
                "No candidate cleared the tier threshold"
            );
            alternates.extend(candidates);
        }

        match self.regional.candidate(query) {
            Some(centroid) => {
                warn!(
                    query = %query.raw_name,
                    tier = self.regional_tier(),
                    confidence = centroid.confidence,
                    "Falling back to regional default"
                );
                Ok(build_resolved(query, centroid, self.regional_tier(), alternates))
            }
            None => Err(PipelineError::ResolutionExhausted {
                query: query.raw_name.clone(),
                reason: format!(
                    "{} strategies gave nothing acceptable and no regional default matches the hints",
                    self.tiers.len()
                ),
            }),
        }
    }
}
