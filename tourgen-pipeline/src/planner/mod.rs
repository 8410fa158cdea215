//! Chapter planner
//!
//! Anchors every narrative stop to a coordinate, exactly once, without ever
//! reordering stops.
//!
//! **Per stop:**
//! 1. Extract a sub-place qualifier from the title (see `qualifier`)
//! 2. With a qualifier: a trusted bundle fact about that sub-place carrying a
//!    point is used directly
//! 3. Otherwise a title-scoped resolution of `"<base> <qualifier>"` is accepted
//!    at or above `min_confidence` and within `max_anchor_distance_km` of the base
//! 4. Otherwise the base coordinate plus a deterministic spiral offset; a stop that
//!    named a sub-place gets a `LowConfidenceAnchor` warning
//!
//! Consecutive stops further apart than `max_walking_km` are flagged, never rejected.
//! With a deadline, title-scoped resolution is cut off when it passes and every
//! later stop goes straight to step 4.

pub mod qualifier;

pub use qualifier::extract_qualifier;

use std::sync::Arc;
use tokio::time::Instant;
use tourgen_common::geo::GeoPoint;
use tourgen_common::text::{name_tokens, normalize_name};
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::resolver::LocationResolver;
use crate::types::{
    CandidateCoordinate, ExternalFact, FactBundle, GuideStop, LocationQuery, ResolvedLocation, SourceError,
    SourceId, StopWarning,
};

/// Fallback anchors carry this share of the base confidence
const OFFSET_CONFIDENCE_FACTOR: f64 = 0.5;

pub struct ChapterPlanner {
    resolver: Arc<dyn LocationResolver>,
    config: PlannerConfig,
}

impl ChapterPlanner {
    pub fn new(resolver: Arc<dyn LocationResolver>, config: PlannerConfig) -> Self {
        Self { resolver, config }
    }

    /// Anchor `stops` around `base` using only title-scoped resolution
    pub async fn anchor(&self, stops: Vec<GuideStop>, base: &ResolvedLocation) -> Vec<GuideStop> {
        self.anchor_with_facts(stops, base, None).await
    }

    /// Anchor `stops` around `base`, consulting `facts` before any network call
    pub async fn anchor_with_facts(
        &self,
        stops: Vec<GuideStop>,
        base: &ResolvedLocation,
        facts: Option<&FactBundle>,
    ) -> Vec<GuideStop> {
        self.anchor_stops(stops, base, facts, None).await
    }

    /// Like `anchor_with_facts`, but no title-scoped resolution runs past `deadline`
    pub async fn anchor_until(
        &self,
        stops: Vec<GuideStop>,
        base: &ResolvedLocation,
        facts: Option<&FactBundle>,
        deadline: Instant,
    ) -> Vec<GuideStop> {
        self.anchor_stops(stops, base, facts, Some(deadline)).await
    }

    async fn anchor_stops(
        &self,
        stops: Vec<GuideStop>,
        base: &ResolvedLocation,
        facts: Option<&FactBundle>,
        deadline: Option<Instant>,
    ) -> Vec<GuideStop> {
        let mut anchored = Vec::with_capacity(stops.len());

        for (position, mut stop) in stops.into_iter().enumerate() {
            stop.coordinate = None;
            let qualifier = extract_qualifier(&stop.title, base.name());

            let coordinate = match &qualifier {
                Some(q) => match self.anchor_from_facts(q, base, facts) {
                    Some(c) => Some(c),
                    None => self.resolve_before(q, base, deadline).await,
                },
                None => None,
            };

            let coordinate = match coordinate {
                Some(c) => c,
                None => {
                    if let Some(q) = qualifier {
                        debug!(stop = stop.index, qualifier = %q, "Sub-place not anchored, using offset");
                        stop.warnings.push(StopWarning::LowConfidenceAnchor { qualifier: q });
                    }
                    self.offset_anchor(base, position)
                }
            };

            stop.coordinate = Some(coordinate);
            anchored.push(stop);
        }

        self.flag_implausible_walks(&mut anchored);

        info!(
            location = base.name(),
            stops = anchored.len(),
            fallbacks = anchored
                .iter()
                .filter(|s| s.coordinate.as_ref().is_some_and(|c| c.source.as_str() == SourceId::OFFSET_FALLBACK))
                .count(),
            "Stops anchored"
        );
        anchored
    }

    fn anchor_from_facts(
        &self,
        qualifier: &str,
        base: &ResolvedLocation,
        facts: Option<&FactBundle>,
    ) -> Option<CandidateCoordinate> {
        let wanted = normalize_name(qualifier);
        let (fact, point) = facts?
            .facts
            .iter()
            .filter(|f| f.trust_weight >= self.config.fact_min_trust)
            .filter(|f| subject_names(f, &wanted))
            .find_map(|f| {
                let point = f.point()?;
                self.near_base(&point, base).then_some((f, point))
            })?;

        debug!(qualifier, source = %fact.source_id, subject = %fact.subject_name, "Stop anchored from fact");
        CandidateCoordinate::new(point.lat, point.lng, fact.source_id.clone(), fact.trust_weight)
            .ok()
            .map(|c| c.with_address(fact.subject_name.clone()))
    }

    async fn resolve_before(
        &self,
        qualifier: &str,
        base: &ResolvedLocation,
        deadline: Option<Instant>,
    ) -> Option<CandidateCoordinate> {
        let Some(deadline) = deadline else {
            return self.anchor_by_resolution(qualifier, base).await;
        };
        if Instant::now() >= deadline {
            debug!(qualifier, "Run deadline passed, skipping title-scoped resolution");
            return None;
        }
        match tokio::time::timeout_at(deadline, self.anchor_by_resolution(qualifier, base)).await {
            Ok(found) => found,
            Err(_) => {
                warn!(qualifier, "Title-scoped resolution cut off by the run deadline");
                None
            }
        }
    }

    async fn anchor_by_resolution(&self, qualifier: &str, base: &ResolvedLocation) -> Option<CandidateCoordinate> {
        let mut query = LocationQuery::new(format!("{} {}", base.name(), qualifier), base.query.language.clone())
            .with_country(base.country_code.clone());
        if !base.region_name.is_empty() {
            query = query.with_region(base.region_name.clone());
        }

        match self.resolver.resolve(&query, self.config.min_confidence).await {
            Ok(found) if found.coordinate.confidence < self.config.min_confidence => {
                debug!(query = %query.raw_name, confidence = found.coordinate.confidence, "Title-scoped result below threshold");
                None
            }
            Ok(found) if !self.near_base(&found.point(), base) => {
                warn!(
                    query = %query.raw_name,
                    distance_km = found.point().distance_km(&base.point()),
                    "Title-scoped result too far from base, ignoring"
                );
                None
            }
            Ok(found) => Some(found.coordinate),
            Err(e) => {
                debug!(query = %query.raw_name, error = %e, "Title-scoped resolution failed");
                None
            }
        }
    }

    fn near_base(&self, point: &GeoPoint, base: &ResolvedLocation) -> bool {
        point.distance_km(&base.point()) <= self.config.max_anchor_distance_km
    }

    fn offset_anchor(&self, base: &ResolvedLocation, position: usize) -> CandidateCoordinate {
        let point = base.point().spiral_offset(position + 1, self.config.offset_step_m);
        let confidence = base.coordinate.confidence * OFFSET_CONFIDENCE_FACTOR;
        CandidateCoordinate::new(point.lat, point.lng, SourceId::from(SourceId::OFFSET_FALLBACK), confidence)
            .unwrap_or_else(|_: SourceError| CandidateCoordinate {
                source: SourceId::from(SourceId::OFFSET_FALLBACK),
                confidence,
                ..base.coordinate.clone()
            })
    }

    fn flag_implausible_walks(&self, stops: &mut [GuideStop]) {
        for i in 1..stops.len() {
            let (Some(prev), Some(curr)) = (&stops[i - 1].coordinate, &stops[i].coordinate) else {
                continue;
            };
            let distance_km = prev.point().distance_km(&curr.point());
            if distance_km > self.config.max_walking_km {
                let from_index = stops[i - 1].index;
                warn!(from_index, to_index = stops[i].index, distance_km, "Implausible walk between stops");
                stops[i].warnings.push(StopWarning::ImplausibleWalk { from_index, distance_km });
            }
        }
    }
}

/// Fact subject names the sub-place (and is not just the base place)
///
/// Names match when one ends with the other on whole tokens: "Gwanghwamun Gate"
/// names "gate" but "Gwanghwamun Square" does not name "gwanghwamun". Names
/// without word spacing compare by character suffix, which keeps "경복궁근정전" for
/// "근정전" and rejects "광화문광장" for "광화문".
fn subject_names(fact: &ExternalFact, wanted: &str) -> bool {
    let subject = name_tokens(&fact.subject_name);
    let wanted = name_tokens(wanted);
    if subject.is_empty() || wanted.is_empty() {
        return false;
    }
    if subject.ends_with(&wanted) || wanted.ends_with(&subject) {
        return true;
    }
    match (subject.as_slice(), wanted.as_slice()) {
        ([s], [w]) if !s.is_ascii() || !w.is_ascii() => s.ends_with(w.as_str()) || w.ends_with(s.as_str()),
        _ => false,
    }
}
