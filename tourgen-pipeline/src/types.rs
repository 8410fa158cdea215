//! Core Types and Trait Definitions for the location pipeline
//!
//! Defines the shared data model and the two source capability traits:
//! - **CoordinateSource:** produces `CandidateCoordinate`s for the tiered resolver
//! - **FactSource:** produces `ExternalFact`s for the fact aggregator
//!
//! Source-specific response shapes never leave the adapter modules; everything
//! past the adapter boundary speaks these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tourgen_common::geo::{is_valid_coordinate, GeoPoint};

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identifier of an external source adapter (also the circuit breaker key)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Coordinates produced by the chapter planner's offset fallback
    pub const OFFSET_FALLBACK: &'static str = "offset-fallback";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Primary language subtag ("ko", "en", "fr", ...)
///
/// Region subtags are dropped on parse: "ko-KR" and "ko" are the same language
/// for every source this pipeline talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn parse(raw: &str) -> Result<Self, InvalidLanguage> {
        let primary = raw
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        if (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(primary))
        } else {
            Err(InvalidLanguage(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = InvalidLanguage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LanguageCode> for String {
    fn from(value: LanguageCode) -> Self {
        value.0
    }
}

/// Language code that is not a 2-3 letter primary subtag
#[derive(Debug, Clone, Error)]
#[error("invalid language code: {0:?}")]
pub struct InvalidLanguage(pub String);

// ============================================================================
// Data Model
// ============================================================================

/// Immutable input to a resolution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationQuery {
    pub raw_name: String,
    pub language: LanguageCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_country: Option<String>,
}

impl LocationQuery {
    pub fn new(raw_name: impl Into<String>, language: LanguageCode) -> Self {
        Self {
            raw_name: raw_name.into(),
            language,
            hint_region: None,
            hint_country: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.hint_country = Some(country.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.hint_region = Some(region.into());
        self
    }
}

/// Coordinate produced by one coordinate strategy; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCoordinate {
    pub lat: f64,
    pub lng: f64,
    pub source: SourceId,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    /// ISO 3166-1 country code reported by the source (alpha-2 or alpha-3), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
}

impl CandidateCoordinate {
    /// Create a candidate, clamping confidence to 0.0-1.0
    ///
    /// Returns `SourceError::Parse` for coordinates outside the valid ranges so
    /// adapters can `?` straight out of response normalization.
    pub fn new(
        lat: f64,
        lng: f64,
        source: SourceId,
        confidence: f64,
    ) -> Result<Self, SourceError> {
        if !is_valid_coordinate(lat, lng) {
            return Err(SourceError::Parse(format!(
                "{source} returned out-of-range coordinate ({lat}, {lng})"
            )));
        }
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(Self {
            lat,
            lng,
            source,
            confidence,
            formatted_address: None,
            country_code: None,
        })
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        if !address.trim().is_empty() {
            self.formatted_address = Some(address);
        }
        self
    }

    pub fn with_country(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into().to_ascii_uppercase());
        self
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Winning candidate plus the tier that accepted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    /// The query this location was resolved from
    pub query: LocationQuery,
    pub coordinate: CandidateCoordinate,
    /// ISO 3166-1 alpha-3
    pub country_code: String,
    pub region_name: String,
    /// Zero-based index of the strategy that produced `coordinate`
    pub resolution_tier: usize,
    /// Runner-up candidates, kept for audit/debugging
    pub alternates: Vec<CandidateCoordinate>,
}

impl ResolvedLocation {
    pub fn name(&self) -> &str {
        &self.query.raw_name
    }

    pub fn point(&self) -> GeoPoint {
        self.coordinate.point()
    }
}

/// One fact record per external hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalFact {
    pub source_id: SourceId,
    pub subject_name: String,
    pub attributes: BTreeMap<String, String>,
    pub retrieved_at: DateTime<Utc>,
    pub trust_weight: f64,
}

impl ExternalFact {
    /// Well-known attribute keys shared by all adapters
    pub const ATTR_LAT: &'static str = "lat";
    pub const ATTR_LNG: &'static str = "lng";
    pub const ATTR_DESCRIPTION: &'static str = "description";
    pub const ATTR_LAST_MODIFIED: &'static str = "last_modified";

    pub fn new(source_id: SourceId, subject_name: impl Into<String>, trust_weight: f64) -> Self {
        Self {
            source_id,
            subject_name: subject_name.into(),
            attributes: BTreeMap::new(),
            retrieved_at: Utc::now(),
            trust_weight: trust_weight.clamp(0.0, 1.0),
        }
    }

    /// Insert an attribute, skipping blank values
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.attributes.insert(key.to_string(), value);
        }
        self
    }

    pub fn with_point(self, point: GeoPoint) -> Self {
        self.with_attribute(Self::ATTR_LAT, point.lat.to_string())
            .with_attribute(Self::ATTR_LNG, point.lng.to_string())
    }

    /// Coordinate carried in the `lat`/`lng` attributes, if present and valid
    pub fn point(&self) -> Option<GeoPoint> {
        let lat = self.attributes.get(Self::ATTR_LAT)?.parse::<f64>().ok()?;
        let lng = self.attributes.get(Self::ATTR_LNG)?.parse::<f64>().ok()?;
        GeoPoint::new(lat, lng).ok()
    }

    /// `last_modified` attribute parsed as RFC 3339
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        let raw = self.attributes.get(Self::ATTR_LAST_MODIFIED)?;
        DateTime::parse_from_rfc3339(raw).ok().map(|d| d.with_timezone(&Utc))
    }
}

/// Aggregation output; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactBundle {
    pub facts: Vec<ExternalFact>,
    pub composite_confidence: f64,
    pub sources_queried: Vec<SourceId>,
    pub sources_succeeded: Vec<SourceId>,
    /// Sources that answered but had nothing about the subject
    #[serde(default)]
    pub sources_empty: Vec<SourceId>,
}

impl FactBundle {
    /// Bundle for a round where no source could be consulted
    pub fn empty(sources_queried: Vec<SourceId>) -> Self {
        Self {
            facts: Vec::new(),
            composite_confidence: 0.0,
            sources_queried,
            sources_succeeded: Vec::new(),
            sources_empty: Vec::new(),
        }
    }

    /// True when at least one queried source did not answer in time or failed
    pub fn is_partial(&self) -> bool {
        self.sources_succeeded.len() + self.sources_empty.len() < self.sources_queried.len()
    }

    pub fn facts_from<'a>(&'a self, source: &'a SourceId) -> impl Iterator<Item = &'a ExternalFact> + 'a {
        self.facts.iter().filter(move |f| &f.source_id == source)
    }
}

/// Per-stop warning surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopWarning {
    /// A sub-place was named but could not be anchored confidently; offset fallback used
    LowConfidenceAnchor { qualifier: String },
    /// Walking distance from the previous stop exceeds the configured ceiling
    ImplausibleWalk { from_index: usize, distance_km: f64 },
}

/// Narrative chapter stop
///
/// Created by the narrative generator (usually coordinate-less) and anchored
/// exactly once by the chapter planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideStop {
    pub index: usize,
    pub title: String,
    pub narrative_text: String,
    pub coordinate: Option<CandidateCoordinate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<StopWarning>,
}

impl GuideStop {
    pub fn new(index: usize, title: impl Into<String>, narrative_text: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            narrative_text: narrative_text.into(),
            coordinate: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_anchored(&self) -> bool {
        self.coordinate.is_some()
    }
}

// ============================================================================
// Source Capability Traits
// ============================================================================

/// Coordinate-producing source adapter (one tier of the resolver)
///
/// Candidates are returned in the source's own relevance order; the resolver
/// trusts that order for tie-breaks.
#[async_trait::async_trait]
pub trait CoordinateSource: Send + Sync {
    /// Adapter id for provenance and breaker keying
    fn id(&self) -> &SourceId;

    /// Fetch candidates for `query`, finishing within `timeout`
    ///
    /// # Errors
    /// Returns `SourceError` on transport, status, or parse failures.
    /// An empty vec means the source answered with nothing.
    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError>;
}

/// Fact-producing source adapter (heritage registry, tourism catalog, knowledge graph)
#[async_trait::async_trait]
pub trait FactSource: Send + Sync {
    /// Adapter id for provenance and breaker keying
    fn id(&self) -> &SourceId;

    /// Trust weight of this source (0.0-1.0), used for composite confidence
    fn trust_weight(&self) -> f64;

    /// Fetch facts about `subject`, finishing within `timeout`
    ///
    /// # Errors
    /// Returns `SourceError` on transport, status, or parse failures.
    async fn fetch_facts(
        &self,
        subject: &str,
        language: &LanguageCode,
        timeout: Duration,
    ) -> Result<Vec<ExternalFact>, SourceError>;
}

/// Source adapter error
///
/// Never surfaced to pipeline callers; the breaker and aggregator absorb it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Transport-level failure (connect, TLS, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Response could not be normalized
    #[error("Parse error: {0}")]
    Parse(String),

    /// Call exceeded its own timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Breaker is OPEN (or HALF_OPEN with its trial in flight); no call attempted
    #[error("Circuit open for source {0}")]
    CircuitOpen(SourceId),

    /// Adapter lacks credentials or endpoint configuration
    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

impl SourceError {
    /// Whether this outcome counts against the source's breaker
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Status(_) | Self::Parse(_) | Self::Timeout(_)
        )
    }

    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status(code) => *code == 429 || (500..=599).contains(code),
            _ => false,
        }
    }

    /// Map a reqwest transport error
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_code_parsing() {
        assert_eq!(LanguageCode::parse("ko").unwrap().as_str(), "ko");
        assert_eq!(LanguageCode::parse("ko-KR").unwrap().as_str(), "ko");
        assert_eq!(LanguageCode::parse(" EN_us ").unwrap().as_str(), "en");
        assert!(LanguageCode::parse("").is_err());
        assert!(LanguageCode::parse("korean").is_err());
        assert!(LanguageCode::parse("k1").is_err());
    }

    #[test]
    fn test_language_code_serde() {
        let lang: LanguageCode = serde_json::from_str("\"fr-FR\"").unwrap();
        assert_eq!(lang.as_str(), "fr");
        assert!(serde_json::from_str::<LanguageCode>("\"???\"").is_err());
    }

    #[test]
    fn test_candidate_confidence_clamping() {
        let c = CandidateCoordinate::new(37.0, 127.0, SourceId::from("test"), 1.5).unwrap();
        assert_eq!(c.confidence, 1.0, "Confidence should be clamped to 1.0");

        let c = CandidateCoordinate::new(37.0, 127.0, SourceId::from("test"), -0.5).unwrap();
        assert_eq!(c.confidence, 0.0, "Confidence should be clamped to 0.0");

        let c = CandidateCoordinate::new(37.0, 127.0, SourceId::from("test"), f64::NAN).unwrap();
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_candidate_rejects_invalid_coordinate() {
        let err = CandidateCoordinate::new(95.0, 0.0, SourceId::from("test"), 0.9).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_fact_point_attributes() {
        let fact = ExternalFact::new(SourceId::from("wikidata"), "경복궁", 0.8)
            .with_point(GeoPoint { lat: 37.5796, lng: 126.977 })
            .with_attribute("description", "   ");

        let p = fact.point().unwrap();
        assert!((p.lat - 37.5796).abs() < 1e-9);
        assert!(!fact.attributes.contains_key("description"), "blank values skipped");

        let no_point = ExternalFact::new(SourceId::from("x"), "y", 0.5).with_attribute("lat", "abc");
        assert!(no_point.point().is_none());
    }

    #[test]
    fn test_source_error_classification() {
        assert!(SourceError::Timeout(Duration::from_secs(1)).counts_as_failure());
        assert!(!SourceError::CircuitOpen(SourceId::from("a")).counts_as_failure());
        assert!(!SourceError::NotConfigured("key".into()).counts_as_failure());

        assert!(SourceError::Status(503).is_retryable());
        assert!(SourceError::Status(429).is_retryable());
        assert!(!SourceError::Status(400).is_retryable());
        assert!(!SourceError::Parse("bad".into()).is_retryable());
    }

    #[test]
    fn test_bundle_partial_detection() {
        let a = SourceId::from("a");
        let b = SourceId::from("b");
        let mut bundle = FactBundle::empty(vec![a.clone(), b.clone()]);
        assert!(bundle.is_partial());

        bundle.sources_succeeded.push(a);
        bundle.sources_empty.push(b);
        assert!(!bundle.is_partial());
    }
}
