//! Plus-Code geocoder (resolver tier 0)
//!
//! Decodes an Open Location Code embedded in the query offline. Short codes are
//! recovered against the centroid of whatever region the rest of the query (or
//! its hints) names. Queries without a code go to a Google-style geocoding
//! endpoint, whose `location_type` sets the confidence.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tourgen_common::geo::GeoPoint;
use tracing::debug;

use super::http::{build_client, fetch_json};
use super::olc;
use crate::config::SourceEndpoint;
use crate::resolver::regions::{find_country, RegionalDefault};
use crate::types::{CandidateCoordinate, CoordinateSource, LocationQuery, SourceError, SourceId};

/// Confidence of a full code decoded offline
const FULL_CODE_CONFIDENCE: f64 = 0.95;
/// Confidence of a short code recovered against a region centroid
const RECOVERED_CODE_CONFIDENCE: f64 = 0.9;
const MAX_RESULTS: usize = 5;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    formatted_address: String,
    geometry: Option<Geometry>,
    plus_code: Option<PlusCode>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
    #[serde(default)]
    location_type: String,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct PlusCode {
    global_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressComponent {
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

/// Confidence for a geocoder `location_type`
fn location_type_confidence(location_type: &str) -> f64 {
    match location_type {
        "ROOFTOP" => 0.95,
        "RANGE_INTERPOLATED" => 0.9,
        "GEOMETRIC_CENTER" => 0.85,
        "APPROXIMATE" => 0.6,
        _ => 0.5,
    }
}

pub struct PlusCodeGeocoder {
    id: SourceId,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    regional: RegionalDefault,
}

impl PlusCodeGeocoder {
    pub const SOURCE_ID: &'static str = "plus-code";

    pub fn new(endpoint: &SourceEndpoint) -> Result<Self, SourceError> {
        Ok(Self {
            id: SourceId::from(Self::SOURCE_ID),
            client: build_client()?,
            base_url: endpoint.base_url.clone(),
            api_key: endpoint.key().map(str::to_string),
            regional: RegionalDefault::new(),
        })
    }

    /// Decode a code found in the query text without any network call
    fn decode_offline(&self, query: &LocationQuery) -> Option<CandidateCoordinate> {
        let code = olc::find_code(&query.raw_name)?;

        let (point, confidence) = if olc::is_full(code) {
            (olc::decode(code)?.center(), FULL_CODE_CONFIDENCE)
        } else {
            let reference = self.reference_point(query, code)?;
            (olc::recover_nearest(code, reference)?, RECOVERED_CODE_CONFIDENCE)
        };

        debug!(code, lat = point.lat, lng = point.lng, "Decoded plus code offline");
        CandidateCoordinate::new(point.lat, point.lng, self.id.clone(), confidence)
            .ok()
            .map(|c| c.with_address(code.to_ascii_uppercase()))
    }

    /// Centroid of the locality named next to a short code (or in the hints)
    fn reference_point(&self, query: &LocationQuery, code: &str) -> Option<GeoPoint> {
        let locality = query
            .raw_name
            .replace(code, " ")
            .trim_matches(|c: char| c.is_whitespace() || c == ',')
            .to_string();
        let mut scoped = query.clone();
        scoped.raw_name = locality;
        self.regional.candidate(&scoped).map(|c| c.point())
    }

    async fn geocode(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("sources.geocoder.api_key".to_string()))?;

        let mut params = vec![
            ("address", query.raw_name.clone()),
            ("language", query.language.to_string()),
            ("key", api_key.to_string()),
        ];
        if let Some(country) = query.hint_country.as_deref().and_then(find_country) {
            params.push(("region", country.iso2.to_ascii_lowercase()));
        }

        let request = self.client.get(&self.base_url).query(&params);
        let Some(response) = fetch_json::<GeocodeResponse>(request, timeout).await? else {
            return Ok(Vec::new());
        };

        match response.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Ok(Vec::new()),
            "OVER_QUERY_LIMIT" => return Err(SourceError::Status(429)),
            "REQUEST_DENIED" => {
                return Err(SourceError::NotConfigured("geocoder rejected the API key".to_string()))
            }
            "UNKNOWN_ERROR" => return Err(SourceError::Status(503)),
            other => return Err(SourceError::Parse(format!("geocoder status {other}"))),
        }

        let mut candidates = Vec::new();
        for result in response.results.into_iter().take(MAX_RESULTS) {
            let (point, confidence) = match (&result.geometry, &result.plus_code) {
                (Some(g), _) => (
                    GeoPoint { lat: g.location.lat, lng: g.location.lng },
                    location_type_confidence(&g.location_type),
                ),
                (None, Some(PlusCode { global_code: Some(code) })) => match olc::decode(code) {
                    Some(area) => (area.center(), location_type_confidence("GEOMETRIC_CENTER")),
                    None => continue,
                },
                _ => continue,
            };

            let mut candidate = CandidateCoordinate::new(point.lat, point.lng, self.id.clone(), confidence)?
                .with_address(result.formatted_address);
            if let Some(country) = result
                .address_components
                .iter()
                .find(|c| c.types.iter().any(|t| t == "country"))
            {
                candidate = candidate.with_country(country.short_name.clone());
            }
            candidates.push(candidate);
        }

        Ok(candidates)
    }
}

#[async_trait]
impl CoordinateSource for PlusCodeGeocoder {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        if let Some(candidate) = self.decode_offline(query) {
            return Ok(vec![candidate]);
        }
        self.geocode(query, timeout).await
    }
}
