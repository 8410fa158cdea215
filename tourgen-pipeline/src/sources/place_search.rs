//! Place-text search (resolver tier 1)
//!
//! Nominatim-style `/search` endpoint. The public instance allows one request
//! per second, enforced with a token bucket shared by every caller of this
//! adapter.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use super::http::{build_client, fetch_json};
use crate::config::SourceEndpoint;
use crate::resolver::regions::find_country;
use crate::types::{CandidateCoordinate, CoordinateSource, LocationQuery, SourceError, SourceId};

const MAX_RESULTS: &str = "5";
const BASE_CONFIDENCE: f64 = 0.55;
const IMPORTANCE_WEIGHT: f64 = 0.45;
const MAX_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    address: Option<SearchAddress>,
}

#[derive(Debug, Deserialize)]
struct SearchAddress {
    country_code: Option<String>,
}

/// Map Nominatim `importance` (0.0-1.0, popularity-weighted) to a confidence
fn importance_confidence(importance: Option<f64>) -> f64 {
    let importance = importance.unwrap_or(0.0).clamp(0.0, 1.0);
    (BASE_CONFIDENCE + IMPORTANCE_WEIGHT * importance).min(MAX_CONFIDENCE)
}

pub struct PlaceSearchClient {
    id: SourceId,
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl PlaceSearchClient {
    pub const SOURCE_ID: &'static str = "place-search";

    pub fn new(endpoint: &SourceEndpoint) -> Result<Self, SourceError> {
        Ok(Self {
            id: SourceId::from(Self::SOURCE_ID),
            client: build_client()?,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(NonZeroU32::MIN)),
        })
    }
}

#[async_trait]
impl CoordinateSource for PlaceSearchClient {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        self.rate_limiter.until_ready().await;

        let search_text = match &query.hint_region {
            Some(region) if !query.raw_name.contains(region.as_str()) => {
                format!("{}, {}", query.raw_name, region)
            }
            _ => query.raw_name.clone(),
        };

        let mut params = vec![
            ("q", search_text),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", MAX_RESULTS.to_string()),
            ("accept-language", query.language.to_string()),
        ];
        if let Some(country) = query.hint_country.as_deref().and_then(find_country) {
            params.push(("countrycodes", country.iso2.to_ascii_lowercase()));
        }

        tracing::debug!(source = %self.id, query = %query.raw_name, "Searching places");

        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&params);
        let hits: Vec<SearchHit> = fetch_json(request, timeout).await?.unwrap_or_default();

        hits.into_iter()
            .map(|hit| -> Result<CandidateCoordinate, SourceError> {
                let lat: f64 = hit
                    .lat
                    .parse()
                    .map_err(|_| SourceError::Parse(format!("bad lat {:?}", hit.lat)))?;
                let lng: f64 = hit
                    .lon
                    .parse()
                    .map_err(|_| SourceError::Parse(format!("bad lon {:?}", hit.lon)))?;

                let mut candidate = CandidateCoordinate::new(
                    lat,
                    lng,
                    self.id.clone(),
                    importance_confidence(hit.importance),
                )?
                .with_address(hit.display_name);
                if let Some(code) = hit.address.and_then(|a| a.country_code) {
                    candidate = candidate.with_country(code);
                }
                Ok(candidate)
            })
            .collect()
    }
}
