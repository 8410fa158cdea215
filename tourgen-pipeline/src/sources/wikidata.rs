//! Wikidata SPARQL client
//!
//! Exact label match in the query language, with optional coordinate (P625),
//! inception (P571), heritage designation (P1435) and country (P17 → P298).
//! Serves both as a fact source and as a coordinate registry for the
//! cross-reference tier.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tourgen_common::geo::GeoPoint;

use super::http::{build_client, fetch_json};
use crate::config::SourceEndpoint;
use crate::types::{
    CandidateCoordinate, CoordinateSource, ExternalFact, FactSource, LanguageCode, LocationQuery,
    SourceError, SourceId,
};

/// Confidence of a registry coordinate on its own (before cross-agreement)
const COORDINATE_CONFIDENCE: f64 = 0.8;
const RESULT_LIMIT: usize = 10;
const REQUESTS_PER_SECOND: u32 = 5;

pub const ATTR_WIKIDATA_ID: &str = "wikidata_id";
pub const ATTR_INCEPTION: &str = "inception";
pub const ATTR_HERITAGE: &str = "heritage_designation";
pub const ATTR_COUNTRY: &str = "country";

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

/// Escape a label for use inside a SPARQL string literal
fn escape_literal(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .flat_map(|c| match c {
            '\\' => vec!['\\', '\\'],
            '"' => vec!['\\', '"'],
            other => vec![other],
        })
        .collect()
}

fn build_query(label: &str, language: &LanguageCode) -> String {
    let lang = language.as_str();
    format!(
        r#"SELECT ?item ?itemLabel ?itemDescription ?coord ?inception ?heritageLabel ?countryIso WHERE {{
  ?item rdfs:label "{label}"@{lang} .
  OPTIONAL {{ ?item wdt:P625 ?coord . }}
  OPTIONAL {{ ?item wdt:P571 ?inception . }}
  OPTIONAL {{ ?item wdt:P1435 ?heritage . }}
  OPTIONAL {{ ?item wdt:P17 ?country . ?country wdt:P298 ?countryIso . }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "{lang},en" . }}
}} LIMIT {RESULT_LIMIT}"#,
        label = escape_literal(label),
    )
}

/// Parse a WKT `Point(lng lat)` literal
fn parse_wkt_point(wkt: &str) -> Option<GeoPoint> {
    let inner = wkt.trim().strip_prefix("Point(")?.strip_suffix(')')?;
    let mut parts = inner.split_whitespace();
    let lng: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    GeoPoint::new(lat, lng).ok()
}

/// Item id ("Q41567") from an entity URI
fn entity_id(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

pub struct WikidataClient {
    id: SourceId,
    client: reqwest::Client,
    endpoint: String,
    trust: f64,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl WikidataClient {
    pub const SOURCE_ID: &'static str = "wikidata";

    pub fn new(endpoint: &SourceEndpoint) -> Result<Self, SourceError> {
        let quota = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            id: SourceId::from(Self::SOURCE_ID),
            client: build_client()?,
            endpoint: endpoint.base_url.clone(),
            trust: endpoint.trust,
            rate_limiter: RateLimiter::direct(Quota::per_second(quota)),
        })
    }

    /// Run the label query and fold bindings into one fact per item
    async fn query_items(
        &self,
        label: &str,
        language: &LanguageCode,
        timeout: Duration,
    ) -> Result<Vec<ExternalFact>, SourceError> {
        self.rate_limiter.until_ready().await;

        let request = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .query(&[("query", build_query(label, language)), ("format", "json".to_string())]);

        let Some(response) = fetch_json::<SparqlResponse>(request, timeout).await? else {
            return Ok(Vec::new());
        };

        Ok(self.fold_bindings(label, response.results.bindings))
    }

    fn fold_bindings(
        &self,
        label: &str,
        bindings: Vec<HashMap<String, SparqlValue>>,
    ) -> Vec<ExternalFact> {
        // Several bindings per item when it has several heritage designations;
        // the first value per attribute wins.
        let mut order: Vec<String> = Vec::new();
        let mut facts: HashMap<String, ExternalFact> = HashMap::new();

        for binding in bindings {
            let Some(item) = binding.get("item") else {
                continue;
            };
            let qid = entity_id(&item.value).to_string();
            let subject = binding
                .get("itemLabel")
                .map(|v| v.value.clone())
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| label.to_string());

            let fact = facts.entry(qid.clone()).or_insert_with(|| {
                order.push(qid.clone());
                ExternalFact::new(self.id.clone(), subject, self.trust)
                    .with_attribute(ATTR_WIKIDATA_ID, qid.clone())
                    .with_attribute("url", format!("https://www.wikidata.org/wiki/{qid}"))
            });

            let mut add = |key: &str, value: Option<String>| {
                if let Some(value) = value {
                    if !fact.attributes.contains_key(key) && !value.trim().is_empty() {
                        fact.attributes.insert(key.to_string(), value);
                    }
                }
            };

            let get = |name: &str| binding.get(name).map(|v| v.value.clone());
            add(ExternalFact::ATTR_DESCRIPTION, get("itemDescription"));
            add(
                ATTR_INCEPTION,
                get("inception").map(|d| d.split('T').next().unwrap_or(&d).to_string()),
            );
            add(ATTR_HERITAGE, get("heritageLabel"));
            add(ATTR_COUNTRY, get("countryIso"));
            if let Some(point) = get("coord").as_deref().and_then(parse_wkt_point) {
                add(ExternalFact::ATTR_LAT, Some(point.lat.to_string()));
                add(ExternalFact::ATTR_LNG, Some(point.lng.to_string()));
            }
        }

        order.into_iter().filter_map(|qid| facts.remove(&qid)).collect()
    }
}

#[async_trait]
impl FactSource for WikidataClient {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn trust_weight(&self) -> f64 {
        self.trust
    }

    async fn fetch_facts(
        &self,
        subject: &str,
        language: &LanguageCode,
        timeout: Duration,
    ) -> Result<Vec<ExternalFact>, SourceError> {
        self.query_items(subject, language, timeout).await
    }
}

#[async_trait]
impl CoordinateSource for WikidataClient {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        let facts = self.query_items(&query.raw_name, &query.language, timeout).await?;

        let mut candidates = Vec::new();
        for fact in facts {
            let Some(point) = fact.point() else {
                continue;
            };
            let mut candidate =
                CandidateCoordinate::new(point.lat, point.lng, self.id.clone(), COORDINATE_CONFIDENCE)?
                    .with_address(fact.subject_name.clone());
            if let Some(country) = fact.attributes.get(ATTR_COUNTRY) {
                candidate = candidate.with_country(country.clone());
            }
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}
