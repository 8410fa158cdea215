//! Tourism-board catalog client (KTO TourAPI keyword search)
//!
//! One service per language (KorService1, EngService1, ...). Map points come as
//! `mapx` (longitude) / `mapy` (latitude) strings. An empty result set arrives
//! as `"items": ""` rather than an empty object.

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tourgen_common::geo::GeoPoint;
use tourgen_common::text::normalize_name;

use super::http::{build_client, fetch_json};
use crate::config::SourceEndpoint;
use crate::types::{
    CandidateCoordinate, CoordinateSource, ExternalFact, FactSource, LanguageCode, LocationQuery,
    SourceError, SourceId,
};

pub const ATTR_ADDRESS: &str = "address";
pub const ATTR_CATEGORY: &str = "category";
pub const ATTR_TEL: &str = "tel";
pub const ATTR_OVERVIEW: &str = "overview";
pub const ATTR_CONTENT_ID: &str = "content_id";

const EXACT_TITLE_CONFIDENCE: f64 = 0.8;
const PARTIAL_TITLE_CONFIDENCE: f64 = 0.65;
const ROWS: &str = "10";
/// The catalog only covers Korea
const CATALOG_COUNTRY: &str = "KOR";
/// Catalog timestamps are Korea Standard Time
const KST_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Deserialize)]
struct Envelope {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    header: ResponseHeader,
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct ResponseHeader {
    #[serde(rename = "resultCode")]
    result_code: String,
    #[serde(rename = "resultMsg", default)]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct Body {
    items: Items,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Items {
    Present { item: OneOrMany },
    Empty(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<CatalogItem>),
    One(CatalogItem),
}

#[derive(Debug, Deserialize)]
struct CatalogItem {
    title: String,
    #[serde(default)]
    contentid: String,
    #[serde(default)]
    contenttypeid: String,
    #[serde(default)]
    addr1: String,
    #[serde(default)]
    addr2: String,
    #[serde(default)]
    mapx: String,
    #[serde(default)]
    mapy: String,
    #[serde(default)]
    tel: String,
    #[serde(default)]
    modifiedtime: String,
    #[serde(default)]
    overview: String,
}

impl Items {
    fn into_vec(self) -> Vec<CatalogItem> {
        match self {
            Items::Present { item: OneOrMany::Many(items) } => items,
            Items::Present { item: OneOrMany::One(item) } => vec![item],
            Items::Empty(_) => Vec::new(),
        }
    }
}

/// Service path for a language; unsupported languages use the English catalog
fn service_for(language: &LanguageCode) -> &'static str {
    match language.as_str() {
        "ko" => "KorService1",
        "ja" => "JpnService1",
        "zh" => "ChsService1",
        "de" => "GerService1",
        "fr" => "FreService1",
        "es" => "SpnService1",
        "ru" => "RusService1",
        _ => "EngService1",
    }
}

/// Content type id → category (Korean and foreign-language catalogs use different ids)
fn category_for(content_type_id: &str) -> Option<&'static str> {
    Some(match content_type_id {
        "12" | "76" => "tourist_attraction",
        "14" | "78" => "cultural_facility",
        "15" | "85" => "festival",
        "25" => "travel_course",
        "28" | "75" => "leisure",
        "32" | "80" => "accommodation",
        "38" | "79" => "shopping",
        "39" | "82" => "restaurant",
        _ => return None,
    })
}

/// `YYYYMMDDHHMMSS` in KST → RFC 3339 UTC
fn parse_modified_time(raw: &str) -> Option<String> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S").ok()?;
    let kst = FixedOffset::east_opt(KST_OFFSET_SECS)?;
    let local = kst.from_local_datetime(&naive).single()?;
    Some(local.with_timezone(&Utc).to_rfc3339())
}

fn item_point(item: &CatalogItem) -> Option<GeoPoint> {
    let lng: f64 = item.mapx.trim().parse().ok()?;
    let lat: f64 = item.mapy.trim().parse().ok()?;
    // Unlocated entries come back as 0/0
    if lat == 0.0 && lng == 0.0 {
        return None;
    }
    GeoPoint::new(lat, lng).ok()
}

pub struct TourCatalogClient {
    id: SourceId,
    client: reqwest::Client,
    base_url: String,
    service_key: Option<String>,
    trust: f64,
}

impl TourCatalogClient {
    pub const SOURCE_ID: &'static str = "tour-catalog";

    pub fn new(endpoint: &SourceEndpoint) -> Result<Self, SourceError> {
        Ok(Self {
            id: SourceId::from(Self::SOURCE_ID),
            client: build_client()?,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            service_key: endpoint.key().map(str::to_string),
            trust: endpoint.trust,
        })
    }

    fn service_key(&self) -> Result<&str, SourceError> {
        self.service_key
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("sources.tour_catalog.api_key".to_string()))
    }

    async fn call(
        &self,
        language: &LanguageCode,
        operation: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Vec<CatalogItem>, SourceError> {
        let url = format!("{}/{}/{}", self.base_url, service_for(language), operation);
        let request = self
            .client
            .get(url)
            .query(&[
                ("serviceKey", self.service_key()?),
                ("MobileOS", "ETC"),
                ("MobileApp", "TourGen"),
                ("_type", "json"),
            ])
            .query(params);

        let Some(envelope) = fetch_json::<Envelope>(request, timeout).await? else {
            return Ok(Vec::new());
        };

        let header = envelope.response.header;
        match header.result_code.as_str() {
            "0000" => {}
            "22" => return Err(SourceError::Status(429)),
            "30" | "31" => return Err(SourceError::NotConfigured(header.result_msg)),
            code => {
                return Err(SourceError::Parse(format!(
                    "catalog result {code}: {}",
                    header.result_msg
                )))
            }
        }

        Ok(envelope
            .response
            .body
            .map(|b| b.items.into_vec())
            .unwrap_or_default())
    }

    async fn search(
        &self,
        keyword: &str,
        language: &LanguageCode,
        timeout: Duration,
    ) -> Result<Vec<CatalogItem>, SourceError> {
        self.call(
            language,
            "searchKeyword1",
            &[
                ("keyword", keyword),
                ("numOfRows", ROWS),
                ("pageNo", "1"),
                ("arrange", "A"),
                ("listYN", "Y"),
            ],
            timeout,
        )
        .await
    }

    /// Overview text for one entry; failures only lose the overview
    async fn overview(&self, content_id: &str, language: &LanguageCode, timeout: Duration) -> Option<String> {
        let params = [
            ("contentId", content_id),
            ("defaultYN", "Y"),
            ("overviewYN", "Y"),
        ];
        match self.call(language, "detailCommon1", &params, timeout).await {
            Ok(items) => items.into_iter().next().map(|i| i.overview),
            Err(e) => {
                tracing::debug!(source = %self.id, content_id, error = %e, "Overview lookup failed");
                None
            }
        }
    }

    fn to_fact(&self, item: CatalogItem) -> ExternalFact {
        let address = format!("{} {}", item.addr1.trim(), item.addr2.trim());
        let mut fact = ExternalFact::new(self.id.clone(), item.title.trim(), self.trust)
            .with_attribute(ATTR_CONTENT_ID, item.contentid.clone())
            .with_attribute(ATTR_ADDRESS, address.trim())
            .with_attribute(ATTR_TEL, item.tel.clone())
            .with_attribute(ATTR_OVERVIEW, item.overview.clone());
        if let Some(category) = category_for(&item.contenttypeid) {
            fact = fact.with_attribute(ATTR_CATEGORY, category);
        }
        if let Some(modified) = parse_modified_time(&item.modifiedtime) {
            fact = fact.with_attribute(ExternalFact::ATTR_LAST_MODIFIED, modified);
        }
        if let Some(point) = item_point(&item) {
            fact = fact.with_point(point);
        }
        fact
    }
}

#[async_trait]
impl FactSource for TourCatalogClient {
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
        let deadline = Instant::now() + timeout;
        let mut items = self.search(subject, language, timeout).await?;

        // Enrich the exact-title match with its overview if time allows
        let wanted = normalize_name(subject);
        if let Some(item) = items.iter_mut().find(|i| normalize_name(&i.title) == wanted) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() && !item.contentid.is_empty() {
                if let Some(overview) = self.overview(&item.contentid, language, remaining).await {
                    item.overview = overview;
                }
            }
        }

        Ok(items.into_iter().map(|i| self.to_fact(i)).collect())
    }
}

#[async_trait]
impl CoordinateSource for TourCatalogClient {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        let wanted = normalize_name(&query.raw_name);
        let items = self.search(&query.raw_name, &query.language, timeout).await?;

        let mut candidates = Vec::new();
        for item in items {
            let Some(point) = item_point(&item) else {
                continue;
            };
            let confidence = if normalize_name(&item.title) == wanted {
                EXACT_TITLE_CONFIDENCE
            } else {
                PARTIAL_TITLE_CONFIDENCE
            };
            let address = format!("{} {}", item.addr1.trim(), item.addr2.trim());
            candidates.push(
                CandidateCoordinate::new(point.lat, point.lng, self.id.clone(), confidence)?
                    .with_address(address.trim())
                    .with_country(CATALOG_COUNTRY),
            );
        }

        // Exact title matches first, catalog order otherwise
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(key: Option<&str>) -> TourCatalogClient {
        TourCatalogClient::new(&SourceEndpoint {
            enabled: true,
            base_url: "http://127.0.0.1:9/B551011".to_string(),
            api_key: key.map(str::to_string),
            trust: 0.9,
        })
        .unwrap()
    }

    #[test]
    fn test_service_for_language() {
        assert_eq!(service_for(&LanguageCode::parse("ko").unwrap()), "KorService1");
        assert_eq!(service_for(&LanguageCode::parse("ja").unwrap()), "JpnService1");
        assert_eq!(service_for(&LanguageCode::parse("vi").unwrap()), "EngService1");
    }

    #[test]
    fn test_parse_list_response() {
        let raw = r#"{"response": {
            "header": {"resultCode": "0000", "resultMsg": "OK"},
            "body": {"items": {"item": [{
                "title": "경복궁", "contentid": "126508", "contenttypeid": "12",
                "addr1": "서울특별시 종로구 사직로 161", "addr2": "",
                "mapx": "126.9767375783", "mapy": "37.5760836609",
                "tel": "", "modifiedtime": "20240110093000"
            }]}, "numOfRows": 10, "pageNo": 1, "totalCount": 1}
        }}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        let items = envelope.response.body.unwrap().items.into_vec();
        assert_eq!(items.len(), 1);

        let fact = client(Some("k")).to_fact(items.into_iter().next().unwrap());
        assert_eq!(fact.subject_name, "경복궁");
        assert_eq!(fact.attributes[ATTR_CATEGORY], "tourist_attraction");
        assert_eq!(fact.attributes[ATTR_ADDRESS], "서울특별시 종로구 사직로 161");
        assert!(!fact.attributes.contains_key(ATTR_TEL));
        let p = fact.point().unwrap();
        assert!((p.lat - 37.5760836609).abs() < 1e-9);
        assert_eq!(
            fact.attributes[ExternalFact::ATTR_LAST_MODIFIED],
            "2024-01-10T00:30:00+00:00"
        );
    }

    #[test]
    fn test_parse_empty_and_single_item() {
        let empty = r#"{"response": {"header": {"resultCode": "0000"}, "body": {"items": ""}}}"#;
        let envelope: Envelope = serde_json::from_str(empty).unwrap();
        assert!(envelope.response.body.unwrap().items.into_vec().is_empty());

        let single = r#"{"response": {"header": {"resultCode": "0000"}, "body": {"items": {"item": {"title": "남산서울타워", "mapx": "126.988", "mapy": "37.5512"}}}}}"#;
        let envelope: Envelope = serde_json::from_str(single).unwrap();
        assert_eq!(envelope.response.body.unwrap().items.into_vec().len(), 1);
    }

    #[test]
    fn test_unlocated_item_has_no_point() {
        let item: CatalogItem =
            serde_json::from_str(r#"{"title": "x", "mapx": "0", "mapy": "0"}"#).unwrap();
        assert!(item_point(&item).is_none());
    }

    #[tokio::test]
    async fn test_missing_service_key() {
        let err = client(None)
            .fetch_facts("경복궁", &LanguageCode::parse("ko").unwrap(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotConfigured(_)));
    }
}
