//! Wikipedia page-summary client (REST `page/summary/{title}`)

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tourgen_common::geo::GeoPoint;

use super::http::{build_client, fetch_json};
use crate::config::SourceEndpoint;
use crate::types::{ExternalFact, FactSource, LanguageCode, SourceError, SourceId};

pub const ATTR_EXTRACT: &str = "extract";
pub const ATTR_URL: &str = "url";

/// Placeholder in the configured base URL replaced with the query language
const LANG_PLACEHOLDER: &str = "{lang}";

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    page_type: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    coordinates: Option<SummaryCoordinates>,
    /// Last edit, RFC 3339
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct SummaryCoordinates {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

pub struct WikipediaSummaryClient {
    id: SourceId,
    client: reqwest::Client,
    base_url: String,
    trust: f64,
}

impl WikipediaSummaryClient {
    pub const SOURCE_ID: &'static str = "wikipedia";

    pub fn new(endpoint: &SourceEndpoint) -> Result<Self, SourceError> {
        Ok(Self {
            id: SourceId::from(Self::SOURCE_ID),
            client: build_client()?,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            trust: endpoint.trust,
        })
    }

    /// Summary URL for `title` in `language`, title percent-encoded as one segment
    fn summary_url(&self, title: &str, language: &LanguageCode) -> Result<Url, SourceError> {
        let base = self.base_url.replace(LANG_PLACEHOLDER, language.as_str());
        let segment = title.trim().replace(' ', "_");
        let mut url = Url::parse(&base)
            .map_err(|e| SourceError::NotConfigured(format!("wikipedia base_url {base:?}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::NotConfigured(format!("wikipedia base_url {base:?} cannot be a base")))?
            .extend(["page", "summary", segment.as_str()]);
        Ok(url)
    }

    fn to_fact(&self, summary: PageSummary) -> Option<ExternalFact> {
        if summary.page_type == "disambiguation" {
            return None;
        }

        let mut fact = ExternalFact::new(self.id.clone(), summary.title, self.trust)
            .with_attribute(ATTR_EXTRACT, summary.extract.unwrap_or_default())
            .with_attribute(ExternalFact::ATTR_DESCRIPTION, summary.description.unwrap_or_default())
            .with_attribute(ExternalFact::ATTR_LAST_MODIFIED, summary.timestamp.unwrap_or_default());

        if let Some(page) = summary.content_urls.and_then(|u| u.desktop) {
            fact = fact.with_attribute(ATTR_URL, page.page);
        }
        if let Some(point) = summary
            .coordinates
            .and_then(|c| GeoPoint::new(c.lat, c.lon).ok())
        {
            fact = fact.with_point(point);
        }
        Some(fact)
    }
}

#[async_trait]
impl FactSource for WikipediaSummaryClient {
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
        let url = self.summary_url(subject, language)?;
        tracing::debug!(source = %self.id, %url, "Fetching page summary");

        let summary = fetch_json::<PageSummary>(self.client.get(url), timeout).await?;
        Ok(summary.and_then(|s| self.to_fact(s)).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> WikipediaSummaryClient {
        WikipediaSummaryClient::new(&SourceEndpoint {
            enabled: true,
            base_url: "https://{lang}.wikipedia.org/api/rest_v1/".to_string(),
            api_key: None,
            trust: 0.7,
        })
        .unwrap()
    }

    #[test]
    fn test_summary_url_encodes_title() {
        let url = client()
            .summary_url("N Seoul Tower", &LanguageCode::parse("en").unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/N_Seoul_Tower"
        );

        let url = client()
            .summary_url("AC/DC", &LanguageCode::parse("en").unwrap())
            .unwrap();
        assert!(url.as_str().ends_with("/page/summary/AC%2FDC"));
    }

    #[test]
    fn test_summary_to_fact() {
        let raw = r#"{
            "type": "standard",
            "title": "Gyeongbokgung",
            "description": "Royal palace in Seoul, South Korea",
            "extract": "Gyeongbokgung is the main royal palace of the Joseon dynasty.",
            "coordinates": {"lat": 37.579617, "lon": 126.977041},
            "timestamp": "2024-05-01T10:00:00Z",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Gyeongbokgung"}}
        }"#;
        let summary: PageSummary = serde_json::from_str(raw).unwrap();
        let fact = client().to_fact(summary).unwrap();

        assert_eq!(fact.subject_name, "Gyeongbokgung");
        assert!(fact.attributes[ATTR_EXTRACT].contains("Joseon"));
        assert!(fact.point().is_some());
        assert!(fact.last_modified().is_some());
        assert_eq!(fact.trust_weight, 0.7);
    }

    #[test]
    fn test_disambiguation_page_is_empty() {
        let raw = r#"{"type": "disambiguation", "title": "Namsan"}"#;
        let summary: PageSummary = serde_json::from_str(raw).unwrap();
        assert!(client().to_fact(summary).is_none());
    }
}
