//! AI-estimated coordinate (resolver tier 3)
//!
//! Asks the chat model for a coordinate as strict JSON. The model's own
//! confidence is capped so this tier can never outrank a real geocoder.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::llm::{strip_code_fence, ChatClient};
use crate::types::{CandidateCoordinate, CoordinateSource, LocationQuery, SourceError, SourceId};

/// Ceiling on the confidence of a model-estimated coordinate
pub const MAX_AI_CONFIDENCE: f64 = 0.6;

const SYSTEM_PROMPT: &str = "You estimate the geographic coordinates of named places. \
Reply with exactly one JSON object and nothing else: \
{\"lat\": number|null, \"lng\": number|null, \"country\": \"ISO 3166-1 alpha-3 code\"|null, \"confidence\": number}. \
confidence is your probability (0 to 1) that the point lies within 200 metres of the place. \
If you do not know the place, reply with null lat and lng and confidence 0.";

#[derive(Debug, Deserialize)]
struct Estimate {
    lat: Option<f64>,
    lng: Option<f64>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn user_prompt(query: &LocationQuery) -> String {
    let mut prompt = format!("Place: {}\nLanguage: {}", query.raw_name, query.language);
    if let Some(region) = &query.hint_region {
        prompt.push_str(&format!("\nRegion: {region}"));
    }
    if let Some(country) = &query.hint_country {
        prompt.push_str(&format!("\nCountry: {country}"));
    }
    prompt
}

pub struct AiCoordinateEstimator {
    id: SourceId,
    chat: ChatClient,
}

impl AiCoordinateEstimator {
    pub const SOURCE_ID: &'static str = "ai-estimate";

    pub fn new(chat: ChatClient) -> Self {
        Self {
            id: SourceId::from(Self::SOURCE_ID),
            chat,
        }
    }

    fn parse_reply(&self, reply: &str) -> Result<Vec<CandidateCoordinate>, SourceError> {
        let estimate: Estimate = serde_json::from_str(strip_code_fence(reply))
            .map_err(|e| SourceError::Parse(format!("coordinate estimate: {e}")))?;

        let (Some(lat), Some(lng)) = (estimate.lat, estimate.lng) else {
            return Ok(Vec::new());
        };
        let confidence = estimate.confidence.unwrap_or(0.0).min(MAX_AI_CONFIDENCE);
        if confidence <= 0.0 {
            return Ok(Vec::new());
        }

        let mut candidate = CandidateCoordinate::new(lat, lng, self.id.clone(), confidence)?;
        if let Some(country) = estimate.country.filter(|c| !c.trim().is_empty()) {
            candidate = candidate.with_country(country.trim());
        }
        Ok(vec![candidate])
    }
}

#[async_trait]
impl CoordinateSource for AiCoordinateEstimator {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        let reply = self
            .chat
            .complete_json(SYSTEM_PROMPT, &user_prompt(query), timeout)
            .await?;
        self.parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::types::LanguageCode;

    fn estimator() -> AiCoordinateEstimator {
        AiCoordinateEstimator::new(ChatClient::new(&LlmConfig::default()).unwrap())
    }

    #[test]
    fn test_confidence_is_capped() {
        let out = estimator()
            .parse_reply(r#"{"lat": 37.5796, "lng": 126.977, "country": "kor", "confidence": 0.97}"#)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].confidence, MAX_AI_CONFIDENCE);
        assert_eq!(out[0].country_code.as_deref(), Some("KOR"));
    }

    #[test]
    fn test_unknown_place_is_empty() {
        let out = estimator()
            .parse_reply(r#"{"lat": null, "lng": null, "country": null, "confidence": 0}"#)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_reply_is_parse_error() {
        assert!(matches!(
            estimator().parse_reply("I think it is in Seoul"),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(
            estimator().parse_reply(r#"{"lat": 137.0, "lng": 10.0, "confidence": 0.5}"#),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_user_prompt_includes_hints() {
        let q = LocationQuery::new("Mont Saint-Michel", LanguageCode::parse("fr").unwrap())
            .with_country("FRA");
        let prompt = user_prompt(&q);
        assert!(prompt.contains("Place: Mont Saint-Michel"));
        assert!(prompt.contains("Country: FRA"));
        assert!(!prompt.contains("Region:"));
    }
}
