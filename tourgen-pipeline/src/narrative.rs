//! Narrative generator boundary
//!
//! The generator receives the resolved location and the fact bundle (plus the
//! verification report) and returns coordinate-less `GuideStop`s. Anchoring is
//! the chapter planner's job; any coordinate a generator attaches is discarded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::llm::{strip_code_fence, ChatClient};
use crate::types::{FactBundle, GuideStop, LanguageCode, ResolvedLocation, SourceError};
use crate::verifier::VerificationReport;

/// Stops requested from the model
pub const MIN_STOPS: usize = 3;
pub const MAX_STOPS: usize = 8;

/// Everything a generator may use to write the guide
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeContext {
    pub resolved_location: ResolvedLocation,
    pub fact_bundle: FactBundle,
    pub verification: VerificationReport,
    pub language: LanguageCode,
}

#[derive(Debug, Error)]
pub enum NarrativeError {
    /// Generator answered but produced no usable stop
    #[error("Narrative generator returned no usable stops")]
    Empty,

    #[error("Narrative generator unavailable: {0}")]
    Upstream(#[from] SourceError),

    #[error("Narrative reply could not be parsed: {0}")]
    Parse(String),
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Produce ordered stops for the context's location
    ///
    /// # Errors
    /// Returns `NarrativeError` when the generator fails or its reply is unusable.
    async fn generate(&self, context: &NarrativeContext) -> Result<Vec<GuideStop>, NarrativeError>;
}

const SYSTEM_PROMPT: &str = "You write audio tour guides. Reply with one JSON object only, \
shaped {\"stops\":[{\"title\":string,\"narrative\":string}]}. Produce between 3 and 8 stops \
in walking order, written in the requested language. Use only the facts provided; \
if a detail is not in the facts, leave it out. Do not include coordinates.";

#[derive(Debug, Deserialize)]
struct NarrativeReply {
    #[serde(default)]
    stops: Vec<ReplyStop>,
}

#[derive(Debug, Deserialize)]
struct ReplyStop {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "narrative_text", alias = "text")]
    narrative: String,
}

/// Narrative generator backed by an OpenAI-compatible chat endpoint
pub struct LlmNarrativeGenerator {
    chat: ChatClient,
    timeout: Duration,
}

impl LlmNarrativeGenerator {
    pub fn new(chat: ChatClient, timeout: Duration) -> Self {
        Self { chat, timeout }
    }

    fn user_prompt(context: &NarrativeContext) -> Result<String, NarrativeError> {
        let payload = serde_json::to_string(context)
            .map_err(|e| NarrativeError::Parse(format!("context serialization: {e}")))?;
        Ok(format!(
            "Language: {}\nLocation: {} ({}, {})\nWrite {}-{} stops.\nContext JSON:\n{}",
            context.language,
            context.resolved_location.name(),
            context.resolved_location.region_name,
            context.resolved_location.country_code,
            MIN_STOPS,
            MAX_STOPS,
            payload
        ))
    }
}

/// Turn a model reply into ordered, coordinate-less stops
///
/// Stops beyond `MAX_STOPS` are dropped; stops with an empty title fall back to
/// a numbered title. Empty narratives are kept here and filtered by the orchestrator
/// so stop indices stay aligned with the reply.
pub fn parse_reply(raw: &str) -> Result<Vec<GuideStop>, NarrativeError> {
    let reply: NarrativeReply = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| NarrativeError::Parse(e.to_string()))?;

    let stops: Vec<GuideStop> = reply
        .stops
        .into_iter()
        .take(MAX_STOPS)
        .enumerate()
        .map(|(index, stop)| {
            let title = match stop.title.trim() {
                "" => format!("Stop {}", index + 1),
                t => t.to_string(),
            };
            GuideStop::new(index, title, stop.narrative.trim())
        })
        .collect();

    if stops.is_empty() {
        return Err(NarrativeError::Empty);
    }
    Ok(stops)
}

#[async_trait]
impl NarrativeGenerator for LlmNarrativeGenerator {
    async fn generate(&self, context: &NarrativeContext) -> Result<Vec<GuideStop>, NarrativeError> {
        let prompt = Self::user_prompt(context)?;
        let raw = self.chat.complete_json(SYSTEM_PROMPT, &prompt, self.timeout).await?;
        let stops = parse_reply(&raw)?;

        if stops.len() < MIN_STOPS {
            tracing::warn!(
                location = context.resolved_location.name(),
                stops = stops.len(),
                "Narrative generator returned fewer stops than requested"
            );
        }
        Ok(stops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_orders_and_indexes() {
        let stops = parse_reply(
            r#"{"stops":[
                {"title":"Gwanghwamun","narrative":"The main gate."},
                {"title":"Geunjeongjeon","narrative":"The throne hall."},
                {"title":"","narrative":"  A pond pavilion.  "}
            ]}"#,
        )
        .unwrap();

        assert_eq!(stops.len(), 3);
        assert_eq!(stops[1].index, 1);
        assert_eq!(stops[1].title, "Geunjeongjeon");
        assert_eq!(stops[2].title, "Stop 3");
        assert_eq!(stops[2].narrative_text, "A pond pavilion.");
        assert!(stops.iter().all(|s| s.coordinate.is_none()));
    }

    #[test]
    fn test_parse_reply_caps_stop_count() {
        let many: Vec<String> = (0..12)
            .map(|i| format!(r#"{{"title":"s{i}","narrative":"n"}}"#))
            .collect();
        let raw = format!(r#"{{"stops":[{}]}}"#, many.join(","));
        assert_eq!(parse_reply(&raw).unwrap().len(), MAX_STOPS);
    }

    #[test]
    fn test_parse_reply_errors() {
        assert!(matches!(parse_reply(r#"{"stops":[]}"#), Err(NarrativeError::Empty)));
        assert!(matches!(parse_reply("not json"), Err(NarrativeError::Parse(_))));
    }

    #[test]
    fn test_parse_reply_accepts_fenced_json() {
        let stops = parse_reply("```json\n{\"stops\":[{\"title\":\"a\",\"text\":\"b\"}]}\n```").unwrap();
        assert_eq!(stops[0].narrative_text, "b");
    }
}
