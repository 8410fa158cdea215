//! OpenAI-compatible chat completion client
//!
//! Shared by the AI coordinate estimator and the narrative generator. Both ask
//! for a single JSON object (`response_format = json_object`) and parse the
//! first choice's content themselves.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::types::SourceError;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Minimal chat-completions client
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl ChatClient {
    /// Build a client from `[llm]` configuration
    ///
    /// # Errors
    /// Returns `SourceError::NotConfigured` if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(tourgen_common::config::get_user_agent())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SourceError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.key().map(str::to_string),
            model: config.model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send one system + user exchange and return the raw JSON text of the reply
    ///
    /// # Errors
    /// - `NotConfigured` without an API key
    /// - `Status` / `Network` / `Timeout` for transport failures
    /// - `Parse` when the reply has no content
    pub async fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SourceError::NotConfigured("llm.api_key".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat { kind: "json_object" },
        };

        tracing::debug!(model = %self.model, prompt_chars = user_prompt.len(), "Requesting chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("chat completion body: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SourceError::Parse("chat completion had no content".to_string()))
    }
}

/// Strip a Markdown code fence some models wrap around JSON replies
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
