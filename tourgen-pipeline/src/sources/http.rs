//! Shared HTTP plumbing for source adapters

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::types::SourceError;

/// Connect timeout for all adapters; the overall timeout is set per request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the reqwest client shared by one adapter
pub fn build_client() -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .user_agent(tourgen_common::config::get_user_agent())
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| SourceError::NotConfigured(format!("HTTP client: {e}")))
}

/// Send `request` with `timeout` and decode a JSON body
///
/// Returns `Ok(None)` for 404, which every adapter treats as "nothing known".
pub async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<Option<T>, SourceError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SourceError::Parse(e.to_string()))
}
