//! HTTP API handlers
//!
//! Thin JSON surface over the pipeline: health, resolution, fact aggregation,
//! full guide runs, stored guide lookup and breaker diagnostics.

pub mod breakers;
pub mod facts;
pub mod guide;
pub mod health;
pub mod resolve;

pub use breakers::breaker_routes;
pub use facts::fact_routes;
pub use guide::guide_routes;
pub use health::health_routes;
pub use resolve::resolve_routes;

use serde::Deserialize;

use crate::error::ApiError;
use crate::types::{LanguageCode, LocationQuery};

/// Location fields shared by every pipeline request
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub hint_region: Option<String>,
    #[serde(default)]
    pub hint_country: Option<String>,
}

impl LocationRequest {
    /// Validate into a `LocationQuery`
    ///
    /// # Errors
    /// `ApiError::BadRequest` for a blank name or an invalid language code.
    pub fn into_query(self) -> Result<LocationQuery, ApiError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("name must not be empty".to_string()));
        }
        let language = LanguageCode::parse(&self.language).map_err(|e| ApiError::BadRequest(e.to_string()))?;

        let mut query = LocationQuery::new(name, language);
        if let Some(region) = self.hint_region.filter(|r| !r.trim().is_empty()) {
            query = query.with_region(region.trim());
        }
        if let Some(country) = self.hint_country.filter(|c| !c.trim().is_empty()) {
            query = query.with_country(country.trim());
        }
        Ok(query)
    }
}
