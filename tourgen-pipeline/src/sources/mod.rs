//! External source adapters
//!
//! Each adapter normalizes one third-party API into `CandidateCoordinate`s
//! and/or `ExternalFact`s. Response shapes stay private to the adapter module.
//!
//! `build_sources` registers the configured adapters in resolver order:
//! plus-code geocoder → place search → registry cross-reference → AI estimate.
//! The regional default is owned by the resolver itself.

pub mod ai_estimate;
mod http;
pub mod olc;
pub mod place_search;
pub mod plus_code;
pub mod registry_xref;
pub mod tour_catalog;
pub mod wikidata;
pub mod wikipedia;

pub use ai_estimate::AiCoordinateEstimator;
pub use place_search::PlaceSearchClient;
pub use plus_code::PlusCodeGeocoder;
pub use registry_xref::RegistryCrossReference;
pub use tour_catalog::TourCatalogClient;
pub use wikidata::WikidataClient;
pub use wikipedia::WikipediaSummaryClient;

use std::sync::Arc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::llm::ChatClient;
use crate::resilience::BreakerRegistry;
use crate::resolver::TierStrategy;
use crate::types::{CoordinateSource, FactSource, SourceError};

/// Adapters registered at startup
pub struct SourceSet {
    /// Coordinate strategies in resolution order (regional default excluded)
    pub tiers: Vec<TierStrategy>,
    pub facts: Vec<Arc<dyn FactSource>>,
}

/// Build every enabled adapter from configuration
///
/// Adapters that need credentials are only registered when a key is present,
/// so an unconfigured source never counts as "queried but failed".
///
/// # Errors
/// Returns `SourceError::NotConfigured` if an HTTP client cannot be built.
pub fn build_sources(
    config: &PipelineConfig,
    breakers: &Arc<BreakerRegistry>,
) -> Result<SourceSet, SourceError> {
    let sources = &config.sources;
    let thresholds = &config.resolver;
    let tier_timeout = thresholds.tier_timeout();

    let mut tiers = Vec::new();
    let mut facts: Vec<Arc<dyn FactSource>> = Vec::new();
    let mut registries: Vec<Arc<dyn CoordinateSource>> = Vec::new();

    if sources.geocoder.enabled {
        tiers.push(TierStrategy::new(
            Arc::new(PlusCodeGeocoder::new(&sources.geocoder)?),
            thresholds.plus_code_threshold,
            tier_timeout,
        ));
    }

    if sources.place_search.enabled {
        tiers.push(TierStrategy::new(
            Arc::new(PlaceSearchClient::new(&sources.place_search)?),
            thresholds.place_search_threshold,
            tier_timeout,
        ));
    }

    if sources.wikidata.enabled {
        let wikidata = Arc::new(WikidataClient::new(&sources.wikidata)?);
        registries.push(wikidata.clone());
        facts.push(wikidata);
    }

    if sources.wikipedia.enabled {
        facts.push(Arc::new(WikipediaSummaryClient::new(&sources.wikipedia)?));
    }

    if sources.tour_catalog.enabled {
        if sources.tour_catalog.key().is_some() {
            let catalog = Arc::new(TourCatalogClient::new(&sources.tour_catalog)?);
            registries.push(catalog.clone());
            facts.push(catalog);
        } else {
            info!("Tour catalog has no service key, not registered");
        }
    }

    if !registries.is_empty() {
        tiers.push(TierStrategy::new(
            Arc::new(RegistryCrossReference::new(registries, Arc::clone(breakers))),
            thresholds.registry_threshold,
            tier_timeout,
        ));
    }

    let chat = ChatClient::new(&config.llm)?;
    if chat.is_configured() {
        tiers.push(TierStrategy::new(
            Arc::new(AiCoordinateEstimator::new(chat)),
            thresholds.ai_estimate_threshold,
            tier_timeout,
        ));
    } else {
        info!("No LLM API key, AI coordinate estimate tier disabled");
    }

    for fact_source in &facts {
        breakers.register(fact_source.id().clone(), config.breaker.clone());
    }
    for tier in &tiers {
        breakers.register(tier.source.id().clone(), config.breaker.clone());
    }

    info!(
        tiers = tiers.len(),
        fact_sources = facts.len(),
        "Source adapters registered"
    );

    Ok(SourceSet { tiers, facts })
}
