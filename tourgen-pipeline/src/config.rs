//! Pipeline configuration
//!
//! **Priority:** CLI `--config` → `TOURGEN_CONFIG` → user config dir → compiled defaults.
//! API keys are additionally overridable through environment variables so they
//! never have to live in a file.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tourgen_common::config::{env_non_empty, load_toml, resolve_config_path, CONFIG_ENV_VAR};
use tourgen_common::{Error, Result};
use tracing::{info, warn};

use crate::resilience::{BreakerConfig, RetrySettings};

/// Environment override for the geocoding API key
pub const GEOCODER_KEY_ENV: &str = "TOURGEN_GEOCODER_API_KEY";
/// Environment override for the tourism catalog service key
pub const TOUR_KEY_ENV: &str = "TOURGEN_TOUR_API_KEY";
/// Environment override for the LLM API key
pub const LLM_KEY_ENV: &str = "TOURGEN_LLM_API_KEY";

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub service: ServiceConfig,
    pub resolver: ResolverConfig,
    pub aggregator: AggregatorConfig,
    pub breaker: BreakerConfig,
    pub verifier: VerifierConfig,
    pub planner: PlannerConfig,
    pub orchestrator: OrchestratorConfig,
    pub sources: SourcesConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5730,
            log_level: "info".to_string(),
        }
    }
}

/// Per-tier acceptance thresholds, in resolver order
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub plus_code_threshold: f64,
    pub place_search_threshold: f64,
    pub registry_threshold: f64,
    pub ai_estimate_threshold: f64,
    /// Independent timeout for each strategy
    pub tier_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            plus_code_threshold: 0.85,
            place_search_threshold: 0.75,
            registry_threshold: 0.65,
            ai_estimate_threshold: 0.5,
            tier_timeout_ms: 8000,
        }
    }
}

impl ResolverConfig {
    pub fn tier_timeout(&self) -> Duration {
        Duration::from_millis(self.tier_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Overall aggregation budget
    pub budget_ms: u64,
    /// Authoritative per-source timeout
    pub source_timeout_ms: u64,
    pub retry: RetrySettings,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            budget_ms: 6000,
            source_timeout_ms: 5000,
            retry: RetrySettings::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Facts located further than this from the resolved point are flagged
    pub max_fact_distance_km: f64,
    /// Jaro-Winkler similarity accepted as a subject match
    pub min_subject_similarity: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_fact_distance_km: 25.0,
            min_subject_similarity: 0.85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Title-scoped resolution must reach this confidence to anchor a stop
    pub min_confidence: f64,
    /// Offset spiral step for fallback anchors, metres
    pub offset_step_m: f64,
    /// Walking-plausibility ceiling between consecutive stops
    pub max_walking_km: f64,
    /// Title-scoped results further than this from the base are rejected
    pub max_anchor_distance_km: f64,
    /// Minimum trust for a bundle fact to anchor a stop directly
    pub fact_min_trust: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.85,
            offset_step_m: 25.0,
            max_walking_km: 2.0,
            max_anchor_distance_km: 5.0,
            fact_min_trust: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Overall deadline for one pipeline run
    pub deadline_secs: u64,
    /// Floor passed to the resolver for the base location
    pub min_confidence: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 45,
            min_confidence: 0.0,
        }
    }
}

impl OrchestratorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// One external source endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEndpoint {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Trust weight for fact sources (ignored by coordinate-only sources)
    #[serde(default = "default_trust")]
    pub trust: f64,
}

fn default_true() -> bool {
    true
}

fn default_trust() -> f64 {
    0.5
}

impl SourceEndpoint {
    fn new(base_url: &str, trust: f64) -> Self {
        Self {
            enabled: true,
            base_url: base_url.to_string(),
            api_key: None,
            trust,
        }
    }

    /// API key if configured and non-blank
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub geocoder: SourceEndpoint,
    pub place_search: SourceEndpoint,
    pub wikidata: SourceEndpoint,
    pub wikipedia: SourceEndpoint,
    pub tour_catalog: SourceEndpoint,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            geocoder: SourceEndpoint::new("https://maps.googleapis.com/maps/api/geocode/json", 0.5),
            place_search: SourceEndpoint::new("https://nominatim.openstreetmap.org", 0.5),
            wikidata: SourceEndpoint::new("https://query.wikidata.org/sparql", 0.8),
            wikipedia: SourceEndpoint::new("https://{lang}.wikipedia.org/api/rest_v1", 0.7),
            tour_catalog: SourceEndpoint::new("https://apis.data.go.kr/B551011", 0.9),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root (".../v1")
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// sqlx connection URL, used when `kind = "sqlite"`
    pub sqlite_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            sqlite_url: "sqlite://tourgen.db?mode=rwc".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration following the standard resolution order
    ///
    /// # Arguments
    /// * `cli_path` - Path from `--config`, if given
    ///
    /// # Errors
    /// Returns `Error::Config` if an explicitly named file is missing or invalid, or
    /// if validation fails.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path, CONFIG_ENV_VAR) {
            Some((path, source)) => {
                info!(path = %path.display(), ?source, "Loading configuration file");
                load_toml::<PipelineConfig>(&path)?
            }
            None => {
                info!("No configuration file found, using compiled defaults");
                PipelineConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replace API keys with environment values when set
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_non_empty(GEOCODER_KEY_ENV) {
            if self.sources.geocoder.key().is_some() {
                warn!("Geocoder API key set in both file and environment, using environment");
            }
            self.sources.geocoder.api_key = Some(key);
        }
        if let Some(key) = env_non_empty(TOUR_KEY_ENV) {
            if self.sources.tour_catalog.key().is_some() {
                warn!("Tour catalog key set in both file and environment, using environment");
            }
            self.sources.tour_catalog.api_key = Some(key);
        }
        if let Some(key) = env_non_empty(LLM_KEY_ENV) {
            if self.llm.key().is_some() {
                warn!("LLM API key set in both file and environment, using environment");
            }
            self.llm.api_key = Some(key);
        }
    }

    /// Reject thresholds outside 0.0-1.0 and zero timeouts
    pub fn validate(&self) -> Result<()> {
        let unit_values = [
            ("resolver.plus_code_threshold", self.resolver.plus_code_threshold),
            ("resolver.place_search_threshold", self.resolver.place_search_threshold),
            ("resolver.registry_threshold", self.resolver.registry_threshold),
            ("resolver.ai_estimate_threshold", self.resolver.ai_estimate_threshold),
            ("verifier.min_subject_similarity", self.verifier.min_subject_similarity),
            ("planner.min_confidence", self.planner.min_confidence),
            ("planner.fact_min_trust", self.planner.fact_min_trust),
            ("orchestrator.min_confidence", self.orchestrator.min_confidence),
            ("aggregator.retry.jitter_factor", self.aggregator.retry.jitter_factor),
            ("sources.wikidata.trust", self.sources.wikidata.trust),
            ("sources.wikipedia.trust", self.sources.wikipedia.trust),
            ("sources.tour_catalog.trust", self.sources.tour_catalog.trust),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within 0.0-1.0, got {value}")));
            }
        }

        let durations = [
            ("resolver.tier_timeout_ms", self.resolver.tier_timeout_ms),
            ("aggregator.budget_ms", self.aggregator.budget_ms),
            ("aggregator.source_timeout_ms", self.aggregator.source_timeout_ms),
            ("orchestrator.deadline_secs", self.orchestrator.deadline_secs),
            ("llm.timeout_secs", self.llm.timeout_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.breaker.cool_down.is_zero() {
            return Err(Error::Config("breaker.cool_down must be greater than zero".to_string()));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.success_threshold == 0 {
            return Err(Error::Config("breaker thresholds must be at least 1".to_string()));
        }

        let positive_distances = [
            ("verifier.max_fact_distance_km", self.verifier.max_fact_distance_km),
            ("planner.max_walking_km", self.planner.max_walking_km),
            ("planner.max_anchor_distance_km", self.planner.max_anchor_distance_km),
            ("planner.offset_step_m", self.planner.offset_step_m),
        ];
        for (name, value) in positive_distances {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }

        Ok(())
    }
}
