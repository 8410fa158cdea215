//! Pipeline orchestrator
//!
//! resolve → aggregate → verify → generate → anchor → persist.
//!
//! One overall deadline bounds the run. Aggregation gets whatever is left of it
//! (capped by the configured budget) and the run continues with a partial bundle
//! when it expires. Title-scoped anchoring stops at the deadline and leaves the
//! remaining stops on offset anchors. Only resolution exhaustion ends a run; a
//! failed narrative yields a result without stops.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::FactAggregator;
use crate::config::{OrchestratorConfig, PipelineConfig, StoreKind};
use crate::error::PipelineError;
use crate::events::{EventSink, PipelineEvent, Stage};
use crate::llm::ChatClient;
use crate::narrative::{LlmNarrativeGenerator, NarrativeContext, NarrativeError, NarrativeGenerator};
use crate::planner::ChapterPlanner;
use crate::resilience::{BreakerRegistry, RetryPolicy};
use crate::resolver::{LocationResolver, TieredResolver};
use crate::sources::build_sources;
use crate::store::{GuideKey, GuideStore, MemoryGuideStore, SqliteGuideStore, StoredGuide};
use crate::types::{FactBundle, GuideStop, LocationQuery, ResolvedLocation};
use crate::verifier::{FactVerifier, VerificationReport, VerificationStatus};

/// Output of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct GuideResult {
    pub run_id: Uuid,
    pub resolved_location: ResolvedLocation,
    pub fact_bundle: FactBundle,
    pub verification: VerificationReport,
    pub stops: Vec<GuideStop>,
    /// Run-level degradation notes (partial aggregation, regional fallback, ...)
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

pub struct PipelineOrchestrator {
    resolver: Arc<dyn LocationResolver>,
    aggregator: Arc<FactAggregator>,
    verifier: FactVerifier,
    narrator: Arc<dyn NarrativeGenerator>,
    planner: ChapterPlanner,
    store: Option<Arc<dyn GuideStore>>,
    events: EventSink,
    config: OrchestratorConfig,
    aggregation_budget: Duration,
    /// Tier index of the regional default, if known
    regional_tier: Option<usize>,
}

impl PipelineOrchestrator {
    pub fn new(
        resolver: Arc<dyn LocationResolver>,
        aggregator: Arc<FactAggregator>,
        verifier: FactVerifier,
        narrator: Arc<dyn NarrativeGenerator>,
        planner: ChapterPlanner,
        config: OrchestratorConfig,
        aggregation_budget: Duration,
    ) -> Self {
        Self {
            resolver,
            aggregator,
            verifier,
            narrator,
            planner,
            store: None,
            events: EventSink::disabled(),
            config,
            aggregation_budget,
            regional_tier: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn GuideStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_regional_tier(mut self, tier: usize) -> Self {
        self.regional_tier = Some(tier);
        self
    }

    pub fn resolver(&self) -> &Arc<dyn LocationResolver> {
        &self.resolver
    }

    pub fn aggregator(&self) -> &Arc<FactAggregator> {
        &self.aggregator
    }

    pub fn store(&self) -> Option<&Arc<dyn GuideStore>> {
        self.store.as_ref()
    }

    pub fn aggregation_budget(&self) -> Duration {
        self.aggregation_budget
    }

    pub fn min_confidence(&self) -> f64 {
        self.config.min_confidence
    }

    fn stage_started(&self, run_id: Uuid, stage: Stage) -> Instant {
        self.events.emit(PipelineEvent::StageStarted { run_id, stage });
        Instant::now()
    }

    fn stage_completed(&self, run_id: Uuid, stage: Stage, started: Instant) {
        self.events.emit(PipelineEvent::StageCompleted {
            run_id,
            stage,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn note(&self, run_id: Uuid, warnings: &mut Vec<String>, message: String) {
        warn!(%run_id, "{}", message);
        self.events.emit(PipelineEvent::Warning {
            run_id,
            message: message.clone(),
        });
        warnings.push(message);
    }

    /// Run the full pipeline for `query`
    ///
    /// # Errors
    /// `PipelineError::ResolutionExhausted` when not even the regional default applies
    pub async fn run(&self, query: LocationQuery) -> Result<GuideResult, PipelineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + self.config.deadline();
        let mut warnings = Vec::new();

        info!(%run_id, query = %query.raw_name, language = %query.language, "Pipeline run started");

        // Resolve
        let stage = self.stage_started(run_id, Stage::Resolve);
        let resolved = match self.resolver.resolve(&query, self.config.min_confidence).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.note(run_id, &mut warnings, e.to_string());
                return Err(e);
            }
        };
        self.stage_completed(run_id, Stage::Resolve, stage);

        if self.regional_tier == Some(resolved.resolution_tier) {
            self.note(
                run_id,
                &mut warnings,
                format!(
                    "Location resolved to the {} regional centroid (confidence {:.2})",
                    resolved.region_name, resolved.coordinate.confidence
                ),
            );
        }

        // Aggregate
        let stage = self.stage_started(run_id, Stage::Aggregate);
        let budget = self
            .aggregation_budget
            .min(deadline.saturating_duration_since(Instant::now()));
        let report = self
            .aggregator
            .aggregate_detailed(resolved.name(), &query.language, budget)
            .await;
        for source in &report.sources {
            self.events.emit(PipelineEvent::SourceOutcome {
                run_id,
                source: source.source.clone(),
                status: source.status.clone(),
                elapsed_ms: source.elapsed_ms,
            });
        }
        let bundle = report.bundle;
        self.stage_completed(run_id, Stage::Aggregate, stage);

        if bundle.is_partial() {
            self.note(
                run_id,
                &mut warnings,
                format!(
                    "Partial fact bundle: {} of {} sources answered",
                    bundle.sources_succeeded.len() + bundle.sources_empty.len(),
                    bundle.sources_queried.len()
                ),
            );
        }

        // Verify
        let stage = self.stage_started(run_id, Stage::Verify);
        let verification = self.verifier.verify(&resolved, &bundle);
        self.stage_completed(run_id, Stage::Verify, stage);

        if verification.status != VerificationStatus::Pass {
            self.note(
                run_id,
                &mut warnings,
                format!(
                    "Fact verification {:?}: {} of {} facts flagged",
                    verification.status, verification.flagged_facts, verification.checked_facts
                ),
            );
        }

        // Generate
        let stage = self.stage_started(run_id, Stage::Generate);
        let context = NarrativeContext {
            resolved_location: resolved.clone(),
            fact_bundle: bundle.clone(),
            verification: verification.clone(),
            language: query.language.clone(),
        };
        let (stops, failure) = match tokio::time::timeout_at(deadline, self.narrator.generate(&context)).await {
            Ok(Ok(generated)) => {
                let stops = drop_empty_narratives(generated);
                let failure = stops.is_empty().then(|| NarrativeError::Empty.to_string());
                (stops, failure)
            }
            Ok(Err(e)) => (Vec::new(), Some(e.to_string())),
            Err(_) => (Vec::new(), Some("narrative generation ran past the run deadline".to_string())),
        };
        if let Some(reason) = failure {
            self.note(run_id, &mut warnings, format!("Guide has no stops: {reason}"));
        }
        self.stage_completed(run_id, Stage::Generate, stage);

        // Anchor
        let stage = self.stage_started(run_id, Stage::Anchor);
        let stops = self
            .planner
            .anchor_until(stops, &resolved, Some(&bundle), deadline)
            .await;
        self.stage_completed(run_id, Stage::Anchor, stage);

        if Instant::now() >= deadline {
            self.note(
                run_id,
                &mut warnings,
                format!(
                    "Run deadline of {}s reached; unresolved sub-places use offset anchors",
                    self.config.deadline_secs
                ),
            );
        }

        if let Some(store) = self.store.as_ref().filter(|_| !stops.is_empty()) {
            let key = GuideKey::for_location(&resolved);
            let stored = StoredGuide {
                run_id,
                resolved_location: resolved.clone(),
                stops: stops.clone(),
                created_at: chrono::Utc::now(),
            };
            if let Err(e) = store.save(&key, &stored).await {
                self.note(run_id, &mut warnings, format!("Guide not persisted: {e}"));
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            %run_id,
            tier = resolved.resolution_tier,
            confidence = resolved.coordinate.confidence,
            facts = bundle.facts.len(),
            stops = stops.len(),
            elapsed_ms,
            "Pipeline run complete"
        );

        Ok(GuideResult {
            run_id,
            resolved_location: resolved,
            fact_bundle: bundle,
            verification,
            stops,
            warnings,
            elapsed_ms,
        })
    }
}

/// Drop stops without narrative text, keeping original indices and order
pub fn drop_empty_narratives(stops: Vec<GuideStop>) -> Vec<GuideStop> {
    stops
        .into_iter()
        .filter(|s| !s.narrative_text.trim().is_empty())
        .collect()
}

/// Wire the production pipeline from configuration
///
/// # Errors
/// Returns an error if an adapter cannot be built or the SQLite store cannot be opened.
pub async fn build_pipeline(
    config: &PipelineConfig,
    breakers: Arc<BreakerRegistry>,
) -> anyhow::Result<PipelineOrchestrator> {
    let sources = build_sources(config, &breakers)?;

    let tiered = TieredResolver::new(sources.tiers, Arc::clone(&breakers));
    let regional_tier = tiered.regional_tier();
    let resolver: Arc<dyn LocationResolver> = Arc::new(tiered);

    let aggregator = Arc::new(FactAggregator::new(
        sources.facts,
        Arc::clone(&breakers),
        config.aggregator.source_timeout(),
        RetryPolicy::from(&config.aggregator.retry),
    ));

    let narrator = Arc::new(LlmNarrativeGenerator::new(ChatClient::new(&config.llm)?, config.llm.timeout()));

    let store: Arc<dyn GuideStore> = match config.store.kind {
        StoreKind::Memory => Arc::new(MemoryGuideStore::new()),
        StoreKind::Sqlite => Arc::new(SqliteGuideStore::connect(&config.store.sqlite_url).await?),
    };

    Ok(PipelineOrchestrator::new(
        Arc::clone(&resolver),
        aggregator,
        FactVerifier::new(config.verifier.clone()),
        narrator,
        ChapterPlanner::new(resolver, config.planner.clone()),
        config.orchestrator.clone(),
        config.aggregator.budget(),
    )
    .with_store(store)
    .with_regional_tier(regional_tier))
}
