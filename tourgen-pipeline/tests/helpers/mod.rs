//! Test Helper Utilities
//!
//! Scripted source adapters and narrative generators plus a builder wiring them
//! into a real orchestrator, so integration tests exercise the production
//! resolver, aggregator, verifier and planner without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tourgen_pipeline::aggregator::FactAggregator;
use tourgen_pipeline::config::{OrchestratorConfig, PlannerConfig, VerifierConfig};
use tourgen_pipeline::narrative::{NarrativeContext, NarrativeError, NarrativeGenerator};
use tourgen_pipeline::orchestrator::PipelineOrchestrator;
use tourgen_pipeline::planner::ChapterPlanner;
use tourgen_pipeline::resilience::{BreakerConfig, BreakerRegistry, RetryPolicy};
use tourgen_pipeline::resolver::{LocationResolver, TierStrategy, TieredResolver};
use tourgen_pipeline::store::MemoryGuideStore;
use tourgen_pipeline::types::{
    CandidateCoordinate, CoordinateSource, ExternalFact, FactSource, GuideStop, LanguageCode, LocationQuery,
    SourceError, SourceId,
};

/// Tier thresholds by position, mirroring the default resolver configuration
pub const TIER_THRESHOLDS: [f64; 4] = [0.85, 0.75, 0.65, 0.5];

pub fn lang(code: &str) -> LanguageCode {
    LanguageCode::parse(code).expect("valid language code")
}

type Responder = Box<dyn Fn(&LocationQuery) -> Result<Vec<CandidateCoordinate>, SourceError> + Send + Sync>;

/// Coordinate source answering through a closure
pub struct MockCoordinateSource {
    id: SourceId,
    responder: Responder,
    /// Queries other than this one never complete
    stall_unless: Option<String>,
    calls: AtomicU32,
}

impl MockCoordinateSource {
    pub fn with_responder(
        id: &str,
        responder: impl Fn(&LocationQuery) -> Result<Vec<CandidateCoordinate>, SourceError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::from(id),
            responder: Box::new(responder),
            stall_unless: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Answers `name` with a fixed candidate and hangs on every other query
    pub fn stalling_except(id: &str, name: &str, lat: f64, lng: f64, confidence: f64) -> Arc<Self> {
        let source = SourceId::from(id);
        Arc::new(Self {
            id: source.clone(),
            responder: Box::new(move |_| Ok(vec![CandidateCoordinate::new(lat, lng, source.clone(), confidence)?])),
            stall_unless: Some(name.to_string()),
            calls: AtomicU32::new(0),
        })
    }

    /// Same candidate for every query
    pub fn fixed(id: &str, lat: f64, lng: f64, confidence: f64, country: Option<&'static str>) -> Arc<Self> {
        let source = SourceId::from(id);
        Self::with_responder(id, move |_| {
            let candidate = CandidateCoordinate::new(lat, lng, source.clone(), confidence)?;
            Ok(vec![match country {
                Some(code) => candidate.with_country(code),
                None => candidate,
            }])
        })
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Self::with_responder(id, |_| Err(SourceError::Status(503)))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinateSource for MockCoordinateSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    async fn fetch_candidates(
        &self,
        query: &LocationQuery,
        _timeout: Duration,
    ) -> Result<Vec<CandidateCoordinate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall_unless.as_deref().is_some_and(|name| name != query.raw_name) {
            std::future::pending::<()>().await;
        }
        (self.responder)(query)
    }
}

/// Fact source with a switchable failure mode and optional latency
pub struct MockFactSource {
    id: SourceId,
    trust: f64,
    subjects: Vec<String>,
    delay: Duration,
    failing: AtomicBool,
    calls: AtomicU32,
}

impl MockFactSource {
    pub fn new(id: &str, trust: f64, subjects: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::from(id),
            trust,
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    pub fn slow(id: &str, trust: f64, subjects: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::from(id),
            trust,
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            delay,
            failing: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        })
    }

    pub fn failing(id: &str, trust: f64) -> Arc<Self> {
        let source = Self::new(id, trust, &[]);
        source.set_failing(true);
        source
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FactSource for MockFactSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn trust_weight(&self) -> f64 {
        self.trust
    }

    async fn fetch_facts(
        &self,
        _subject: &str,
        _language: &LanguageCode,
        _timeout: Duration,
    ) -> Result<Vec<ExternalFact>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Status(503));
        }
        Ok(self
            .subjects
            .iter()
            .map(|s| ExternalFact::new(self.id.clone(), s.clone(), self.trust).with_attribute("description", "scripted"))
            .collect())
    }
}

/// Narrative generator returning fixed `(title, narrative)` stops
pub struct MockNarrator {
    stops: Vec<(String, String)>,
}

impl MockNarrator {
    pub fn new(stops: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            stops: stops.iter().map(|(t, n)| (t.to_string(), n.to_string())).collect(),
        })
    }
}

#[async_trait]
impl NarrativeGenerator for MockNarrator {
    async fn generate(&self, _context: &NarrativeContext) -> Result<Vec<GuideStop>, NarrativeError> {
        if self.stops.is_empty() {
            return Err(NarrativeError::Empty);
        }
        Ok(self
            .stops
            .iter()
            .enumerate()
            .map(|(i, (title, narrative))| GuideStop::new(i, title.clone(), narrative.clone()))
            .collect())
    }
}

/// Orchestrator wired from mocks, with the handles tests inspect
pub struct TestPipeline {
    pub orchestrator: PipelineOrchestrator,
    pub breakers: Arc<BreakerRegistry>,
    pub regional_tier: usize,
}

pub fn build_resolver(
    tiers: &[Arc<MockCoordinateSource>],
    breakers: &Arc<BreakerRegistry>,
) -> TieredResolver {
    let strategies = tiers
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let threshold = TIER_THRESHOLDS[i.min(TIER_THRESHOLDS.len() - 1)];
            TierStrategy::new(source.clone() as Arc<dyn CoordinateSource>, threshold, Duration::from_secs(1))
        })
        .collect();
    TieredResolver::new(strategies, Arc::clone(breakers))
}

pub fn build_pipeline(
    tiers: &[Arc<MockCoordinateSource>],
    facts: &[Arc<MockFactSource>],
    narrator: Arc<dyn NarrativeGenerator>,
    budget: Duration,
) -> TestPipeline {
    build_pipeline_with(tiers, facts, narrator, budget, OrchestratorConfig::default())
}

pub fn build_pipeline_with(
    tiers: &[Arc<MockCoordinateSource>],
    facts: &[Arc<MockFactSource>],
    narrator: Arc<dyn NarrativeGenerator>,
    budget: Duration,
    config: OrchestratorConfig,
) -> TestPipeline {
    let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));

    let tiered = build_resolver(tiers, &breakers);
    let regional_tier = tiered.regional_tier();
    let resolver: Arc<dyn LocationResolver> = Arc::new(tiered);

    let aggregator = Arc::new(FactAggregator::new(
        facts.iter().map(|f| f.clone() as Arc<dyn FactSource>).collect(),
        Arc::clone(&breakers),
        Duration::from_secs(10),
        RetryPolicy::none(),
    ));

    let orchestrator = PipelineOrchestrator::new(
        Arc::clone(&resolver),
        aggregator,
        tourgen_pipeline::verifier::FactVerifier::new(VerifierConfig::default()),
        narrator,
        ChapterPlanner::new(resolver, PlannerConfig::default()),
        config,
        budget,
    )
    .with_store(Arc::new(MemoryGuideStore::new()))
    .with_regional_tier(regional_tier);

    TestPipeline {
        orchestrator,
        breakers,
        regional_tier,
    }
}

/// Gyeongbokgung setup where every adapter answers
pub fn gyeongbokgung_pipeline() -> TestPipeline {
    build_pipeline(
        &[
            MockCoordinateSource::fixed("plus-code", 37.5796, 126.9770, 0.95, Some("KR")),
            MockCoordinateSource::fixed("place-search", 37.5788, 126.9770, 0.8, Some("KR")),
        ],
        &[
            MockFactSource::new("wikidata", 0.8, &["경복궁"]),
            MockFactSource::new("tour-catalog", 0.9, &["경복궁", "경복궁 근정전"]),
        ],
        MockNarrator::new(&[
            ("경복궁 광화문", "정문입니다."),
            ("근정전", "정전입니다."),
            ("쉬어가기", "   "),
            ("경회루", "연회 장소입니다."),
        ]),
        Duration::from_secs(6),
    )
}
