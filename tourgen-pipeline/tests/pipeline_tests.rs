//! End-to-end pipeline tests with scripted adapters

mod helpers;

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tourgen_common::geo::BoundingBox;
use tourgen_pipeline::config::OrchestratorConfig;
use tourgen_pipeline::events::{EventSink, PipelineEvent, Stage};
use tourgen_pipeline::store::GuideKey;
use tourgen_pipeline::types::{LocationQuery, SourceId, StopWarning};
use tourgen_pipeline::verifier::VerificationStatus;
use tourgen_pipeline::PipelineError;

use helpers::*;

const FRANCE: BoundingBox = BoundingBox::new(41.3, 51.1, -5.2, 9.6);

#[tokio::test]
async fn test_gyeongbokgung_all_adapters_succeed() {
    let pipeline = gyeongbokgung_pipeline();

    let result = pipeline
        .orchestrator
        .run(LocationQuery::new("경복궁", lang("ko")))
        .await
        .expect("pipeline run");

    let resolved = &result.resolved_location;
    assert_eq!(resolved.resolution_tier, 0);
    assert!(resolved.coordinate.confidence >= 0.85);
    assert_eq!(resolved.country_code, "KOR");

    assert_eq!(result.fact_bundle.sources_succeeded.len(), 2);
    assert!((result.fact_bundle.composite_confidence - 1.0).abs() < 1e-9);
    assert_eq!(result.verification.status, VerificationStatus::Pass);

    let indices: Vec<usize> = result.stops.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1, 3], "empty narrative dropped, indices kept");
    for stop in &result.stops {
        assert!(!stop.narrative_text.trim().is_empty());
        let c = stop.coordinate.as_ref().expect("every stop anchored");
        assert!((0.0..=1.0).contains(&c.confidence));
    }
    assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings);

    let stored = pipeline
        .orchestrator
        .store()
        .unwrap()
        .load(&GuideKey::new("경복궁", lang("ko")))
        .await
        .unwrap()
        .expect("guide persisted");
    assert_eq!(stored.run_id, result.run_id);
}

#[tokio::test]
async fn test_all_adapters_fail_falls_back_to_france_centroid() {
    let pipeline = build_pipeline(
        &[
            MockCoordinateSource::failing("plus-code"),
            MockCoordinateSource::failing("place-search"),
            MockCoordinateSource::failing("registry-xref"),
        ],
        &[MockFactSource::failing("wikidata", 0.8)],
        MockNarrator::new(&[("Introduction", "Bienvenue."), ("La cour", "La cour du château.")]),
        Duration::from_secs(6),
    );

    let result = pipeline
        .orchestrator
        .run(LocationQuery::new("Château inconnu", lang("fr")).with_country("FRA"))
        .await
        .expect("regional default keeps the run alive");

    let resolved = &result.resolved_location;
    assert_eq!(resolved.resolution_tier, pipeline.regional_tier);
    assert_eq!(resolved.resolution_tier, 3, "last tier");
    assert!(resolved.coordinate.confidence <= 0.2);
    assert!(FRANCE.contains(resolved.coordinate.lat, resolved.coordinate.lng));
    assert_eq!(resolved.country_code, "FRA");

    assert!(result.fact_bundle.sources_succeeded.is_empty());
    assert_eq!(result.fact_bundle.composite_confidence, 0.0);
    assert!(result.warnings.iter().any(|w| w.contains("regional centroid")));
    assert!(result.warnings.iter().any(|w| w.contains("Partial fact bundle")));
    assert_eq!(result.stops.len(), 2);
}

#[tokio::test]
async fn test_resolution_exhausted_is_fatal() {
    let narrator = MockNarrator::new(&[("a", "b")]);
    let pipeline = build_pipeline(
        &[MockCoordinateSource::failing("plus-code")],
        &[],
        narrator,
        Duration::from_secs(6),
    );

    let err = pipeline
        .orchestrator
        .run(LocationQuery::new("Nowhere In Particular", lang("en")))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ResolutionExhausted { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_slow_adapter_excluded_by_budget() {
    let pipeline = build_pipeline(
        &[MockCoordinateSource::fixed("plus-code", 37.5796, 126.9770, 0.95, Some("KOR"))],
        &[
            MockFactSource::new("wikidata", 0.8, &["경복궁"]),
            MockFactSource::slow("tour-catalog", 0.9, &["경복궁"], Duration::from_secs(5)),
        ],
        MockNarrator::new(&[("경복궁", "소개")]),
        Duration::from_secs(2),
    );

    let report = pipeline
        .orchestrator
        .aggregator()
        .aggregate_detailed("경복궁", &lang("ko"), Duration::from_secs(2))
        .await;

    let slow = SourceId::from("tour-catalog");
    assert!(report.bundle.sources_queried.contains(&slow));
    assert!(!report.bundle.sources_succeeded.contains(&slow));
    assert!(report.bundle.is_partial());
    assert_eq!(report.bundle.sources_succeeded, vec![SourceId::from("wikidata")]);

    let result = pipeline
        .orchestrator
        .run(LocationQuery::new("경복궁", lang("ko")))
        .await
        .unwrap();
    assert!(!result.fact_bundle.sources_succeeded.contains(&slow));
    assert!(result.fact_bundle.sources_queried.contains(&slow));
}

#[tokio::test]
async fn test_dedup_is_stable_across_identical_runs() {
    let pipeline = gyeongbokgung_pipeline();
    let aggregator = pipeline.orchestrator.aggregator();

    let first = aggregator.aggregate("경복궁", &lang("ko"), Duration::from_secs(2)).await;
    let second = aggregator.aggregate("경복궁", &lang("ko"), Duration::from_secs(2)).await;

    for source in &first.sources_queried {
        assert_eq!(first.facts_from(source).count(), second.facts_from(source).count());
    }
    let subjects = |b: &tourgen_pipeline::types::FactBundle| {
        b.facts.iter().map(|f| (f.source_id.clone(), f.subject_name.clone())).collect::<Vec<_>>()
    };
    assert_eq!(subjects(&first), subjects(&second));
}

#[tokio::test]
async fn test_narrative_failure_still_returns_resolved_guide() {
    let pipeline = build_pipeline(
        &[MockCoordinateSource::fixed("plus-code", 37.5796, 126.9770, 0.95, Some("KOR"))],
        &[MockFactSource::new("wikidata", 0.8, &["경복궁"])],
        MockNarrator::new(&[]),
        Duration::from_secs(6),
    );

    let result = pipeline
        .orchestrator
        .run(LocationQuery::new("경복궁", lang("ko")))
        .await
        .expect("only resolution exhaustion is fatal");

    assert!(result.stops.is_empty());
    assert_eq!(result.resolved_location.country_code, "KOR");
    assert_eq!(result.fact_bundle.sources_succeeded, vec![SourceId::from("wikidata")]);
    assert!(result.warnings.iter().any(|w| w.contains("no stops")));

    let stored = pipeline
        .orchestrator
        .store()
        .unwrap()
        .load(&GuideKey::new("경복궁", lang("ko")))
        .await
        .unwrap();
    assert!(stored.is_none(), "empty guides are not persisted");
}

#[tokio::test(start_paused = true)]
async fn test_run_deadline_bounds_stop_anchoring() {
    let tiers: Vec<_> = ["plus-code", "place-search", "registry-xref", "ai-estimate"]
        .into_iter()
        .map(|id| MockCoordinateSource::stalling_except(id, "Namsan", 37.5512, 126.9882, 0.9))
        .collect();
    let titles: Vec<String> = (0..8).map(|i| format!("Namsan Gate {i}")).collect();
    let stops: Vec<(&str, &str)> = titles.iter().map(|t| (t.as_str(), "A gate on the trail.")).collect();
    let pipeline = build_pipeline_with(
        &tiers,
        &[],
        MockNarrator::new(&stops),
        Duration::from_secs(6),
        OrchestratorConfig {
            deadline_secs: 2,
            ..OrchestratorConfig::default()
        },
    );

    let started = Instant::now();
    let result = pipeline
        .orchestrator
        .run(LocationQuery::new("Namsan", lang("en")))
        .await
        .unwrap();

    assert!(started.elapsed() <= Duration::from_secs(3), "took {:?}", started.elapsed());
    assert_eq!(result.resolved_location.resolution_tier, 0);
    assert_eq!(result.stops.len(), 8);
    for stop in &result.stops {
        let c = stop.coordinate.as_ref().expect("every stop anchored");
        assert_eq!(c.source.as_str(), SourceId::OFFSET_FALLBACK);
        assert!(matches!(stop.warnings[0], StopWarning::LowConfidenceAnchor { .. }));
    }
    assert!(result.warnings.iter().any(|w| w.contains("deadline")));
}

#[tokio::test]
async fn test_events_follow_stage_order() {
    let (tx, mut rx) = mpsc::channel(64);
    let pipeline = gyeongbokgung_pipeline();
    let orchestrator = pipeline.orchestrator.with_events(EventSink::new(tx));

    orchestrator
        .run(LocationQuery::new("경복궁", lang("ko")))
        .await
        .unwrap();
    drop(orchestrator);

    let mut started = Vec::new();
    let mut outcomes = 0;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::StageStarted { stage, .. } => started.push(stage),
            PipelineEvent::SourceOutcome { .. } => outcomes += 1,
            _ => {}
        }
    }

    assert_eq!(
        started,
        vec![Stage::Resolve, Stage::Aggregate, Stage::Verify, Stage::Generate, Stage::Anchor]
    );
    assert_eq!(outcomes, 2);
}
