//! Circuit breaker behavior seen through the fact aggregator and the resolver

mod helpers;

use std::sync::Arc;
use std::time::Duration;
use tourgen_pipeline::aggregator::FactAggregator;
use tourgen_pipeline::events::SourceStatus;
use tourgen_pipeline::resilience::{BreakerConfig, BreakerRegistry, CircuitState, RetryPolicy};
use tourgen_pipeline::resolver::LocationResolver;
use tourgen_pipeline::types::{FactSource, LocationQuery, SourceId};

use helpers::*;

fn registry(failure_threshold: u32, success_threshold: u32) -> Arc<BreakerRegistry> {
    Arc::new(BreakerRegistry::new(BreakerConfig {
        failure_threshold,
        monitoring_window: Duration::from_secs(60),
        cool_down: Duration::from_secs(30),
        success_threshold,
    }))
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_recovers() {
    let breakers = registry(3, 1);
    let source = MockFactSource::failing("wikidata", 0.8);
    let aggregator = FactAggregator::new(
        vec![source.clone() as Arc<dyn FactSource>],
        Arc::clone(&breakers),
        Duration::from_secs(5),
        RetryPolicy::none(),
    );
    let id = SourceId::from("wikidata");

    for _ in 0..3 {
        aggregator.aggregate("경복궁", &lang("ko"), Duration::from_secs(2)).await;
    }
    assert_eq!(source.calls(), 3);
    assert_eq!(breakers.breaker(&id).state(), CircuitState::Open);

    // While OPEN the source is never called
    let report = aggregator
        .aggregate_detailed("경복궁", &lang("ko"), Duration::from_secs(2))
        .await;
    assert_eq!(source.calls(), 3);
    assert!(report.bundle.sources_succeeded.is_empty());
    assert!(matches!(&report.sources[0].status, SourceStatus::Failed { error } if error.contains("Circuit open")));

    source.set_failing(false);
    tokio::time::advance(Duration::from_secs(31)).await;

    let bundle = aggregator.aggregate("경복궁", &lang("ko"), Duration::from_secs(2)).await;
    assert_eq!(source.calls(), 4);
    assert_eq!(bundle.sources_succeeded, vec![id.clone()]);
    assert_eq!(breakers.breaker(&id).state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_open_tier_is_skipped_by_resolver() {
    let breakers = registry(2, 1);
    let flaky = MockCoordinateSource::failing("plus-code");
    let backup = MockCoordinateSource::fixed("place-search", 37.5796, 126.9770, 0.8, Some("KR"));
    let resolver = build_resolver(&[flaky.clone(), backup], &breakers);
    let query = LocationQuery::new("경복궁", lang("ko"));

    for _ in 0..2 {
        let resolved = resolver.resolve(&query, 0.0).await.unwrap();
        assert_eq!(resolved.resolution_tier, 1);
    }
    assert_eq!(flaky.calls(), 2);

    let resolved = resolver.resolve(&query, 0.0).await.unwrap();
    assert_eq!(resolved.resolution_tier, 1);
    assert_eq!(flaky.calls(), 2, "open breaker short-circuits the tier");
    assert_eq!(breakers.breaker(&SourceId::from("plus-code")).state(), CircuitState::Open);
}

#[tokio::test]
async fn test_breakers_are_independent_per_source() {
    let breakers = registry(1, 1);
    let bad = MockFactSource::failing("wikidata", 0.8);
    let good = MockFactSource::new("wikipedia", 0.7, &["Gyeongbokgung"]);
    let aggregator = FactAggregator::new(
        vec![bad as Arc<dyn FactSource>, good.clone() as Arc<dyn FactSource>],
        Arc::clone(&breakers),
        Duration::from_secs(5),
        RetryPolicy::none(),
    );

    aggregator.aggregate("Gyeongbokgung", &lang("en"), Duration::from_secs(2)).await;
    let bundle = aggregator.aggregate("Gyeongbokgung", &lang("en"), Duration::from_secs(2)).await;

    assert_eq!(good.calls(), 2);
    assert_eq!(bundle.sources_succeeded, vec![SourceId::from("wikipedia")]);
    assert_eq!(breakers.breaker(&SourceId::from("wikipedia")).state(), CircuitState::Closed);
    assert_eq!(breakers.breaker(&SourceId::from("wikidata")).state(), CircuitState::Open);
}
