//! Parallel fact aggregation
//!
//! **Algorithm:**
//! 1. Spawn one task per registered fact source into a `JoinSet`, each call
//!    wrapped by the source's breaker, per-source timeout and retry policy
//! 2. Join with a single deadline (`budget`); tasks still pending at expiry are
//!    detached and finish on their own, bounded by their per-source timeout
//! 3. Deduplicate each source's facts by normalized subject (first value per
//!    attribute wins); cross-source duplicates are kept
//! 4. Rank by trust, then source id, then subject, so arrival order never
//!    changes the bundle
//! 5. Composite confidence = Σ staleness-adjusted trust of succeeded sources ÷
//!    Σ trust of queried sources

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tourgen_common::text::normalize_name;
use tracing::{debug, info, warn};

use crate::events::SourceStatus;
use crate::resilience::{call_resilient, BreakerRegistry, RetryPolicy};
use crate::types::{ExternalFact, FactBundle, FactSource, LanguageCode, SourceError, SourceId};

/// Facts younger than this keep their full trust
const FRESH_DAYS: f64 = 365.0;
/// Facts this old or older are discounted to `STALE_FLOOR`
const STALE_DAYS: f64 = 5.0 * 365.0;
const STALE_FLOOR: f64 = 0.7;

/// Per-source result of one aggregation round
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: SourceId,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub elapsed_ms: u64,
}

/// Bundle plus per-source outcomes
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub bundle: FactBundle,
    pub sources: Vec<SourceReport>,
}

pub struct FactAggregator {
    sources: Vec<Arc<dyn FactSource>>,
    breakers: Arc<BreakerRegistry>,
    source_timeout: Duration,
    retry: RetryPolicy,
}

impl FactAggregator {
    pub fn new(
        sources: Vec<Arc<dyn FactSource>>,
        breakers: Arc<BreakerRegistry>,
        source_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sources,
            breakers,
            source_timeout,
            retry,
        }
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id().clone()).collect()
    }

    /// Aggregate facts about `subject` within `budget`
    pub async fn aggregate(&self, subject: &str, language: &LanguageCode, budget: Duration) -> FactBundle {
        self.aggregate_detailed(subject, language, budget).await.bundle
    }

    /// Aggregate and also report what happened to each source
    pub async fn aggregate_detailed(
        &self,
        subject: &str,
        language: &LanguageCode,
        budget: Duration,
    ) -> AggregationReport {
        let started = Instant::now();
        let deadline = started + budget;
        let queried = self.source_ids();
        let trust: HashMap<SourceId, f64> = self
            .sources
            .iter()
            .map(|s| (s.id().clone(), s.trust_weight().clamp(0.0, 1.0)))
            .collect();

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let breaker = self.breakers.breaker(source.id());
            let timeout = self.source_timeout;
            let retry = self.retry.clone();
            let subject = subject.to_string();
            let language = language.clone();

            tasks.spawn(async move {
                let call_started = Instant::now();
                let outcome = call_resilient(&breaker, timeout, &retry, |remaining| {
                    source.fetch_facts(&subject, &language, remaining)
                })
                .await;
                (source.id().clone(), outcome, call_started.elapsed())
            });
        }

        let mut results: HashMap<SourceId, Vec<ExternalFact>> = HashMap::new();
        let mut reports = Vec::with_capacity(queried.len());
        let mut finished: HashSet<SourceId> = HashSet::new();

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((source, outcome, elapsed)))) => {
                    finished.insert(source.clone());
                    let status = match outcome {
                        Ok(facts) => {
                            let facts = dedup_source_facts(facts);
                            let status = if facts.is_empty() {
                                SourceStatus::Empty
                            } else {
                                SourceStatus::Succeeded { facts: facts.len() }
                            };
                            results.insert(source.clone(), facts);
                            status
                        }
                        Err(e) => {
                            log_source_error(&source, &e);
                            SourceStatus::Failed { error: e.to_string() }
                        }
                    };
                    reports.push(SourceReport {
                        source,
                        status,
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                }
                Ok(Some(Err(join_error))) => {
                    warn!(error = %join_error, "Fact source task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    let pending = tasks.len();
                    tasks.detach_all();
                    warn!(
                        subject,
                        pending,
                        budget_ms = budget.as_millis() as u64,
                        "Aggregation budget expired, abandoning pending sources"
                    );
                    break;
                }
            }
        }

        // Panicked tasks and abandoned tasks both end up without a report
        for source in &queried {
            if !finished.contains(source) {
                reports.push(SourceReport {
                    source: source.clone(),
                    status: SourceStatus::Abandoned,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        let bundle = build_bundle(queried, &trust, results, Utc::now());
        info!(
            subject,
            facts = bundle.facts.len(),
            succeeded = bundle.sources_succeeded.len(),
            queried = bundle.sources_queried.len(),
            composite_confidence = bundle.composite_confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fact aggregation complete"
        );

        AggregationReport {
            bundle,
            sources: reports,
        }
    }
}

fn log_source_error(source: &SourceId, error: &SourceError) {
    match error {
        SourceError::CircuitOpen(_) | SourceError::NotConfigured(_) => {
            debug!(source = %source, error = %error, "Fact source skipped")
        }
        _ => warn!(source = %source, error = %error, "Fact source failed"),
    }
}

/// Merge facts with the same normalized subject; facts without a usable subject are dropped
pub fn dedup_source_facts(facts: Vec<ExternalFact>) -> Vec<ExternalFact> {
    let mut merged: Vec<ExternalFact> = Vec::with_capacity(facts.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for fact in facts {
        let key = normalize_name(&fact.subject_name);
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(&i) => {
                let existing = &mut merged[i];
                for (k, v) in fact.attributes {
                    existing.attributes.entry(k).or_insert(v);
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(fact);
            }
        }
    }

    merged
}

/// Trust multiplier for a fact's age (1.0 when the age is unknown)
pub fn staleness_factor(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(modified) = last_modified else {
        return 1.0;
    };
    let age_days = (now - modified).num_seconds() as f64 / 86_400.0;
    if age_days <= FRESH_DAYS {
        1.0
    } else if age_days >= STALE_DAYS {
        STALE_FLOOR
    } else {
        let progress = (age_days - FRESH_DAYS) / (STALE_DAYS - FRESH_DAYS);
        1.0 - progress * (1.0 - STALE_FLOOR)
    }
}

/// Σ effective trust(succeeded) ÷ Σ trust(queried)
pub fn composite_confidence(
    queried: &[SourceId],
    trust: &HashMap<SourceId, f64>,
    succeeded: &HashMap<SourceId, Vec<ExternalFact>>,
    now: DateTime<Utc>,
) -> f64 {
    let total: f64 = queried.iter().filter_map(|s| trust.get(s)).sum();
    if total <= 0.0 {
        return 0.0;
    }

    let achieved: f64 = queried
        .iter()
        .filter_map(|s| Some((trust.get(s)?, succeeded.get(s)?)))
        .filter(|(_, facts)| !facts.is_empty())
        .map(|(weight, facts)| {
            let freshness = facts
                .iter()
                .map(|f| staleness_factor(f.last_modified(), now))
                .sum::<f64>()
                / facts.len() as f64;
            weight * freshness
        })
        .sum();

    (achieved / total).clamp(0.0, 1.0)
}

fn build_bundle(
    queried: Vec<SourceId>,
    trust: &HashMap<SourceId, f64>,
    results: HashMap<SourceId, Vec<ExternalFact>>,
    now: DateTime<Utc>,
) -> FactBundle {
    let composite = composite_confidence(&queried, trust, &results, now);

    let sources_succeeded: Vec<SourceId> = queried
        .iter()
        .filter(|s| results.get(*s).is_some_and(|f| !f.is_empty()))
        .cloned()
        .collect();
    let sources_empty: Vec<SourceId> = queried
        .iter()
        .filter(|s| results.get(*s).is_some_and(|f| f.is_empty()))
        .cloned()
        .collect();

    let mut facts: Vec<ExternalFact> = results.into_values().flatten().collect();
    facts.sort_by(|a, b| {
        b.trust_weight
            .total_cmp(&a.trust_weight)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| normalize_name(&a.subject_name).cmp(&normalize_name(&b.subject_name)))
    });

    FactBundle {
        facts,
        composite_confidence: composite,
        sources_queried: queried,
        sources_succeeded,
        sources_empty,
    }
}
