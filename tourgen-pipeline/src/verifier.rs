//! Fact verification
//!
//! Cross-checks an aggregated `FactBundle` against the resolved location and
//! produces a report that travels next to the bundle. The bundle itself is never
//! modified.
//!
//! A fact is flagged when:
//! - it carries `lat`/`lng` further than `max_fact_distance_km` from the resolved point
//! - its subject neither shares a token with the query name nor reaches
//!   `min_subject_similarity` Jaro-Winkler similarity

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tourgen_common::text::{names_overlap, normalize_name};
use tracing::debug;

use crate::config::VerifierConfig;
use crate::types::{ExternalFact, FactBundle, ResolvedLocation, SourceId};

/// Overall verification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    DistantFact { distance_km: f64 },
    WeakSubjectMatch { similarity: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationIssue {
    pub source: SourceId,
    pub subject: String,
    #[serde(flatten)]
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub issues: Vec<VerificationIssue>,
    pub checked_facts: usize,
    pub flagged_facts: usize,
}

#[derive(Debug, Clone)]
pub struct FactVerifier {
    config: VerifierConfig,
}

impl FactVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn verify(&self, resolved: &ResolvedLocation, bundle: &FactBundle) -> VerificationReport {
        let mut issues = Vec::new();
        let mut flagged_facts = 0;

        for fact in &bundle.facts {
            let found = self.check_fact(resolved, fact);
            if !found.is_empty() {
                flagged_facts += 1;
                issues.extend(found);
            }
        }

        let checked_facts = bundle.facts.len();
        let status = if flagged_facts == 0 {
            VerificationStatus::Pass
        } else if flagged_facts == checked_facts {
            VerificationStatus::Fail
        } else {
            VerificationStatus::Warning
        };

        debug!(
            location = resolved.name(),
            checked_facts,
            flagged_facts,
            status = ?status,
            "Fact verification complete"
        );

        VerificationReport {
            status,
            issues,
            checked_facts,
            flagged_facts,
        }
    }

    fn check_fact(&self, resolved: &ResolvedLocation, fact: &ExternalFact) -> Vec<VerificationIssue> {
        let mut issues = Vec::new();

        if let Some(point) = fact.point() {
            let distance_km = point.distance_km(&resolved.point());
            if distance_km > self.config.max_fact_distance_km {
                issues.push(VerificationIssue {
                    source: fact.source_id.clone(),
                    subject: fact.subject_name.clone(),
                    kind: IssueKind::DistantFact { distance_km },
                });
            }
        }

        if !names_overlap(&fact.subject_name, resolved.name()) {
            let similarity = subject_similarity(&fact.subject_name, resolved.name());
            if similarity < self.config.min_subject_similarity {
                issues.push(VerificationIssue {
                    source: fact.source_id.clone(),
                    subject: fact.subject_name.clone(),
                    kind: IssueKind::WeakSubjectMatch { similarity },
                });
            }
        }

        issues
    }
}

/// Jaro-Winkler similarity of the normalized names
pub fn subject_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&normalize_name(a), &normalize_name(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateCoordinate, LanguageCode, LocationQuery};
    use tourgen_common::geo::GeoPoint;

    fn resolved(name: &str, lat: f64, lng: f64) -> ResolvedLocation {
        ResolvedLocation {
            query: LocationQuery::new(name, LanguageCode::parse("en").unwrap()),
            coordinate: CandidateCoordinate::new(lat, lng, SourceId::from("test"), 0.9).unwrap(),
            country_code: "KOR".to_string(),
            region_name: "Seoul".to_string(),
            resolution_tier: 0,
            alternates: Vec::new(),
        }
    }

    fn bundle(facts: Vec<ExternalFact>) -> FactBundle {
        FactBundle {
            facts,
            composite_confidence: 0.8,
            sources_queried: vec![SourceId::from("wikidata")],
            sources_succeeded: vec![SourceId::from("wikidata")],
            sources_empty: Vec::new(),
        }
    }

    fn fact(subject: &str) -> ExternalFact {
        ExternalFact::new(SourceId::from("wikidata"), subject, 0.8)
    }

    #[test]
    fn test_matching_facts_pass() {
        let verifier = FactVerifier::new(VerifierConfig::default());
        let base = resolved("Gyeongbokgung", 37.5796, 126.977);
        let report = verifier.verify(
            &base,
            &bundle(vec![
                fact("Gyeongbokgung").with_point(GeoPoint { lat: 37.58, lng: 126.98 }),
                fact("Gyeongbokgung Palace"),
            ]),
        );
        assert_eq!(report.status, VerificationStatus::Pass);
        assert_eq!(report.checked_facts, 2);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_distant_fact_is_flagged() {
        let verifier = FactVerifier::new(VerifierConfig::default());
        let base = resolved("Gyeongbokgung", 37.5796, 126.977);
        let report = verifier.verify(
            &base,
            &bundle(vec![
                fact("Gyeongbokgung").with_point(GeoPoint { lat: 35.1796, lng: 129.0756 }),
                fact("Gyeongbokgung"),
            ]),
        );
        assert_eq!(report.status, VerificationStatus::Warning);
        assert_eq!(report.flagged_facts, 1);
        assert!(matches!(report.issues[0].kind, IssueKind::DistantFact { distance_km } if distance_km > 300.0));
    }

    #[test]
    fn test_all_flagged_fails() {
        let verifier = FactVerifier::new(VerifierConfig::default());
        let base = resolved("Gyeongbokgung", 37.5796, 126.977);
        let report = verifier.verify(&base, &bundle(vec![fact("Eiffel Tower")]));
        assert_eq!(report.status, VerificationStatus::Fail);
        assert!(matches!(report.issues[0].kind, IssueKind::WeakSubjectMatch { .. }));
    }

    #[test]
    fn test_close_spelling_is_not_weak() {
        assert!(subject_similarity("Gyeongbokgung", "Gyeongbokkung") >= 0.85);

        let verifier = FactVerifier::new(VerifierConfig::default());
        let base = resolved("Gyeongbokgung", 37.5796, 126.977);
        let report = verifier.verify(&base, &bundle(vec![fact("Gyeongbokkung")]));
        assert_eq!(report.status, VerificationStatus::Pass);
    }

    #[test]
    fn test_empty_bundle_passes() {
        let verifier = FactVerifier::new(VerifierConfig::default());
        let report = verifier.verify(&resolved("x", 0.0, 0.0), &bundle(Vec::new()));
        assert_eq!(report.status, VerificationStatus::Pass);
        assert_eq!(report.checked_facts, 0);
    }
}
