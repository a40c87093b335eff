//! Assessment-type resolver
//!
//! Pulls domain keywords out of the question and searches the customer's
//! indexed assessment-type catalog. The highest-confidence hit wins; a tie
//! keeps the first match. Every hit leaves an audit record.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::catalog::types::PlaceholderSlot;
use crate::stores::SemanticIndexStore;

use super::{AuditRecord, Resolution, ResolvedAssessmentType, StrategyKind, StrategyOutcome};

lazy_static! {
    static ref NAMED_ASSESSMENT: Regex =
        Regex::new(r"(?i)\b([a-z]+(?:\s+[a-z]+)?)\s+assessments?\b").unwrap();
    static ref DOMAIN_TERM: Regex =
        Regex::new(r"(?i)\b(braden|norton|morse|wound|pain|skin|fall|falls|nutrition|mobility)\b")
            .unwrap();
}

fn applicable(slot: &PlaceholderSlot) -> bool {
    slot.semantic == "assessment_type" || slot.name.to_lowercase().contains("assessment")
}

/// Keywords worth sending to the assessment index, in question order.
fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for cap in NAMED_ASSESSMENT.captures_iter(question) {
        let phrase = cap[1].to_lowercase();
        if !keywords.contains(&phrase) {
            keywords.push(phrase);
        }
    }
    for cap in DOMAIN_TERM.captures_iter(question) {
        let term = cap[1].to_lowercase();
        if !keywords.contains(&term) {
            keywords.push(term);
        }
    }
    keywords
}

pub async fn resolve(
    question: &str,
    slot: &PlaceholderSlot,
    customer_id: &str,
    store: &Arc<dyn SemanticIndexStore>,
    search_timeout: Duration,
) -> StrategyOutcome {
    if !applicable(slot) {
        return StrategyOutcome::Miss;
    }
    let keywords = extract_keywords(question);
    if keywords.is_empty() {
        return StrategyOutcome::Miss;
    }

    let hits = match timeout(
        search_timeout,
        store.search_assessment_types(customer_id, &keywords),
    )
    .await
    {
        Ok(Ok(hits)) => hits,
        Ok(Err(e)) => {
            warn!(error = %e, "assessment catalog search failed, skipping strategy");
            return StrategyOutcome::Miss;
        }
        Err(_) => {
            warn!("assessment catalog search timed out, skipping strategy");
            return StrategyOutcome::Miss;
        }
    };

    // Strictly-greater comparison keeps the first hit on ties.
    let best = hits.iter().fold(None::<&crate::stores::AssessmentTypeHit>, |acc, h| match acc {
        Some(a) if h.confidence > a.confidence => Some(h),
        Some(a) => Some(a),
        None => Some(h),
    });
    let best = match best {
        Some(b) => b,
        None => return StrategyOutcome::Miss,
    };

    let source_phrase = keywords.join(", ");
    StrategyOutcome::Hit(Resolution {
        value: json!(best.name),
        display: best.name.clone(),
        confidence: best.confidence,
        strategy: StrategyKind::AssessmentType,
        source_phrase: source_phrase.clone(),
        audit: Some(AuditRecord::Assessment(ResolvedAssessmentType {
            placeholder: slot.name.clone(),
            assessment_id: best.id.clone(),
            assessment_name: best.name.clone(),
            confidence: best.confidence,
            source_phrase,
            resolved_at: Utc::now(),
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::SlotType;
    use crate::error::Result;
    use crate::semantic::SemanticSearchResult;
    use crate::stores::{AssessmentTypeHit, OntologyConcept, SearchTerm};
    use async_trait::async_trait;

    struct AssessmentStore {
        hits: Vec<AssessmentTypeHit>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl SemanticIndexStore for AssessmentStore {
        async fn search_form_fields(
            &self,
            _c: &str,
            _t: &[SearchTerm],
            _l: usize,
        ) -> Result<Vec<SemanticSearchResult>> {
            Ok(vec![])
        }
        async fn search_non_form_columns(
            &self,
            _c: &str,
            _t: &[SearchTerm],
            _l: usize,
        ) -> Result<Vec<SemanticSearchResult>> {
            Ok(vec![])
        }
        async fn search_assessment_types(
            &self,
            _c: &str,
            _k: &[String],
        ) -> Result<Vec<AssessmentTypeHit>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.hits.clone())
        }
        async fn resolve_ontology(&self, _t: &str) -> Result<Option<OntologyConcept>> {
            Ok(None)
        }
        async fn field_enum_values(&self, _c: &str, _f: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn slot() -> PlaceholderSlot {
        PlaceholderSlot {
            name: "assessment_type".to_string(),
            slot_type: SlotType::Text,
            semantic: "assessment_type".to_string(),
            required: true,
            default: None,
            validators: vec![],
            examples: vec![],
        }
    }

    fn hit(id: &str, name: &str, confidence: f64) -> AssessmentTypeHit {
        AssessmentTypeHit {
            id: id.to_string(),
            name: name.to_string(),
            confidence,
        }
    }

    #[test]
    fn extracts_named_and_domain_keywords() {
        let kw = extract_keywords("Show Braden assessments for wound patients");
        assert!(kw.contains(&"braden".to_string()));
        assert!(kw.contains(&"wound".to_string()));
    }

    #[tokio::test]
    async fn highest_confidence_wins_and_first_wins_ties() {
        let store: Arc<dyn SemanticIndexStore> = Arc::new(AssessmentStore {
            hits: vec![
                hit("a1", "Braden Scale", 0.9),
                hit("a2", "Braden Scale Pediatric", 0.9),
                hit("a3", "Norton Scale", 0.7),
            ],
            delay: None,
        });
        match resolve(
            "Show Braden assessments",
            &slot(),
            "cust",
            &store,
            Duration::from_secs(5),
        )
        .await
        {
            StrategyOutcome::Hit(r) => {
                assert_eq!(r.value.as_str().unwrap(), "Braden Scale");
                match r.audit {
                    Some(AuditRecord::Assessment(a)) => assert_eq!(a.assessment_id, "a1"),
                    other => panic!("expected assessment audit, got {:?}", other),
                }
            }
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn no_domain_keywords_means_miss() {
        let store: Arc<dyn SemanticIndexStore> = Arc::new(AssessmentStore {
            hits: vec![],
            delay: None,
        });
        assert!(matches!(
            resolve(
                "Show me everything",
                &slot(),
                "cust",
                &store,
                Duration::from_secs(5)
            )
            .await,
            StrategyOutcome::Miss
        ));
    }

    #[tokio::test]
    async fn slow_store_times_out_to_a_miss() {
        let store: Arc<dyn SemanticIndexStore> = Arc::new(AssessmentStore {
            hits: vec![hit("a1", "Braden Scale", 0.9)],
            delay: Some(Duration::from_millis(200)),
        });
        assert!(matches!(
            resolve(
                "Show Braden assessments",
                &slot(),
                "cust",
                &store,
                Duration::from_millis(10)
            )
            .await,
            StrategyOutcome::Miss
        ));
    }
}
