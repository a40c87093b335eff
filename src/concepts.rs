//! Concept Expander
//!
//! Turns a parsed intent (metric phrases, filter phrases, intent type) into a
//! bounded, deduplicated, ranked list of search concepts for the semantic
//! searcher. Pure function: no network, no storage, idempotent.

use itertools::Itertools;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strsim::normalized_levenshtein;

use crate::config::ResolverConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConceptSource {
    Metric,
    Filter,
    IntentType,
}

impl ConceptSource {
    fn label(&self) -> &'static str {
        match self {
            ConceptSource::Metric => "metric",
            ConceptSource::Filter => "filter",
            ConceptSource::IntentType => "intent",
        }
    }
}

/// A normalized semantic search term. Built fresh per question, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub text: String,
    pub source: ConceptSource,
    pub score: f64,
    /// Human-readable origin, for debugging only.
    pub provenance: String,
}

/// One filter phrase from intent parsing. `schema_value` is the schema value
/// the phrase mapped to; `None` marks the filter unresolved, which blocks
/// direct generation until the caller dispositions it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterTerm {
    pub phrase: String,
    pub original: String,
    pub schema_value: Option<String>,
}

/// Parsed intent for one question, as produced by the upstream intent parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSummary {
    pub intent_type: String,
    pub metrics: Vec<String>,
    pub filters: Vec<FilterTerm>,
}

lazy_static! {
    /// Measurement-concept canonicalization table. Free-text metric phrasings
    /// map onto the canonical term the schema index is built around.
    static ref MEASUREMENT_CONCEPTS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("healing rate", "wound healing rate");
        m.insert("rate of healing", "wound healing rate");
        m.insert("healing velocity", "wound healing rate");
        m.insert("wound size", "wound surface area");
        m.insert("wound area", "wound surface area");
        m.insert("area reduction", "wound area reduction");
        m.insert("size reduction", "wound area reduction");
        m.insert("closure rate", "wound closure rate");
        m.insert("time to heal", "time to closure");
        m.insert("healing time", "time to closure");
        m.insert("pressure ulcer", "pressure injury");
        m.insert("bed sore", "pressure injury");
        m.insert("bedsore", "pressure injury");
        m.insert("braden", "braden scale score");
        m.insert("braden score", "braden scale score");
        m.insert("pain level", "pain score");
        m.insert("pain rating", "pain score");
        m.insert("infection rate", "wound infection rate");
        m.insert("readmission", "readmission rate");
        m.insert("length of stay", "length of stay");
        m.insert("los", "length of stay");
        m
    };

    /// Keywords contributed by each known intent type.
    static ref INTENT_KEYWORDS: HashMap<&'static str, &'static [&'static str]> = {
        let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        m.insert("trend_analysis", &["trend", "over time", "change"]);
        m.insert("comparison", &["compare", "versus", "difference"]);
        m.insert("aggregation", &["total", "average", "count"]);
        m.insert("distribution", &["distribution", "breakdown", "by group"]);
        m.insert("outcome_analysis", &["outcome", "improvement", "result"]);
        m
    };
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(phrase: &str) -> String {
    let stripped: String = phrase
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form: measurement table hit, else the normalized phrase.
fn canonicalize(phrase: &str) -> String {
    let norm = normalize(phrase);
    MEASUREMENT_CONCEPTS
        .get(norm.as_str())
        .map(|c| c.to_string())
        .unwrap_or(norm)
}

/// Token-sorted form with stopwords dropped, so "rate of healing" and
/// "healing rate" compare equal during dedup.
fn token_signature(text: &str) -> String {
    const STOPWORDS: [&str; 8] = ["of", "the", "a", "an", "by", "for", "in", "per"];
    text.split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .sorted_unstable()
        .join(" ")
}

struct RankedPhrase {
    canonical: String,
    frequency: usize,
    first_index: usize,
    original: String,
}

pub struct ConceptExpander {
    config: ResolverConfig,
}

impl ConceptExpander {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Expand an intent into at most `max_concepts` (clamped to the
    /// configured ceiling) deduplicated concepts, metric-sourced first.
    pub fn expand(&self, intent: &IntentSummary, max_concepts: Option<usize>) -> Vec<Concept> {
        let cap = max_concepts
            .unwrap_or(self.config.max_concepts)
            .min(self.config.max_concepts);

        let metric_phrases: Vec<String> = intent
            .metrics
            .iter()
            .take(self.config.max_metric_phrases)
            .cloned()
            .collect();
        let filter_phrases: Vec<String> = intent
            .filters
            .iter()
            .take(self.config.max_filter_phrases)
            .map(|f| f.phrase.clone())
            .collect();
        let intent_phrases: Vec<String> = self
            .intent_keywords(&intent.intent_type)
            .into_iter()
            .take(self.config.max_intent_keywords)
            .collect();

        let ranked_metrics = self.rank(&metric_phrases);
        let ranked_filters = self.rank(&filter_phrases);
        let ranked_intent = self.rank(&intent_phrases);

        // Priority merge: metrics, then filters, then intent keywords.
        let mut concepts: Vec<Concept> = Vec::new();
        for (ranked, source) in [
            (ranked_metrics, ConceptSource::Metric),
            (ranked_filters, ConceptSource::Filter),
            (ranked_intent, ConceptSource::IntentType),
        ] {
            for rp in ranked {
                if concepts.len() >= cap {
                    break;
                }
                if self.is_duplicate(&rp.canonical, &concepts) {
                    continue;
                }
                let score = rp.frequency as f64 / self.config.max_concept_frequency as f64;
                concepts.push(Concept {
                    provenance: format!(
                        "{} phrase '{}' -> '{}' (x{})",
                        source.label(),
                        rp.original,
                        rp.canonical,
                        rp.frequency
                    ),
                    text: rp.canonical,
                    source,
                    score,
                });
            }
        }
        concepts
    }

    /// Canonicalize, count (frequency capped), rank by frequency descending
    /// then first-occurrence index ascending.
    fn rank(&self, phrases: &[String]) -> Vec<RankedPhrase> {
        let mut by_key: HashMap<String, RankedPhrase> = HashMap::new();
        for (idx, phrase) in phrases.iter().enumerate() {
            let canonical = canonicalize(phrase);
            if canonical.is_empty() {
                continue;
            }
            let entry = by_key.entry(canonical.clone()).or_insert(RankedPhrase {
                canonical,
                frequency: 0,
                first_index: idx,
                original: phrase.clone(),
            });
            if entry.frequency < self.config.max_concept_frequency {
                entry.frequency += 1;
            }
        }
        let mut ranked: Vec<RankedPhrase> = by_key.into_values().collect();
        ranked.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then(a.first_index.cmp(&b.first_index))
        });
        ranked
    }

    /// Duplicate check: exact canonical match, equal token signature, or
    /// normalized Levenshtein similarity at/above the configured threshold.
    fn is_duplicate(&self, candidate: &str, accepted: &[Concept]) -> bool {
        let cand_sig = token_signature(candidate);
        accepted.iter().any(|c| {
            c.text == candidate
                || token_signature(&c.text) == cand_sig
                || normalized_levenshtein(&c.text, candidate)
                    >= self.config.concept_similarity_threshold
        })
    }

    fn intent_keywords(&self, intent_type: &str) -> Vec<String> {
        let norm = normalize(intent_type);
        if let Some(words) = INTENT_KEYWORDS.get(norm.replace(' ', "_").as_str()) {
            return words.iter().map(|w| w.to_string()).collect();
        }
        // Unknown intent types contribute their own tokens.
        norm.split_whitespace().map(|t| t.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expander() -> ConceptExpander {
        ConceptExpander::new(ResolverConfig::default())
    }

    fn intent(metrics: &[&str], filters: &[&str]) -> IntentSummary {
        IntentSummary {
            intent_type: "trend_analysis".to_string(),
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            filters: filters
                .iter()
                .map(|s| FilterTerm {
                    phrase: s.to_string(),
                    original: s.to_string(),
                    schema_value: Some(s.to_string()),
                })
                .collect(),
        }
    }

    // provenance carries "(xN)"
    fn frequency_hint(c: &Concept) -> usize {
        c.provenance
            .rsplit("(x")
            .next()
            .and_then(|s| s.trim_end_matches(')').parse().ok())
            .unwrap_or(0)
    }

    #[test]
    fn synonyms_collapse_to_one_concept() {
        let concepts = expander().expand(&intent(&["healing rate", "rate of healing"], &[]), None);
        let healing: Vec<_> = concepts
            .iter()
            .filter(|c| c.text == "wound healing rate")
            .collect();
        assert_eq!(healing.len(), 1);
        assert_eq!(frequency_hint(healing[0]), 2);
    }

    #[test]
    fn near_duplicates_collapse_by_edit_distance() {
        let concepts = expander().expand(
            &intent(&["wound measurement"], &["wound measurements"]),
            None,
        );
        let measurement: Vec<_> = concepts
            .iter()
            .filter(|c| c.text.contains("measurement"))
            .collect();
        assert_eq!(measurement.len(), 1);
    }

    #[test]
    fn expansion_is_idempotent() {
        let i = intent(
            &["healing rate", "wound area", "healing rate"],
            &["diabetic patients", "facility A"],
        );
        let e = expander();
        let first: Vec<String> = e.expand(&i, None).iter().map(|c| c.text.clone()).collect();
        let second: Vec<String> = e.expand(&i, None).iter().map(|c| c.text.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn metrics_rank_ahead_of_filters_and_intent() {
        let concepts = expander().expand(&intent(&["wound area"], &["facility A"]), None);
        assert_eq!(concepts[0].source, ConceptSource::Metric);
        let filter_pos = concepts
            .iter()
            .position(|c| c.source == ConceptSource::Filter)
            .unwrap();
        let intent_pos = concepts
            .iter()
            .position(|c| c.source == ConceptSource::IntentType)
            .unwrap();
        assert!(filter_pos < intent_pos);
    }

    #[test]
    fn ceiling_is_clamped_to_default() {
        let metrics: Vec<String> = (0..10).map(|i| format!("metric {}", i)).collect();
        let filters: Vec<&str> = vec![];
        let mut i = intent(&[], &filters);
        i.metrics = metrics;
        // Caller asks for 100, ceiling stays at 25.
        let concepts = expander().expand(&i, Some(100));
        assert!(concepts.len() <= 25);
    }

    #[test]
    fn repeated_phrase_frequency_is_capped() {
        let mut i = intent(&[], &[]);
        i.metrics = vec!["healing rate".to_string(); 10];
        let concepts = expander().expand(&i, None);
        assert_eq!(frequency_hint(&concepts[0]), 5);
        assert!((concepts[0].score - 1.0).abs() < f64::EPSILON);
    }
}
