//! Template matcher
//!
//! Scores catalog templates against a question using keyword/tag hits, token
//! overlap with the template's name and intent, and the best Jaccard
//! similarity over its example questions, weighted by historical success
//! rate. Deterministic for fixed input: the sort is stable and ties keep
//! catalog order.

use std::collections::HashSet;
use std::sync::Arc;

use super::types::{CatalogSnapshot, QueryTemplate};

const KEYWORD_WEIGHT: f64 = 3.0;
const TOKEN_OVERLAP_WEIGHT: f64 = 1.0;
const EXAMPLE_WEIGHT: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct TemplateMatch {
    pub template: Arc<QueryTemplate>,
    pub score: f64,
    pub keyword_hits: usize,
    pub token_overlap: usize,
    pub example_similarity: f64,
}

pub struct TemplateMatcher {
    threshold: f64,
}

impl TemplateMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Rank all templates for a question, highest score first, top-k.
    pub fn rank(
        &self,
        question: &str,
        snapshot: &CatalogSnapshot,
        top_k: usize,
    ) -> Vec<TemplateMatch> {
        let normalized = question.to_lowercase();
        let question_tokens = tokenize(&normalized);

        let mut matches: Vec<TemplateMatch> = snapshot
            .templates
            .iter()
            .map(|t| self.score_one(&normalized, &question_tokens, t))
            .collect();
        // Stable sort: equal scores keep catalog order.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        matches
    }

    /// Best match above the acceptance threshold, or None so the caller
    /// falls back to direct generation.
    pub fn best(&self, question: &str, snapshot: &CatalogSnapshot) -> Option<TemplateMatch> {
        self.rank(question, snapshot, 1)
            .into_iter()
            .next()
            .filter(|m| m.score >= self.threshold)
    }

    fn score_one(
        &self,
        normalized_question: &str,
        question_tokens: &HashSet<String>,
        template: &Arc<QueryTemplate>,
    ) -> TemplateMatch {
        // Single-word keywords must match a whole token ("outcome" does not
        // hit "outcomes"); multi-word keywords match as a phrase.
        let keyword_hits = template
            .keywords
            .iter()
            .chain(template.tags.iter())
            .filter(|kw| {
                if kw.contains(' ') {
                    normalized_question.contains(kw.as_str())
                } else {
                    question_tokens.contains(kw.as_str())
                }
            })
            .count();

        let name_desc = format!("{} {}", template.name.replace('_', " "), template.intent);
        let token_overlap = tokenize(&name_desc.to_lowercase())
            .intersection(question_tokens)
            .count();

        let example_similarity = template
            .question_examples
            .iter()
            .map(|ex| jaccard(question_tokens, &tokenize(&ex.to_lowercase())))
            .fold(0.0_f64, f64::max);

        let raw = keyword_hits as f64 * KEYWORD_WEIGHT
            + token_overlap as f64 * TOKEN_OVERLAP_WEIGHT
            + example_similarity * EXAMPLE_WEIGHT;
        let score = match template.success_rate {
            Some(rate) => raw * (1.0 + rate),
            None => raw,
        };

        TemplateMatch {
            template: Arc::clone(template),
            score,
            keyword_hits,
            token_overlap,
            example_similarity,
        }
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}
