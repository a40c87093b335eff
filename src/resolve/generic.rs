//! Generic extraction heuristics
//!
//! Last resolver before defaults: a library of keyword/regex heuristics
//! keyed by placeholder name substrings (location, status, type, numeric,
//! date), plus an examples-based heuristic that looks for capitalized
//! tokens shared between the question and the template's example questions.
//! Hits are low-confidence and fill silently.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;

use crate::catalog::types::PlaceholderSlot;

use super::{Resolution, StrategyKind, StrategyOutcome};

lazy_static! {
    static ref LOCATION: Regex =
        Regex::new(r"(?:\bin|\bat|\bfrom)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").unwrap();
    static ref TYPE_OF: Regex = Regex::new(r"(?i)\b([a-z]+)\s+type\b|\btype\s+([a-z]+)\b").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\b(\d+(?:\.\d+)?)\b").unwrap();
    static ref ISO_DATE: Regex = Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap();
    static ref CAPITALIZED: Regex = Regex::new(r"\b([A-Z][a-z]+)\b").unwrap();
}

const STATUS_WORDS: [&str; 8] = [
    "active",
    "healed",
    "open",
    "closed",
    "resolved",
    "pending",
    "discharged",
    "admitted",
];

fn hit(value: serde_json::Value, display: String, source_phrase: String) -> StrategyOutcome {
    StrategyOutcome::Hit(Resolution {
        value,
        display,
        confidence: 0.55,
        strategy: StrategyKind::Generic,
        source_phrase,
        audit: None,
    })
}

pub fn resolve(question: &str, slot: &PlaceholderSlot, examples: &[String]) -> StrategyOutcome {
    let name = slot.name.to_lowercase();

    if name.contains("city") || name.contains("location") || name.contains("facility") {
        if let Some(cap) = LOCATION.captures(question) {
            let loc = cap[1].to_string();
            return hit(json!(loc.clone()), loc.clone(), loc);
        }
    }

    if name.contains("status") || name.contains("state") || name.contains("value") {
        let lower = question.to_lowercase();
        if let Some(word) = STATUS_WORDS
            .iter()
            .find(|w| lower.split_whitespace().any(|t| t == **w))
        {
            return hit(json!(word), word.to_string(), word.to_string());
        }
    }

    if name.contains("type") || name.contains("kind") || name.contains("category") {
        if let Some(cap) = TYPE_OF.captures(question) {
            let word = cap
                .get(1)
                .or_else(|| cap.get(2))
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default();
            if !word.is_empty() {
                return hit(json!(word.clone()), word.clone(), word);
            }
        }
    }

    if name.contains("count")
        || name.contains("limit")
        || name.contains("num")
        || name.contains("amount")
    {
        if let Some(cap) = NUMBER.captures(question) {
            if let Ok(n) = cap[1].parse::<f64>() {
                return hit(json!(n), cap[1].to_string(), cap[0].to_string());
            }
        }
    }

    if name.contains("date") || name.contains("day") {
        if let Some(cap) = ISO_DATE.captures(question) {
            let d = cap[1].to_string();
            return hit(json!(d.clone()), d.clone(), d);
        }
    }

    // Examples heuristic: a capitalized token that appears both in the
    // question and in one of the template's example questions is probably
    // the same kind of value this slot expects.
    let question_caps = capitalized_tokens(question);
    for example in examples {
        if let Some(shared) = capitalized_tokens(example)
            .intersection(&question_caps)
            .next()
        {
            return hit(json!(shared.clone()), shared.clone(), shared.clone());
        }
    }

    StrategyOutcome::Miss
}

/// Capitalized tokens, skipping the sentence-initial word.
fn capitalized_tokens(text: &str) -> HashSet<String> {
    CAPITALIZED
        .captures_iter(text)
        .filter_map(|cap| {
            let m = cap.get(1).unwrap();
            (m.start() > 0).then(|| m.as_str().to_string())
        })
        .collect()
}
