//! Percentage resolver
//!
//! "50%" parses to 0.5. Bare decimals already in [0,1] are accepted only
//! when the question carries a percentage-suggestive cue, so an unrelated
//! count like "0.5" in a dosage never fills a percentage slot. Out-of-range
//! values are rejected, never clamped.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use crate::catalog::types::PlaceholderSlot;

use super::{Resolution, StrategyKind, StrategyOutcome};

lazy_static! {
    static ref PERCENT: Regex = Regex::new(r"(-?\d+(?:\.\d+)?)\s*%").unwrap();
    static ref BARE_DECIMAL: Regex = Regex::new(r"\b(\d+\.\d+)\b").unwrap();
    static ref CUE: Regex = Regex::new(r"(?i)\b(percent|percentage|rate|ratio|proportion)\b|%").unwrap();
}

fn applicable(slot: &PlaceholderSlot) -> bool {
    let name = slot.name.to_lowercase();
    slot.semantic == "percentage"
        || name.contains("percent")
        || name.contains("threshold")
        || name.contains("ratio")
}

pub fn resolve(question: &str, slot: &PlaceholderSlot) -> StrategyOutcome {
    if !applicable(slot) {
        return StrategyOutcome::Miss;
    }

    if let Some(cap) = PERCENT.captures(question) {
        let p: f64 = match cap[1].parse() {
            Ok(p) => p,
            Err(_) => return StrategyOutcome::Miss,
        };
        if !(0.0..=100.0).contains(&p) {
            return StrategyOutcome::Reject(format!(
                "'{}' is outside the allowed 0-100 percentage range",
                cap[0].trim()
            ));
        }
        return StrategyOutcome::Hit(Resolution {
            value: json!(p / 100.0),
            display: format!("{}% ({})", &cap[1], p / 100.0),
            confidence: 0.95,
            strategy: StrategyKind::Percentage,
            source_phrase: cap[0].trim().to_string(),
            audit: None,
        });
    }

    // Bare decimal path, gated on a percentage cue elsewhere in the question.
    if CUE.is_match(question) {
        if let Some(cap) = BARE_DECIMAL.captures(question) {
            let d: f64 = match cap[1].parse() {
                Ok(d) => d,
                Err(_) => return StrategyOutcome::Miss,
            };
            if !(0.0..=1.0).contains(&d) {
                return StrategyOutcome::Reject(format!(
                    "'{}' is outside the allowed 0-1 decimal range",
                    &cap[1]
                ));
            }
            return StrategyOutcome::Hit(Resolution {
                value: json!(d),
                display: format!("{} ({}%)", d, d * 100.0),
                confidence: 0.8,
                strategy: StrategyKind::Percentage,
                source_phrase: cap[1].to_string(),
                audit: None,
            });
        }
    }

    StrategyOutcome::Miss
}
