//! Time-window resolver
//!
//! Parses phrases like "12 weeks", "within 4 weeks", "last 3 months" into a
//! canonical day count. Tolerance-flavored slots (named or marked as such)
//! switch to the tolerance phrase family, which requires an explicit
//! plus-or-minus style cue.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;

use crate::catalog::types::PlaceholderSlot;

use super::{Resolution, StrategyKind, StrategyOutcome};

lazy_static! {
    static ref WINDOW: Regex = Regex::new(
        r"(?i)\b(?:(within|in|last|past|over|during)\s+(?:the\s+)?)?(\d{1,4})\s*(day|week|month|quarter|year)s?\b"
    )
    .unwrap();
    static ref TOLERANCE: Regex = Regex::new(
        r"(?i)(?:within|plus or minus|\+/-|give or take|tolerance of)\s+(\d{1,4})\s*(day|week|month|quarter|year)s?\b"
    )
    .unwrap();
}

fn unit_days(unit: &str) -> i64 {
    match unit.to_lowercase().as_str() {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "quarter" => 90,
        "year" => 365,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeFlavor {
    Window,
    Tolerance,
}

fn flavor(slot: &PlaceholderSlot) -> Option<TimeFlavor> {
    let name = slot.name.to_lowercase();
    if slot.semantic == "time_tolerance" || name.contains("tolerance") {
        return Some(TimeFlavor::Tolerance);
    }
    if slot.semantic == "time_window"
        || name.contains("window")
        || name.contains("time")
        || name.contains("period")
        || name.contains("duration")
    {
        return Some(TimeFlavor::Window);
    }
    None
}

pub fn resolve(question: &str, slot: &PlaceholderSlot) -> StrategyOutcome {
    let flavor = match flavor(slot) {
        Some(f) => f,
        None => return StrategyOutcome::Miss,
    };

    let (count, unit, cued, matched) = match flavor {
        TimeFlavor::Tolerance => match TOLERANCE.captures(question) {
            Some(cap) => (
                cap[1].to_string(),
                cap[2].to_string(),
                true,
                cap[0].to_string(),
            ),
            None => return StrategyOutcome::Miss,
        },
        TimeFlavor::Window => match WINDOW.captures(question) {
            Some(cap) => (
                cap[2].to_string(),
                cap[3].to_string(),
                cap.get(1).is_some(),
                cap[0].to_string(),
            ),
            None => return StrategyOutcome::Miss,
        },
    };

    let n: i64 = match count.parse() {
        Ok(n) => n,
        Err(_) => return StrategyOutcome::Miss,
    };
    let days = n * unit_days(&unit);
    if days <= 0 {
        return StrategyOutcome::Reject(format!(
            "'{}' is not a usable time window",
            matched.trim()
        ));
    }

    StrategyOutcome::Hit(Resolution {
        value: json!(days),
        display: format!("{} {}{} ({} days)", n, unit, plural(n), days),
        confidence: if cued { 0.95 } else { 0.9 },
        strategy: StrategyKind::TimeWindow,
        source_phrase: matched.trim().to_string(),
        audit: None,
    })
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
