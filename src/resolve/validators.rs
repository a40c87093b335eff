//! Slot validators
//!
//! Every resolved value, whatever strategy produced it, passes through the
//! slot's declared type coercion and rule checks before it can fill the
//! slot. Failures carry a human-readable reason that ends up verbatim in
//! the regenerated clarification.

use serde_json::Value;

use crate::catalog::types::{PlaceholderSlot, SlotType};

/// Coerce to the declared type, then apply rule checks. Returns the coerced
/// value or the failure reason.
pub fn apply(slot: &PlaceholderSlot, value: Value) -> Result<Value, String> {
    let coerced = coerce(slot, value)?;
    for rule in &slot.validators {
        check_rule(slot, rule, &coerced)?;
    }
    Ok(coerced)
}

fn coerce(slot: &PlaceholderSlot, value: Value) -> Result<Value, String> {
    match slot.slot_type {
        SlotType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|n| serde_json::json!(n))
                .map_err(|_| format!("'{}' is not a number for '{}'", s, slot.name)),
            _ => Err(format!("'{}' expects a numeric value", slot.name)),
        },
        SlotType::Integer => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.fract() == 0.0 {
                    Ok(serde_json::json!(f as i64))
                } else {
                    Err(format!("'{}' expects a whole number, got {}", slot.name, f))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| serde_json::json!(n))
                .map_err(|_| format!("'{}' is not a whole number for '{}'", s, slot.name)),
            _ => Err(format!("'{}' expects a whole number", slot.name)),
        },
        SlotType::Text | SlotType::Date => match value {
            Value::String(_) => Ok(value),
            other => Ok(Value::String(stringify(&other))),
        },
    }
}

fn check_rule(slot: &PlaceholderSlot, rule: &str, value: &Value) -> Result<(), String> {
    let rule = rule.trim();
    if rule.eq_ignore_ascii_case("non-empty") {
        if value.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
            return Err(format!("'{}' must not be empty", slot.name));
        }
        return Ok(());
    }
    if let Some(bound) = rule.strip_prefix("min:") {
        let bound: f64 = bound
            .trim()
            .parse()
            .map_err(|_| format!("invalid validator '{}' on '{}'", rule, slot.name))?;
        if magnitude(value) < bound {
            return Err(format!(
                "value {} for '{}' is below the minimum of {}",
                stringify(value),
                slot.name,
                bound
            ));
        }
        return Ok(());
    }
    if let Some(bound) = rule.strip_prefix("max:") {
        let bound: f64 = bound
            .trim()
            .parse()
            .map_err(|_| format!("invalid validator '{}' on '{}'", rule, slot.name))?;
        if magnitude(value) > bound {
            return Err(format!(
                "value {} for '{}' exceeds the maximum of {}",
                stringify(value),
                slot.name,
                bound
            ));
        }
        return Ok(());
    }
    // Unknown rules are an authoring mistake, not a resolution failure.
    Ok(())
}

/// Numeric magnitude for numbers, character length for strings.
fn magnitude(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.chars().count() as f64,
        _ => 0.0,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slot(slot_type: SlotType, validators: &[&str]) -> PlaceholderSlot {
        PlaceholderSlot {
            name: "time_window".to_string(),
            slot_type,
            semantic: "time_window".to_string(),
            required: true,
            default: None,
            validators: validators.iter().map(|s| s.to_string()).collect(),
            examples: vec![],
        }
    }

    #[test]
    fn coerces_strings_to_declared_numeric_types() {
        let s = slot(SlotType::Integer, &[]);
        assert_eq!(apply(&s, json!("28")).unwrap(), json!(28));
        let s = slot(SlotType::Number, &[]);
        assert_eq!(apply(&s, json!("0.5")).unwrap(), json!(0.5));
    }

    #[test]
    fn max_failure_reason_states_the_bound() {
        let s = slot(SlotType::Integer, &["min:1", "max:365"]);
        let reason = apply(&s, json!(3650)).unwrap_err();
        assert!(reason.contains("maximum of 365"), "reason: {}", reason);
    }

    #[test]
    fn min_failure_reason_states_the_bound() {
        let s = slot(SlotType::Integer, &["min:1"]);
        let reason = apply(&s, json!(0)).unwrap_err();
        assert!(reason.contains("minimum of 1"));
    }

    #[test]
    fn non_empty_rejects_blank_strings() {
        let s = PlaceholderSlot {
            slot_type: SlotType::Text,
            validators: vec!["non-empty".to_string()],
            ..slot(SlotType::Text, &[])
        };
        assert!(apply(&s, json!("  ")).is_err());
        assert!(apply(&s, json!("healed")).is_ok());
    }

    #[test]
    fn fractional_value_fails_integer_coercion() {
        let s = slot(SlotType::Integer, &[]);
        assert!(apply(&s, json!(4.5)).is_err());
    }
}
