//! Static template bundle
//!
//! The built-in, pre-approved templates the catalog serves when the live
//! store is toggled off or unavailable. All read-only, all schema-qualified.

use serde_json::json;

use super::types::{PlaceholderSlot, SlotType, TemplateRow};

fn slot(
    name: &str,
    slot_type: SlotType,
    semantic: &str,
    required: bool,
    default: Option<serde_json::Value>,
    validators: &[&str],
    examples: &[&str],
) -> PlaceholderSlot {
    PlaceholderSlot {
        name: name.to_string(),
        slot_type,
        semantic: semantic.to_string(),
        required,
        default,
        validators: validators.iter().map(|s| s.to_string()).collect(),
        examples: examples.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn static_rows() -> Vec<TemplateRow> {
    vec![
        TemplateRow {
            name: "healing_rate_by_time_window".to_string(),
            sql_pattern: "SELECT patient_id, wound_id, healing_rate \
                          FROM analytics.wound_assessments \
                          WHERE days_since_baseline <= {time_window} \
                          ORDER BY healing_rate DESC"
                .to_string(),
            version: "1.2".to_string(),
            placeholders: vec!["time_window".to_string()],
            placeholder_specs: vec![slot(
                "time_window",
                SlotType::Integer,
                "time_window",
                true,
                None,
                &["min:1", "max:365"],
                &["4 weeks", "90 days"],
            )],
            keywords: vec!["healing".to_string(), "heal".to_string(), "weeks".to_string()],
            tags: vec!["wound".to_string(), "outcome".to_string()],
            question_examples: vec![
                "Show me healing data within 4 weeks".to_string(),
                "Which wounds healed in the last 12 weeks?".to_string(),
            ],
            intent: "trend_analysis".to_string(),
            status: "approved".to_string(),
            success_count: 42,
            usage_count: 50,
        },
        TemplateRow {
            name: "area_reduction_above_threshold".to_string(),
            sql_pattern: "SELECT patient_id, wound_id, area_reduction \
                          FROM analytics.wound_measurements \
                          WHERE area_reduction >= {reduction_threshold} \
                            AND days_since_baseline <= {time_window}"
                .to_string(),
            version: "1.0".to_string(),
            placeholders: vec![
                "reduction_threshold".to_string(),
                "time_window".to_string(),
            ],
            placeholder_specs: vec![
                slot(
                    "reduction_threshold",
                    SlotType::Number,
                    "percentage",
                    true,
                    None,
                    &["min:0", "max:1"],
                    &["50%", "0.5"],
                ),
                slot(
                    "time_window",
                    SlotType::Integer,
                    "time_window",
                    false,
                    Some(json!(28)),
                    &["min:1", "max:365"],
                    &["4 weeks"],
                ),
            ],
            keywords: vec![
                "reduction".to_string(),
                "area".to_string(),
                "percent".to_string(),
            ],
            tags: vec!["wound".to_string(), "measurement".to_string()],
            question_examples: vec![
                "Which wounds reduced in area by 50% within 4 weeks?".to_string(),
            ],
            intent: "outcome_analysis".to_string(),
            status: "approved".to_string(),
            success_count: 17,
            usage_count: 20,
        },
        TemplateRow {
            name: "assessments_by_type".to_string(),
            sql_pattern: "SELECT patient_id, assessed_at, score \
                          FROM analytics.assessments \
                          WHERE assessment_type = '{assessment_type}' \
                          ORDER BY assessed_at DESC"
                .to_string(),
            version: "2.1".to_string(),
            placeholders: vec!["assessment_type".to_string()],
            placeholder_specs: vec![slot(
                "assessment_type",
                SlotType::Text,
                "assessment_type",
                true,
                None,
                &["non-empty"],
                &["Braden Scale", "Wound Assessment"],
            )],
            keywords: vec!["assessment".to_string(), "braden".to_string()],
            tags: vec!["assessment".to_string()],
            question_examples: vec![
                "Show Braden assessments for my patients".to_string(),
                "List wound assessment scores".to_string(),
            ],
            intent: "aggregation".to_string(),
            status: "approved".to_string(),
            success_count: 30,
            usage_count: 36,
        },
        TemplateRow {
            name: "patients_by_field_status".to_string(),
            sql_pattern: "SELECT patient_id, {field_name} AS field_value \
                          FROM analytics.patient_fields \
                          WHERE {field_name} = '{status_value}'"
                .to_string(),
            version: "1.0".to_string(),
            placeholders: vec!["field_name".to_string(), "status_value".to_string()],
            placeholder_specs: vec![
                slot(
                    "field_name",
                    SlotType::Text,
                    "field_name",
                    true,
                    None,
                    &["non-empty"],
                    &["wound status", "discharge disposition"],
                ),
                slot(
                    "status_value",
                    SlotType::Text,
                    "enum",
                    true,
                    None,
                    &["non-empty"],
                    &["healed", "active"],
                ),
            ],
            keywords: vec!["status".to_string(), "patients".to_string()],
            tags: vec!["cohort".to_string()],
            question_examples: vec![
                "Show patients with wound status healed".to_string(),
            ],
            intent: "distribution".to_string(),
            status: "approved".to_string(),
            success_count: 8,
            usage_count: 12,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::normalize_row;
    use crate::catalog::validate::validate_template;

    #[test]
    fn bundle_passes_hard_validation() {
        for row in static_rows() {
            let template = normalize_row(row);
            validate_template(&template).expect("static template must validate");
        }
    }
}
