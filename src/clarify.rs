//! Clarification builder
//!
//! Converts an unresolved placeholder plus whatever semantic context is
//! available into a structured question for the user: preset options for
//! percentage and time-window slots, declared enum values for enum/status
//! slots, and a bounded free-text fallback for everything else. Never fails
//! hard; every degraded path still yields an answerable clarification.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::catalog::types::PlaceholderSlot;
use crate::semantic::SemanticSearchResult;
use crate::stores::SemanticIndexStore;

/// Character bounds and hint for free-text answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeTextSpec {
    pub min_chars: usize,
    pub max_chars: usize,
    pub hint: String,
}

/// What is asked of the user when no value could be resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationRequest {
    pub placeholder: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<String>>,
    pub freeform_allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_text: Option<FreeTextSpec>,
    pub reason: String,
    pub semantic: String,
}

/// Shown instead of silently accepting a high-confidence auto-detected value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPrompt {
    pub placeholder: String,
    pub detected_value: serde_json::Value,
    pub display_label: String,
    pub original_input: String,
    pub confidence: f64,
    pub semantic: String,
}

pub const TIME_WINDOW_PRESETS: [&str; 3] =
    ["4 weeks (28 days)", "8 weeks (56 days)", "12 weeks (84 days)"];
pub const PERCENTAGE_PRESETS: [&str; 3] = ["25%", "50%", "75%"];

pub struct ClarificationBuilder {
    store: Arc<dyn SemanticIndexStore>,
    lookup_timeout: Duration,
}

impl ClarificationBuilder {
    pub fn new(store: Arc<dyn SemanticIndexStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// `known_enum_values` carries values already discovered earlier in the
    /// same resolution pass, so enum slots avoid a second store lookup keyed
    /// on the slot's own name.
    pub async fn build(
        &self,
        customer_id: &str,
        placeholder: &str,
        slot: Option<&PlaceholderSlot>,
        context: &[SemanticSearchResult],
        known_enum_values: Option<Vec<String>>,
        reason: Option<String>,
    ) -> ClarificationRequest {
        let slot = match slot {
            Some(s) => s,
            None => return minimal(placeholder, reason),
        };
        let semantic = semantic_category(slot);
        let reason =
            reason.unwrap_or_else(|| format!("no value could be resolved for '{}'", slot.name));

        match semantic.as_str() {
            "percentage" => ClarificationRequest {
                placeholder: placeholder.to_string(),
                prompt: format!(
                    "What percentage should be used for '{}'? Enter a value between 0 and 100.",
                    display_name(&slot.name)
                ),
                options: Some(PERCENTAGE_PRESETS.iter().map(|s| s.to_string()).collect()),
                examples: non_empty(slot.examples.clone()),
                freeform_allowed: true,
                free_text: None,
                reason,
                semantic,
            },
            "time_window" | "time_tolerance" => {
                // Date-typed fields already discovered for this question make
                // useful anchors alongside the week presets.
                let date_fields: Vec<String> = context
                    .iter()
                    .filter(|r| r.data_type.eq_ignore_ascii_case("date"))
                    .map(|r| format!("{}.{}", r.table_or_form_name, r.field_name))
                    .collect();
                ClarificationRequest {
                    placeholder: placeholder.to_string(),
                    prompt: format!(
                        "What time window should be used for '{}'?",
                        display_name(&slot.name)
                    ),
                    options: Some(TIME_WINDOW_PRESETS.iter().map(|s| s.to_string()).collect()),
                    examples: non_empty(date_fields),
                    freeform_allowed: true,
                    free_text: None,
                    reason,
                    semantic,
                }
            }
            "enum" | "status" => {
                let options = match known_enum_values {
                    Some(values) => non_empty(values),
                    None => match timeout(
                        self.lookup_timeout,
                        self.store.field_enum_values(customer_id, &slot.name),
                    )
                    .await
                    {
                        Ok(Ok(values)) => non_empty(values),
                        Ok(Err(e)) => {
                            warn!(slot = %slot.name, error = %e, "enum lookup failed, clarifying without options");
                            None
                        }
                        Err(_) => {
                            warn!(slot = %slot.name, "enum lookup timed out, clarifying without options");
                            None
                        }
                    },
                };
                ClarificationRequest {
                    placeholder: placeholder.to_string(),
                    prompt: format!(
                        "Which value of '{}' did you mean?",
                        display_name(&slot.name)
                    ),
                    options,
                    examples: non_empty(slot.examples.clone()),
                    freeform_allowed: true,
                    free_text: None,
                    reason,
                    semantic,
                }
            }
            _ => ClarificationRequest {
                placeholder: placeholder.to_string(),
                prompt: format!(
                    "Please provide a value for '{}'.",
                    display_name(&slot.name)
                ),
                options: None,
                examples: non_empty(slot.examples.clone()),
                freeform_allowed: true,
                free_text: Some(FreeTextSpec {
                    min_chars: 1,
                    max_chars: 200,
                    hint: hint_for(&semantic),
                }),
                reason,
                semantic,
            },
        }
    }
}

/// Minimal "what did you mean" clarification, used when no slot definition
/// exists or the richer building path failed.
pub fn minimal(placeholder: &str, reason: Option<String>) -> ClarificationRequest {
    ClarificationRequest {
        placeholder: placeholder.to_string(),
        prompt: format!("What did you mean by '{}'?", display_name(placeholder)),
        options: None,
        examples: None,
        freeform_allowed: true,
        free_text: Some(FreeTextSpec {
            min_chars: 1,
            max_chars: 200,
            hint: "Describe the value in your own words".to_string(),
        }),
        reason: reason.unwrap_or_else(|| format!("'{}' has no slot definition", placeholder)),
        semantic: "unknown".to_string(),
    }
}

/// Resolve the slot's semantic category, falling back to name heuristics the
/// way templates authored without explicit semantics expect.
fn semantic_category(slot: &PlaceholderSlot) -> String {
    if !slot.semantic.is_empty() {
        return slot.semantic.clone();
    }
    let name = slot.name.to_lowercase();
    if name.contains("percent") || name.contains("threshold") {
        "percentage".to_string()
    } else if name.contains("tolerance") {
        "time_tolerance".to_string()
    } else if name.contains("window") || name.contains("time") || name.contains("period") {
        "time_window".to_string()
    } else if name.contains("status") {
        "status".to_string()
    } else {
        "text".to_string()
    }
}

fn hint_for(semantic: &str) -> String {
    match semantic {
        "field_name" => "Name the field or column you are interested in".to_string(),
        "assessment_type" => "Name the assessment, e.g. Braden Scale".to_string(),
        "location" => "Name a city, unit, or facility".to_string(),
        _ => "Enter the value as it appears in your data".to_string(),
    }
}

fn display_name(name: &str) -> String {
    name.replace('_', " ")
}

fn non_empty(v: Vec<String>) -> Option<Vec<String>> {
    (!v.is_empty()).then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::SlotType;
    use crate::error::{ResolverError, Result};
    use crate::semantic::ResultSource;
    use crate::stores::{AssessmentTypeHit, OntologyConcept, SearchTerm};
    use async_trait::async_trait;

    #[derive(Default)]
    struct EnumStore {
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl SemanticIndexStore for EnumStore {
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
            Ok(vec![])
        }
        async fn resolve_ontology(&self, _t: &str) -> Result<Option<OntologyConcept>> {
            Ok(None)
        }
        async fn field_enum_values(&self, _c: &str, _f: &str) -> Result<Vec<String>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ResolverError::Store("schema offline".to_string()));
            }
            Ok(vec!["healed".to_string(), "active".to_string()])
        }
    }

    fn slot(name: &str, semantic: &str) -> PlaceholderSlot {
        PlaceholderSlot {
            name: name.to_string(),
            slot_type: SlotType::Text,
            semantic: semantic.to_string(),
            required: true,
            default: None,
            validators: vec![],
            examples: vec![],
        }
    }

    fn builder(fail: bool) -> ClarificationBuilder {
        ClarificationBuilder::new(
            Arc::new(EnumStore { fail, delay: None }),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn time_window_gets_week_presets() {
        let s = slot("time_window", "time_window");
        let c = builder(false)
            .build("cust", "time_window", Some(&s), &[], None, None)
            .await;
        assert_eq!(
            c.options.unwrap(),
            vec![
                "4 weeks (28 days)".to_string(),
                "8 weeks (56 days)".to_string(),
                "12 weeks (84 days)".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn percentage_gets_presets_and_range_prompt() {
        let s = slot("reduction_threshold", "percentage");
        let c = builder(false)
            .build("cust", "reduction_threshold", Some(&s), &[], None, None)
            .await;
        assert!(c.prompt.contains("between 0 and 100"));
        assert_eq!(c.options.unwrap(), vec!["25%", "50%", "75%"]);
    }

    #[tokio::test]
    async fn enum_slot_surfaces_declared_values() {
        let s = slot("wound_status", "enum");
        let c = builder(false)
            .build("cust", "wound_status", Some(&s), &[], None, None)
            .await;
        assert_eq!(c.options.unwrap(), vec!["healed", "active"]);
    }

    #[tokio::test]
    async fn enum_lookup_failure_degrades_to_no_options() {
        let s = slot("wound_status", "enum");
        let c = builder(true)
            .build("cust", "wound_status", Some(&s), &[], None, None)
            .await;
        assert!(c.options.is_none());
        assert!(c.freeform_allowed);
    }

    #[tokio::test]
    async fn slow_enum_lookup_times_out_to_no_options() {
        let b = ClarificationBuilder::new(
            Arc::new(EnumStore {
                fail: false,
                delay: Some(Duration::from_millis(200)),
            }),
            Duration::from_millis(10),
        );
        let s = slot("wound_status", "enum");
        let c = b
            .build("cust", "wound_status", Some(&s), &[], None, None)
            .await;
        assert!(c.options.is_none());
        assert!(c.freeform_allowed);
    }

    #[tokio::test]
    async fn known_enum_values_bypass_the_store_lookup() {
        let s = slot("status_value", "status");
        // The store would fail; values carried over from field resolution win.
        let c = builder(true)
            .build(
                "cust",
                "status_value",
                Some(&s),
                &[],
                Some(vec!["healed".to_string(), "active".to_string()]),
                None,
            )
            .await;
        assert_eq!(c.options.unwrap(), vec!["healed", "active"]);
    }

    #[tokio::test]
    async fn missing_slot_definition_yields_minimal_clarification() {
        let c = builder(false)
            .build("cust", "mystery_value", None, &[], None, None)
            .await;
        assert!(c.prompt.contains("What did you mean by 'mystery value'"));
        assert!(c.free_text.is_some());
    }

    #[tokio::test]
    async fn date_fields_from_context_become_examples() {
        let s = slot("time_window", "time_window");
        let ctx = vec![SemanticSearchResult {
            id: "1".to_string(),
            source: ResultSource::Form,
            field_name: "assessed_at".to_string(),
            table_or_form_name: "wound_assessment".to_string(),
            concept_id: None,
            semantic_concept: "assessment date".to_string(),
            data_type: "date".to_string(),
            confidence: 0.9,
        }];
        let c = builder(false)
            .build("cust", "time_window", Some(&s), &ctx, None, None)
            .await;
        assert_eq!(
            c.examples.unwrap(),
            vec!["wound_assessment.assessed_at".to_string()]
        );
    }
}
