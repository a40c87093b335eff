//! Placeholder resolution cascade
//!
//! For each slot of a chosen template, strategies run in fixed priority
//! order and short-circuit on the first validated value: time window,
//! percentage, assessment type, field variable, generic extraction, then
//! the slot's declared default. Specialized hits above the confirmation
//! threshold pause as a confirmation prompt instead of filling silently.
//! Required slots nothing could resolve become clarifications; optional
//! ones are skipped. A validator failure never retries the same strategy:
//! control falls through, carrying the failure reason into the eventual
//! clarification.

pub mod assessment_type;
pub mod field_variable;
pub mod generic;
pub mod percentage;
pub mod time_window;
pub mod validators;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::types::{PlaceholderSlot, QueryTemplate};
use crate::clarify::{ClarificationBuilder, ClarificationRequest, ConfirmationPrompt};
use crate::config::ResolverConfig;
use crate::semantic::SemanticSearchResult;
use crate::stores::SemanticIndexStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TimeWindow,
    Percentage,
    AssessmentType,
    FieldVariable,
    Generic,
    Default,
}

impl StrategyKind {
    /// Specialized strategies are the ones whose high-confidence hits ask
    /// for confirmation rather than filling silently.
    fn is_specialized(&self) -> bool {
        matches!(self, StrategyKind::TimeWindow | StrategyKind::Percentage)
    }
}

/// Audit record binding a placeholder to the assessment type it resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAssessmentType {
    pub placeholder: String,
    pub assessment_id: String,
    pub assessment_name: String,
    pub confidence: f64,
    pub source_phrase: String,
    pub resolved_at: DateTime<Utc>,
}

/// Audit record binding a placeholder to the schema field it resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFieldVariable {
    pub placeholder: String,
    pub field_name: String,
    pub table_or_form_name: String,
    pub confidence: f64,
    pub source_phrase: String,
    pub enum_values: Vec<String>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum AuditRecord {
    Assessment(ResolvedAssessmentType),
    Field(ResolvedFieldVariable),
}

/// One strategy's successful resolution, pre-validation.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub value: serde_json::Value,
    pub display: String,
    pub confidence: f64,
    pub strategy: StrategyKind,
    pub source_phrase: String,
    pub audit: Option<AuditRecord>,
}

/// What one strategy had to say about one slot.
#[derive(Debug)]
pub enum StrategyOutcome {
    Hit(Resolution),
    /// A candidate was found but is unusable; the reason survives into the
    /// clarification if nothing later resolves the slot.
    Reject(String),
    Miss,
}

/// Terminal state of one whole-template resolution pass. Audit lists are
/// present if and only if the corresponding specialized resolver fired.
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    pub values: HashMap<String, serde_json::Value>,
    pub display: HashMap<String, String>,
    pub confirmations: Vec<ConfirmationPrompt>,
    pub clarifications: Vec<ClarificationRequest>,
    pub skipped: Vec<String>,
    pub assessment_resolutions: Option<Vec<ResolvedAssessmentType>>,
    pub field_resolutions: Option<Vec<ResolvedFieldVariable>>,
    /// Slots with a concrete value (filled or awaiting confirmation) over
    /// total slots.
    pub confidence: f64,
}

impl ResolutionOutcome {
    pub fn is_complete(&self) -> bool {
        self.confirmations.is_empty() && self.clarifications.is_empty()
    }
}

enum SlotAction {
    Fill(Resolution),
    Confirm(ConfirmationPrompt, Option<AuditRecord>),
    Clarify(ClarificationRequest),
    Skip,
}

pub struct PlaceholderResolver {
    store: Arc<dyn SemanticIndexStore>,
    clarifier: ClarificationBuilder,
    config: ResolverConfig,
}

impl PlaceholderResolver {
    pub fn new(store: Arc<dyn SemanticIndexStore>, config: ResolverConfig) -> Self {
        Self {
            clarifier: ClarificationBuilder::new(Arc::clone(&store), config.search_timeout),
            store,
            config,
        }
    }

    pub async fn resolve_template(
        &self,
        customer_id: &str,
        question: &str,
        template: &QueryTemplate,
        context: &[SemanticSearchResult],
    ) -> ResolutionOutcome {
        let mut outcome = ResolutionOutcome::default();
        let mut assessments = Vec::new();
        let mut fields = Vec::new();

        for name in &template.placeholders {
            let action = self
                .resolve_slot(customer_id, question, template, name, context, &fields)
                .await;
            match action {
                SlotAction::Fill(res) => {
                    debug!(slot = %name, strategy = ?res.strategy, "slot filled");
                    match res.audit {
                        Some(AuditRecord::Assessment(a)) => assessments.push(a),
                        Some(AuditRecord::Field(f)) => fields.push(f),
                        None => {}
                    }
                    outcome.display.insert(name.clone(), res.display);
                    outcome.values.insert(name.clone(), res.value);
                }
                SlotAction::Confirm(prompt, audit) => {
                    debug!(slot = %name, "slot awaiting confirmation");
                    match audit {
                        Some(AuditRecord::Assessment(a)) => assessments.push(a),
                        Some(AuditRecord::Field(f)) => fields.push(f),
                        None => {}
                    }
                    outcome.confirmations.push(prompt);
                }
                SlotAction::Clarify(clarification) => {
                    debug!(slot = %name, "slot needs clarification");
                    outcome.clarifications.push(clarification);
                }
                SlotAction::Skip => outcome.skipped.push(name.clone()),
            }
        }

        let total = template.placeholders.len();
        outcome.confidence = if total == 0 {
            1.0
        } else {
            (outcome.values.len() + outcome.confirmations.len()) as f64 / total as f64
        };
        outcome.assessment_resolutions = (!assessments.is_empty()).then_some(assessments);
        outcome.field_resolutions = (!fields.is_empty()).then_some(fields);
        outcome
    }

    async fn resolve_slot(
        &self,
        customer_id: &str,
        question: &str,
        template: &QueryTemplate,
        name: &str,
        context: &[SemanticSearchResult],
        resolved_fields: &[ResolvedFieldVariable],
    ) -> SlotAction {
        let slot = match template.slot(name) {
            Some(s) => s,
            None => {
                // No definition at all: ask what was meant, free text allowed.
                return SlotAction::Clarify(
                    self.clarifier
                        .build(customer_id, name, None, context, None, None)
                        .await,
                );
            }
        };

        let mut reject_reason: Option<String> = None;

        // Fixed priority order; the first validated value wins.
        let specialized: [fn(&str, &PlaceholderSlot) -> StrategyOutcome; 2] =
            [time_window::resolve, percentage::resolve];
        for strategy in specialized {
            if let Some(action) = self.consider(slot, strategy(question, slot), &mut reject_reason)
            {
                return action;
            }
        }

        let outcome = assessment_type::resolve(
            question,
            slot,
            customer_id,
            &self.store,
            self.config.search_timeout,
        )
        .await;
        if let Some(action) = self.consider(slot, outcome, &mut reject_reason) {
            return action;
        }

        let outcome = field_variable::resolve(
            question,
            slot,
            customer_id,
            &self.store,
            self.config.search_timeout,
        )
        .await;
        if let Some(action) = self.consider(slot, outcome, &mut reject_reason) {
            return action;
        }

        let outcome = generic::resolve(question, slot, &template.question_examples);
        if let Some(action) = self.consider(slot, outcome, &mut reject_reason) {
            return action;
        }

        if let Some(default) = &slot.default {
            let outcome = StrategyOutcome::Hit(Resolution {
                value: default.clone(),
                display: default.to_string(),
                confidence: 1.0,
                strategy: StrategyKind::Default,
                source_phrase: "declared default".to_string(),
                audit: None,
            });
            if let Some(action) = self.consider(slot, outcome, &mut reject_reason) {
                return action;
            }
        }

        if slot.required || reject_reason.is_some() {
            // Enum values already found while resolving a field variable in
            // this pass beat a fresh lookup keyed on the slot's own name.
            let known_enum_values = resolved_fields
                .iter()
                .rev()
                .find(|f| !f.enum_values.is_empty())
                .map(|f| f.enum_values.clone());
            SlotAction::Clarify(
                self.clarifier
                    .build(
                        customer_id,
                        name,
                        Some(slot),
                        context,
                        known_enum_values,
                        reject_reason,
                    )
                    .await,
            )
        } else {
            SlotAction::Skip
        }
    }

    /// Validate a strategy outcome. `None` means keep cascading.
    fn consider(
        &self,
        slot: &PlaceholderSlot,
        outcome: StrategyOutcome,
        reject_reason: &mut Option<String>,
    ) -> Option<SlotAction> {
        match outcome {
            StrategyOutcome::Miss => None,
            StrategyOutcome::Reject(reason) => {
                *reject_reason = Some(reason);
                None
            }
            StrategyOutcome::Hit(mut res) => match validators::apply(slot, res.value.clone()) {
                Ok(validated) => {
                    res.value = validated;
                    if res.strategy.is_specialized()
                        && res.confidence >= self.config.confirmation_threshold
                    {
                        let audit = res.audit.take();
                        Some(SlotAction::Confirm(
                            ConfirmationPrompt {
                                placeholder: slot.name.clone(),
                                detected_value: res.value,
                                display_label: res.display,
                                original_input: res.source_phrase,
                                confidence: res.confidence,
                                semantic: slot.semantic.clone(),
                            },
                            audit,
                        ))
                    } else {
                        Some(SlotAction::Fill(res))
                    }
                }
                Err(reason) => {
                    *reject_reason = Some(reason);
                    None
                }
            },
        }
    }
}

/// Fill a template's brace placeholders with resolved values. Strings are
/// escaped for the single-quoted positions approved patterns put them in;
/// numbers are inserted bare.
pub fn fill_pattern(pattern: &str, values: &HashMap<String, serde_json::Value>) -> String {
    let mut sql = pattern.to_string();
    for (name, value) in values {
        let rendered = match value {
            serde_json::Value::String(s) => s.replace('\'', "''"),
            other => other.to_string(),
        };
        sql = sql.replace(&format!("{{{}}}", name), &rendered);
    }
    sql
}
