//! Template catalog types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Which backing the catalog was loaded from. Resolved from the feature
/// toggle at call time and used as the snapshot cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSourceKind {
    Live,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    Approved,
    Draft,
    Deprecated,
}

impl TemplateStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "approved" => TemplateStatus::Approved,
            "deprecated" => TemplateStatus::Deprecated,
            _ => TemplateStatus::Draft,
        }
    }
}

/// Declared value type of a placeholder, used for coercion before rule checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Text,
    Number,
    Integer,
    Date,
}

impl Default for SlotType {
    fn default() -> Self {
        SlotType::Text
    }
}

/// One parameter of a template: how its value should be found and checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderSlot {
    pub name: String,
    #[serde(rename = "type", default)]
    pub slot_type: SlotType,
    /// Semantic category driving resolver and clarification choice,
    /// e.g. "time_window", "percentage", "assessment_type", "field_name", "enum".
    #[serde(default)]
    pub semantic: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Rules applied to any resolved value: "non-empty", "min:<n>", "max:<n>".
    #[serde(default)]
    pub validators: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Raw template as fetched from a catalog source, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRow {
    pub name: String,
    pub sql_pattern: String,
    pub version: String,
    #[serde(default)]
    pub placeholders: Vec<String>,
    #[serde(default)]
    pub placeholder_specs: Vec<PlaceholderSlot>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub question_examples: Vec<String>,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub usage_count: u64,
}

/// A normalized, validated template. Immutable once loaded into a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    pub sql_pattern: String,
    pub version: String,
    pub placeholders: Vec<String>,
    pub specs: HashMap<String, PlaceholderSlot>,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub question_examples: Vec<String>,
    pub intent: String,
    pub status: TemplateStatus,
    pub success_count: u64,
    pub usage_count: u64,
    /// success_count / usage_count, only when usage_count > 0.
    pub success_rate: Option<f64>,
}

impl QueryTemplate {
    pub fn slot(&self, name: &str) -> Option<&PlaceholderSlot> {
        self.specs.get(name)
    }
}

/// One wholesale catalog load. Never mutated; replaced on reload.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub source: CatalogSourceKind,
    pub templates: Vec<Arc<QueryTemplate>>,
    pub warnings: Vec<String>,
    pub loaded_at: DateTime<Utc>,
    by_name: HashMap<String, usize>,
    by_intent: HashMap<String, Vec<usize>>,
}

impl CatalogSnapshot {
    pub fn new(
        source: CatalogSourceKind,
        templates: Vec<Arc<QueryTemplate>>,
        warnings: Vec<String>,
    ) -> Self {
        let mut by_name = HashMap::new();
        let mut by_intent: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, t) in templates.iter().enumerate() {
            by_name.insert(t.name.clone(), idx);
            if !t.intent.is_empty() {
                by_intent.entry(t.intent.clone()).or_default().push(idx);
            }
        }
        Self {
            source,
            templates,
            warnings,
            loaded_at: Utc::now(),
            by_name,
            by_intent,
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<QueryTemplate>> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    pub fn by_intent(&self, intent: &str) -> Vec<&Arc<QueryTemplate>> {
        self.by_intent
            .get(intent)
            .map(|idxs| idxs.iter().map(|&i| &self.templates[i]).collect())
            .unwrap_or_default()
    }
}
