//! Semantic schema search
//!
//! Maps expanded concepts onto schema elements (form fields and non-form
//! columns) through the customer-scoped semantic index, with a two-tier TTL
//! cache in front of embedding generation and search results.

pub mod cache;
pub mod searcher;

use serde::{Deserialize, Serialize};

pub use cache::SemanticCache;
pub use searcher::{SearchOptions, SemanticSearcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultSource {
    Form,
    NonForm,
}

/// One schema element a concept mapped to, with the index's confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchResult {
    pub id: String,
    pub source: ResultSource,
    pub field_name: String,
    pub table_or_form_name: String,
    pub concept_id: Option<String>,
    pub semantic_concept: String,
    pub data_type: String,
    pub confidence: f64,
}
