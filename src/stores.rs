//! Collaborator interfaces
//!
//! The resolution pipeline never owns persistent state or talks to a model
//! directly. Everything external sits behind one of these traits: the
//! semantic index store, the template catalog source, the embedding
//! provider, the generative step, and the query executor. Tests swap in
//! in-memory fakes; production wires the sqlx/reqwest implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::types::TemplateRow;
use crate::clarify::ClarificationRequest;
use crate::concepts::{Concept, FilterTerm};
use crate::error::Result;
use crate::semantic::SemanticSearchResult;

/// One term handed to the semantic index store: the literal text, the
/// ontology concept it resolved to (if any), and its embedding (zero vector
/// when embedding generation failed).
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub text: String,
    pub concept_id: Option<String>,
    pub embedding: Vec<f32>,
}

/// A controlled-vocabulary concept a free-text term resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyConcept {
    pub concept_id: String,
    pub preferred_term: String,
}

/// One assessment-type candidate from the indexed catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentTypeHit {
    pub id: String,
    pub name: String,
    pub confidence: f64,
}

/// Customer-scoped schema index lookups.
#[async_trait]
pub trait SemanticIndexStore: Send + Sync {
    async fn search_form_fields(
        &self,
        customer_id: &str,
        terms: &[SearchTerm],
        limit: usize,
    ) -> Result<Vec<SemanticSearchResult>>;

    async fn search_non_form_columns(
        &self,
        customer_id: &str,
        terms: &[SearchTerm],
        limit: usize,
    ) -> Result<Vec<SemanticSearchResult>>;

    async fn search_assessment_types(
        &self,
        customer_id: &str,
        keywords: &[String],
    ) -> Result<Vec<AssessmentTypeHit>>;

    /// Exact/synonym match against the controlled vocabulary. `Ok(None)`
    /// means no concept; errors are treated as degraded data upstream.
    async fn resolve_ontology(&self, term: &str) -> Result<Option<OntologyConcept>>;

    /// Declared enumerated values for a field, for clarification options.
    async fn field_enum_values(&self, customer_id: &str, field_name: &str) -> Result<Vec<String>>;
}

/// Embedding provider for semantic search terms.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
}

/// Source of pre-approved query templates (live store or static bundle).
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_approved_templates(&self) -> Result<Vec<TemplateRow>>;
    async fn load_template_by_name(&self, name: &str) -> Result<Option<TemplateRow>>;
    /// Bump usage/success counters after a template executes.
    async fn record_usage(&self, name: &str, success: bool) -> Result<()>;
}

/// Aggregate semantic findings for one question, handed to the generative step.
#[derive(Debug, Clone, Serialize)]
pub struct ContextBundle {
    pub question: String,
    pub intent_type: String,
    pub concepts: Vec<Concept>,
    pub semantic_results: Vec<SemanticSearchResult>,
    pub filters: Vec<FilterTerm>,
}

/// What the generative step came back with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "response_type", rename_all = "lowercase")]
pub enum GenerativeResponse {
    Sql {
        sql: String,
        #[serde(default)]
        explanation: Option<String>,
    },
    Clarification {
        clarifications: Vec<ClarificationRequest>,
    },
}

/// Opaque, possibly slow, possibly failing query generator.
#[async_trait]
pub trait GenerativeStep: Send + Sync {
    async fn generate(
        &self,
        context: &ContextBundle,
        customer_id: &str,
        model_id: &str,
        clarification_answers: Option<&HashMap<String, String>>,
    ) -> Result<GenerativeResponse>;
}

/// Row/column result set from the executor collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Executes pre-approved SQL. Direct-generation SQL is returned to the
/// caller unexecuted; only template-mode patterns go through here.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, context_id: &str) -> Result<QueryResultSet>;
}
