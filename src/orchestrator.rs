//! Orchestrator
//!
//! Top-level state machine for one question: template matching first, then
//! placeholder resolution, then direct generation guarded by unresolved
//! filter terms, with clarifications emitted whenever the pipeline cannot
//! proceed on its own. Terminal failures surface as an explicit error-mode
//! result; there is never a partially-populated SQL answer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{TemplateCatalog, TemplateMatcher};
use crate::clarify::{ClarificationRequest, ConfirmationPrompt, FreeTextSpec};
use crate::concepts::{ConceptExpander, FilterTerm, IntentSummary};
use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::resolve::{
    fill_pattern, PlaceholderResolver, ResolvedAssessmentType, ResolvedFieldVariable,
};
use crate::semantic::{SearchOptions, SemanticCache, SemanticSearcher, SemanticSearchResult};
use crate::stores::{
    CatalogSource, ContextBundle, Embedder, GenerativeResponse, GenerativeStep, QueryExecutor,
    QueryResultSet, SemanticIndexStore,
};

/// Answer value that dispositions an unresolved filter by removing it.
pub const REMOVE_FILTER: &str = "__remove_filter__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Template,
    Direct,
    Clarification,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    TemplateMatch,
    ComplexityCheck,
    ContextDiscovery,
    SqlGeneration,
    ApplyClarifications,
}

/// One telemetry marker per pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingStep {
    pub stage: Stage,
    pub detail: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilterMetrics {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct QuestionRequest {
    pub customer_id: String,
    pub question: String,
    pub intent: IntentSummary,
    pub model_id: String,
    /// Present on follow-up calls: answers keyed by placeholder or filter id.
    pub clarification_answers: Option<HashMap<String, String>>,
}

/// Terminal output of one orchestration pass.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub request_id: String,
    pub mode: ResponseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryResultSet>,
    pub clarifications: Vec<ClarificationRequest>,
    pub confirmations: Vec<ConfirmationPrompt>,
    /// Present and non-empty iff the assessment-type resolver fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_resolutions: Option<Vec<ResolvedAssessmentType>>,
    /// Present and non-empty iff the field-variable resolver fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_resolutions: Option<Vec<ResolvedFieldVariable>>,
    pub filter_metrics: FilterMetrics,
    pub thinking: Vec<ThinkingStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrchestrationResult {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            mode: ResponseMode::Error,
            template_name: None,
            sql: None,
            results: None,
            clarifications: Vec::new(),
            confirmations: Vec::new(),
            assessment_resolutions: None,
            field_resolutions: None,
            filter_metrics: FilterMetrics::default(),
            thinking: Vec::new(),
            error: None,
        }
    }
}

struct Trace {
    last: Instant,
    steps: Vec<ThinkingStep>,
}

impl Trace {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            steps: Vec::new(),
        }
    }

    fn mark(&mut self, stage: Stage, detail: impl Into<String>) {
        let now = Instant::now();
        self.steps.push(ThinkingStep {
            stage,
            detail: detail.into(),
            elapsed_ms: now.duration_since(self.last).as_millis(),
        });
        self.last = now;
    }
}

/// What filter disposition decided for one pass.
struct FilterDisposition {
    kept: Vec<FilterTerm>,
    blocking: Vec<ClarificationRequest>,
    forwarded_answers: HashMap<String, String>,
    metrics: FilterMetrics,
}

pub struct Orchestrator {
    expander: ConceptExpander,
    searcher: SemanticSearcher,
    catalog: TemplateCatalog,
    matcher: TemplateMatcher,
    resolver: PlaceholderResolver,
    generative: Arc<dyn GenerativeStep>,
    executor: Arc<dyn QueryExecutor>,
    config: ResolverConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SemanticIndexStore>,
        embedder: Arc<dyn Embedder>,
        catalog_source: Option<Arc<dyn CatalogSource>>,
        generative: Arc<dyn GenerativeStep>,
        executor: Arc<dyn QueryExecutor>,
        config: ResolverConfig,
    ) -> Self {
        let cache = Arc::new(SemanticCache::new(config.cache_ttl));
        Self {
            expander: ConceptExpander::new(config.clone()),
            searcher: SemanticSearcher::new(
                Arc::clone(&store),
                embedder,
                cache,
                config.clone(),
            ),
            catalog: TemplateCatalog::new(catalog_source),
            matcher: TemplateMatcher::new(config.match_threshold),
            resolver: PlaceholderResolver::new(store, config.clone()),
            generative,
            executor,
            config,
        }
    }

    pub fn semantic_cache(&self) -> Arc<SemanticCache> {
        Arc::clone(self.searcher.cache())
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Run one full orchestration pass. Failures are folded into an
    /// error-mode result rather than bubbling out.
    pub async fn handle(&self, req: &QuestionRequest) -> OrchestrationResult {
        let request_id = Uuid::new_v4().to_string();
        let mut result = OrchestrationResult::new(request_id);
        let mut trace = Trace::new();

        match self.run(req, &mut result, &mut trace).await {
            Ok(()) => {}
            Err(e) => {
                warn!(error = %e, "orchestration pass failed");
                result.mode = ResponseMode::Error;
                result.sql = None;
                result.results = None;
                result.error = Some(e.to_string());
            }
        }
        result.thinking = trace.steps;
        result
    }

    async fn run(
        &self,
        req: &QuestionRequest,
        result: &mut OrchestrationResult,
        trace: &mut Trace,
    ) -> Result<()> {
        // Follow-up calls re-enter at the generative step with the supplied
        // answers merged in; template matching is not repeated.
        if let Some(answers) = &req.clarification_answers {
            trace.mark(
                Stage::ApplyClarifications,
                format!("merging {} clarification answers", answers.len()),
            );
            return self.direct_generation(req, Some(answers), result, trace).await;
        }

        let kind = TemplateCatalog::source_kind(self.config.use_live_catalog);
        let snapshot = self.catalog.load(kind).await?;
        let best = self.matcher.best(&req.question, &snapshot);
        match &best {
            Some(m) => trace.mark(
                Stage::TemplateMatch,
                format!("matched '{}' (score {:.2})", m.template.name, m.score),
            ),
            None => trace.mark(Stage::TemplateMatch, "no template above threshold"),
        }

        if let Some(matched) = best {
            let context = self.discover_context(req, trace).await?;
            let outcome = self
                .resolver
                .resolve_template(&req.customer_id, &req.question, &matched.template, &context)
                .await;
            result.template_name = Some(matched.template.name.clone());
            result.assessment_resolutions = outcome.assessment_resolutions.clone();
            result.field_resolutions = outcome.field_resolutions.clone();

            if outcome.is_complete() {
                let sql = fill_pattern(&matched.template.sql_pattern, &outcome.values);
                info!(template = %matched.template.name, "executing template pattern");
                let rows = match self.executor.execute(&sql, &req.customer_id).await {
                    Ok(rows) => {
                        self.catalog
                            .record_outcome(&matched.template.name, true)
                            .await
                            .ok();
                        rows
                    }
                    Err(e) => {
                        self.catalog
                            .record_outcome(&matched.template.name, false)
                            .await
                            .ok();
                        return Err(e);
                    }
                };
                result.mode = ResponseMode::Template;
                result.sql = Some(sql);
                result.results = Some(rows);
                return Ok(());
            }

            // Required slots are still open; pause for the user.
            result.mode = ResponseMode::Clarification;
            result.clarifications = outcome.clarifications;
            result.confirmations = outcome.confirmations;
            return Ok(());
        }

        trace.mark(
            Stage::ComplexityCheck,
            "question routed to direct generation",
        );
        self.direct_generation(req, None, result, trace).await
    }

    async fn direct_generation(
        &self,
        req: &QuestionRequest,
        answers: Option<&HashMap<String, String>>,
        result: &mut OrchestrationResult,
        trace: &mut Trace,
    ) -> Result<()> {
        let disposition = disposition_filters(&req.intent.filters, answers);
        result.filter_metrics = disposition.metrics;

        // A filter nobody dispositioned blocks generation outright.
        if !disposition.blocking.is_empty() {
            result.mode = ResponseMode::Clarification;
            result.clarifications = disposition.blocking;
            return Ok(());
        }

        let context = self.discover_context(req, trace).await?;
        let bundle = ContextBundle {
            question: req.question.clone(),
            intent_type: req.intent.intent_type.clone(),
            concepts: self.expander.expand(&req.intent, None),
            semantic_results: context,
            filters: disposition.kept,
        };

        trace.mark(Stage::SqlGeneration, "invoking generative step");
        let forwarded = (!disposition.forwarded_answers.is_empty())
            .then_some(&disposition.forwarded_answers);
        let response = timeout(
            self.config.generation_timeout,
            self.generative
                .generate(&bundle, &req.customer_id, &req.model_id, forwarded),
        )
        .await
        .map_err(|_| ResolverError::Timeout("generative step".to_string()))??;

        match response {
            GenerativeResponse::Sql { sql, .. } => {
                // Direct-generation SQL goes back to the caller unexecuted.
                result.mode = ResponseMode::Direct;
                result.sql = Some(sql);
            }
            GenerativeResponse::Clarification { clarifications } => {
                result.mode = ResponseMode::Clarification;
                result.clarifications = clarifications;
            }
        }
        Ok(())
    }

    async fn discover_context(
        &self,
        req: &QuestionRequest,
        trace: &mut Trace,
    ) -> Result<Vec<SemanticSearchResult>> {
        let concepts = self.expander.expand(&req.intent, None);
        if concepts.is_empty() {
            trace.mark(Stage::ContextDiscovery, "no concepts to search");
            return Ok(Vec::new());
        }
        let opts = SearchOptions {
            min_confidence: self.config.min_confidence,
            include_non_form: true,
            limit: self.config.max_search_results,
        };
        let results = self
            .searcher
            .search(&req.customer_id, &concepts, &opts)
            .await?;
        trace.mark(
            Stage::ContextDiscovery,
            format!(
                "{} concepts mapped to {} schema elements",
                concepts.len(),
                results.len()
            ),
        );
        Ok(results)
    }
}

/// Deterministic clarification id for an unresolved filter, stable across
/// processes: FNV-1a over the phrase and its position.
pub fn filter_clarification_id(phrase: &str, position: usize) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in phrase.bytes().chain(format!(":{}", position).bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("flt_{:016x}", hash)
}

fn disposition_filters(
    filters: &[FilterTerm],
    answers: Option<&HashMap<String, String>>,
) -> FilterDisposition {
    let mut kept = Vec::new();
    let mut blocking = Vec::new();
    let mut metrics = FilterMetrics {
        total: filters.len(),
        ..Default::default()
    };
    let mut forwarded_answers: HashMap<String, String> = answers.cloned().unwrap_or_default();

    for (idx, filter) in filters.iter().enumerate() {
        if filter.schema_value.is_some() {
            metrics.resolved += 1;
            kept.push(filter.clone());
            continue;
        }
        let id = filter_clarification_id(&filter.phrase, idx);
        match answers.and_then(|a| a.get(&id)) {
            Some(v) if v == REMOVE_FILTER => {
                // Removed filters are dropped entirely and their answer is
                // never forwarded to generation.
                metrics.removed += 1;
                forwarded_answers.remove(&id);
            }
            Some(v) => {
                metrics.resolved += 1;
                let mut overridden = filter.clone();
                overridden.schema_value = Some(v.clone());
                kept.push(overridden);
            }
            None => {
                metrics.unresolved += 1;
                blocking.push(ClarificationRequest {
                    placeholder: id,
                    prompt: format!(
                        "The filter '{}' could not be matched to any value in your data. \
                         Provide a replacement value, or remove the filter.",
                        filter.original
                    ),
                    options: None,
                    examples: None,
                    freeform_allowed: true,
                    free_text: Some(FreeTextSpec {
                        min_chars: 1,
                        max_chars: 200,
                        hint: "Enter the value as it appears in your data".to_string(),
                    }),
                    reason: format!("'{}' has no schema mapping", filter.phrase),
                    semantic: "filter".to_string(),
                });
            }
        }
    }

    FilterDisposition {
        kept,
        blocking,
        forwarded_answers,
        metrics,
    }
}
