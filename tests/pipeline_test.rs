//! End-to-end pipeline tests
//!
//! Exercises the orchestrator against in-memory collaborators: the template
//! path executing a filled pattern, the pause-for-confirmation path, the
//! unresolved-filter gate in front of direct generation, and the follow-up
//! pass that dispositions filters with clarification answers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use intentql::concepts::{FilterTerm, IntentSummary};
use intentql::config::ResolverConfig;
use intentql::error::{ResolverError, Result};
use intentql::orchestrator::{
    filter_clarification_id, Orchestrator, QuestionRequest, ResponseMode, REMOVE_FILTER,
};
use intentql::semantic::{ResultSource, SemanticSearchResult};
use intentql::stores::{
    AssessmentTypeHit, ContextBundle, Embedder, GenerativeResponse, GenerativeStep,
    OntologyConcept, QueryExecutor, QueryResultSet, SearchTerm, SemanticIndexStore,
};

struct WoundCareIndex;

#[async_trait]
impl SemanticIndexStore for WoundCareIndex {
    async fn search_form_fields(
        &self,
        _customer_id: &str,
        _terms: &[SearchTerm],
        _limit: usize,
    ) -> Result<Vec<SemanticSearchResult>> {
        Ok(vec![SemanticSearchResult {
            id: "f1".to_string(),
            source: ResultSource::Form,
            field_name: "healing_rate".to_string(),
            table_or_form_name: "wound_assessment".to_string(),
            concept_id: None,
            semantic_concept: "wound healing rate".to_string(),
            data_type: "numeric".to_string(),
            confidence: 0.9,
        }])
    }

    async fn search_non_form_columns(
        &self,
        _customer_id: &str,
        _terms: &[SearchTerm],
        _limit: usize,
    ) -> Result<Vec<SemanticSearchResult>> {
        Ok(vec![])
    }

    async fn search_assessment_types(
        &self,
        _customer_id: &str,
        keywords: &[String],
    ) -> Result<Vec<AssessmentTypeHit>> {
        if keywords.iter().any(|k| k.contains("braden")) {
            return Ok(vec![AssessmentTypeHit {
                id: "at_braden".to_string(),
                name: "Braden Scale".to_string(),
                confidence: 0.92,
            }]);
        }
        Ok(vec![])
    }

    async fn resolve_ontology(&self, _term: &str) -> Result<Option<OntologyConcept>> {
        Ok(None)
    }

    async fn field_enum_values(&self, _customer_id: &str, _field: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.1; 4])
    }
    fn dimension(&self) -> usize {
        4
    }
}

#[derive(Clone, Copy)]
enum GenBehavior {
    Sql,
    Clarify,
    Fail,
}

struct FakeGenerative {
    behavior: GenBehavior,
    calls: AtomicUsize,
    last_answers: Mutex<Option<HashMap<String, String>>>,
}

impl FakeGenerative {
    fn new(behavior: GenBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_answers: Mutex::new(None),
        }
    }
}

#[async_trait]
impl GenerativeStep for FakeGenerative {
    async fn generate(
        &self,
        _context: &ContextBundle,
        _customer_id: &str,
        _model_id: &str,
        clarification_answers: Option<&HashMap<String, String>>,
    ) -> Result<GenerativeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_answers.lock().unwrap() = clarification_answers.cloned();
        match self.behavior {
            GenBehavior::Sql => Ok(GenerativeResponse::Sql {
                sql: "SELECT patient_id FROM analytics.outcomes".to_string(),
                explanation: Some("generated".to_string()),
            }),
            GenBehavior::Clarify => Ok(GenerativeResponse::Clarification {
                clarifications: vec![serde_json::from_str(
                    r#"{"placeholder": "cohort", "prompt": "Which cohort?", "freeformAllowed": true, "reason": "ambiguous", "semantic": "text"}"#,
                )
                .unwrap()],
            }),
            GenBehavior::Fail => Err(ResolverError::Generation("model unavailable".to_string())),
        }
    }
}

struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingExecutor {
    fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            fail: false,
        }
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, _context_id: &str) -> Result<QueryResultSet> {
        self.executed.lock().unwrap().push(sql.to_string());
        if self.fail {
            return Err(ResolverError::Execution("warehouse offline".to_string()));
        }
        Ok(QueryResultSet {
            columns: vec!["patient_id".to_string()],
            rows: vec![vec![serde_json::json!("P001")]],
        })
    }
}

fn orchestrator(
    generative: Arc<FakeGenerative>,
    executor: Arc<RecordingExecutor>,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(WoundCareIndex),
        Arc::new(FixedEmbedder),
        None,
        generative,
        executor,
        ResolverConfig::default(),
    )
}

fn request(question: &str, filters: Vec<FilterTerm>) -> QuestionRequest {
    QuestionRequest {
        customer_id: "cust".to_string(),
        question: question.to_string(),
        intent: IntentSummary {
            intent_type: "aggregation".to_string(),
            metrics: vec![question.to_string()],
            filters,
        },
        model_id: "gpt-4".to_string(),
        clarification_answers: None,
    }
}

fn unresolved(phrase: &str) -> FilterTerm {
    FilterTerm {
        phrase: phrase.to_string(),
        original: phrase.to_string(),
        schema_value: None,
    }
}

#[tokio::test]
async fn template_match_fills_executes_and_returns_results() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Sql));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative.clone(), executor.clone());

    let result = orch
        .handle(&request("Show Braden assessments for my patients", vec![]))
        .await;

    assert_eq!(result.mode, ResponseMode::Template);
    assert_eq!(result.template_name.as_deref(), Some("assessments_by_type"));
    let sql = result.sql.unwrap();
    assert!(sql.contains("assessment_type = 'Braden Scale'"), "sql: {}", sql);
    assert_eq!(result.results.unwrap().rows.len(), 1);
    assert_eq!(result.assessment_resolutions.unwrap().len(), 1);
    // Template path never consults the generative step.
    assert_eq!(generative.calls.load(Ordering::SeqCst), 0);
    assert_eq!(executor.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn detected_time_window_pauses_for_confirmation() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Sql));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative, executor.clone());

    let result = orch
        .handle(&request("Show me healing data within 4 weeks", vec![]))
        .await;

    assert_eq!(result.mode, ResponseMode::Clarification);
    assert_eq!(
        result.template_name.as_deref(),
        Some("healing_rate_by_time_window")
    );
    assert_eq!(result.confirmations.len(), 1);
    assert_eq!(result.confirmations[0].detected_value, serde_json::json!(28));
    assert!(result.sql.is_none());
    assert!(executor.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unresolved_filter_blocks_direct_generation() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Sql));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative.clone(), executor);

    let result = orch
        .handle(&request(
            "What is driving unusual rehab outcomes",
            vec![unresolved("rehab cohort")],
        ))
        .await;

    assert_eq!(result.mode, ResponseMode::Clarification);
    assert_eq!(result.clarifications.len(), 1);
    assert!(result.clarifications[0].placeholder.starts_with("flt_"));
    assert_eq!(result.filter_metrics.unresolved, 1);
    assert_eq!(generative.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn remove_filter_answer_unblocks_generation() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Sql));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative.clone(), executor);

    let id = filter_clarification_id("rehab cohort", 0);
    let mut req = request(
        "What is driving unusual rehab outcomes",
        vec![unresolved("rehab cohort")],
    );
    let mut answers = HashMap::new();
    answers.insert(id.clone(), REMOVE_FILTER.to_string());
    req.clarification_answers = Some(answers);

    let result = orch.handle(&req).await;

    assert_eq!(result.mode, ResponseMode::Direct);
    assert!(result.sql.unwrap().starts_with("SELECT"));
    // Direct-generation SQL is returned, not executed.
    assert!(result.results.is_none());
    assert_eq!(result.filter_metrics.removed, 1);
    assert_eq!(generative.calls.load(Ordering::SeqCst), 1);
    // The remove override never reaches the generative step.
    assert!(generative.last_answers.lock().unwrap().is_none());
}

#[tokio::test]
async fn generative_clarification_passes_through() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Clarify));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative, executor);

    let result = orch
        .handle(&request("What is driving unusual rehab outcomes", vec![]))
        .await;

    assert_eq!(result.mode, ResponseMode::Clarification);
    assert_eq!(result.clarifications.len(), 1);
    assert_eq!(result.clarifications[0].placeholder, "cohort");
}

#[tokio::test]
async fn generative_failure_is_a_terminal_error_without_partial_sql() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Fail));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative, executor);

    let result = orch
        .handle(&request("What is driving unusual rehab outcomes", vec![]))
        .await;

    assert_eq!(result.mode, ResponseMode::Error);
    assert!(result.error.unwrap().contains("model unavailable"));
    assert!(result.sql.is_none());
    assert!(result.results.is_none());
}

#[tokio::test]
async fn executor_failure_surfaces_as_error_mode() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Sql));
    let executor = Arc::new(RecordingExecutor {
        executed: Mutex::new(Vec::new()),
        fail: true,
    });
    let orch = orchestrator(generative, executor);

    let result = orch
        .handle(&request("Show Braden assessments for my patients", vec![]))
        .await;

    assert_eq!(result.mode, ResponseMode::Error);
    assert!(result.error.unwrap().contains("warehouse offline"));
    assert!(result.results.is_none());
}

#[tokio::test]
async fn every_pass_carries_a_request_id_and_thinking_trace() {
    let generative = Arc::new(FakeGenerative::new(GenBehavior::Sql));
    let executor = Arc::new(RecordingExecutor::new());
    let orch = orchestrator(generative, executor);

    let result = orch
        .handle(&request("Show Braden assessments for my patients", vec![]))
        .await;

    assert!(!result.request_id.is_empty());
    assert!(!result.thinking.is_empty());
}
