use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use intentql::concepts::{FilterTerm, IntentSummary};
use intentql::config::ResolverConfig;
use intentql::error::Result as PipelineResult;
use intentql::llm::HttpGenerativeStep;
use intentql::orchestrator::{Orchestrator, QuestionRequest};
use intentql::semantic::{ResultSource, SemanticCache, SemanticSearchResult};
use intentql::stores::{
    AssessmentTypeHit, Embedder, OntologyConcept, QueryExecutor, QueryResultSet, SearchTerm,
    SemanticIndexStore,
};

#[derive(Parser)]
#[command(name = "intentql")]
#[command(about = "Natural-language question to executable query resolution")]
struct Args {
    /// The question in natural language
    question: String,

    /// Customer whose schema index to search
    #[arg(short, long, default_value = "demo")]
    customer_id: String,

    /// Parsed intent type (trend_analysis, comparison, aggregation, ...)
    #[arg(long, default_value = "aggregation")]
    intent_type: String,

    /// Metric phrases from intent parsing (defaults to the question itself)
    #[arg(long)]
    metric: Vec<String>,

    /// Filter phrases from intent parsing
    #[arg(long)]
    filter: Vec<String>,

    /// Model used for direct generation
    #[arg(long, default_value = "gpt-4")]
    model_id: String,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,
}

/// In-memory schema index over a small wound-care dataset, enough to run
/// the pipeline end to end without external services.
struct DemoIndex;

const DEMO_FIELDS: [(&str, &str, &str, &str); 4] = [
    ("wound_assessment", "healing_rate", "wound healing rate", "numeric"),
    ("wound_assessment", "wound_status", "wound status", "enum"),
    ("wound_assessment", "assessed_at", "assessment date", "date"),
    ("patients", "admission_date", "admission date", "date"),
];

#[async_trait]
impl SemanticIndexStore for DemoIndex {
    async fn search_form_fields(
        &self,
        _customer_id: &str,
        terms: &[SearchTerm],
        limit: usize,
    ) -> PipelineResult<Vec<SemanticSearchResult>> {
        let mut hits = Vec::new();
        for (i, (form, field, concept, data_type)) in DEMO_FIELDS.iter().enumerate() {
            let matched = terms.iter().any(|t| {
                concept.contains(&t.text) || t.text.contains(concept) || t.text.contains(field)
            });
            if matched {
                hits.push(SemanticSearchResult {
                    id: format!("demo_{}", i),
                    source: ResultSource::Form,
                    field_name: field.to_string(),
                    table_or_form_name: form.to_string(),
                    concept_id: None,
                    semantic_concept: concept.to_string(),
                    data_type: data_type.to_string(),
                    confidence: 0.9,
                });
            }
        }
        hits.truncate(limit);
        Ok(hits)
    }

    async fn search_non_form_columns(
        &self,
        _customer_id: &str,
        _terms: &[SearchTerm],
        _limit: usize,
    ) -> PipelineResult<Vec<SemanticSearchResult>> {
        Ok(vec![])
    }

    async fn search_assessment_types(
        &self,
        _customer_id: &str,
        keywords: &[String],
    ) -> PipelineResult<Vec<AssessmentTypeHit>> {
        let known = [("braden", "Braden Scale"), ("push", "PUSH Tool")];
        Ok(known
            .iter()
            .filter(|(k, _)| keywords.iter().any(|kw| kw.to_lowercase().contains(k)))
            .map(|(k, name)| AssessmentTypeHit {
                id: format!("at_{}", k),
                name: name.to_string(),
                confidence: 0.9,
            })
            .collect())
    }

    async fn resolve_ontology(&self, _term: &str) -> PipelineResult<Option<OntologyConcept>> {
        Ok(None)
    }

    async fn field_enum_values(
        &self,
        _customer_id: &str,
        field_name: &str,
    ) -> PipelineResult<Vec<String>> {
        if field_name == "wound_status" {
            return Ok(vec![
                "active".to_string(),
                "healed".to_string(),
                "closed".to_string(),
            ]);
        }
        Ok(vec![])
    }
}

struct DemoEmbedder;

#[async_trait]
impl Embedder for DemoEmbedder {
    async fn embed(&self, text: &str) -> PipelineResult<Vec<f32>> {
        // Deterministic pseudo-embedding; the demo index matches on text.
        let mut v = vec![0.0_f32; 8];
        for (i, b) in text.bytes().enumerate() {
            v[i % 8] += b as f32 / 255.0;
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        8
    }
}

struct DemoExecutor;

#[async_trait]
impl QueryExecutor for DemoExecutor {
    async fn execute(&self, sql: &str, _context_id: &str) -> PipelineResult<QueryResultSet> {
        info!(sql, "demo executor invoked");
        Ok(QueryResultSet {
            columns: vec!["note".to_string()],
            rows: vec![vec![serde_json::json!(
                "demo executor: connect a warehouse for real results"
            )]],
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = ResolverConfig::from_env();

    let api_key = args
        .api_key
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "dummy-api-key".to_string());

    let metrics = if args.metric.is_empty() {
        vec![args.question.clone()]
    } else {
        args.metric
    };
    let intent = IntentSummary {
        intent_type: args.intent_type,
        metrics,
        filters: args
            .filter
            .iter()
            .map(|f| FilterTerm {
                phrase: f.to_lowercase(),
                original: f.clone(),
                schema_value: None,
            })
            .collect(),
    };

    let sweep_interval = config.cache_sweep_interval;
    let orchestrator = Orchestrator::new(
        Arc::new(DemoIndex),
        Arc::new(DemoEmbedder),
        None,
        Arc::new(HttpGenerativeStep::new(api_key)),
        Arc::new(DemoExecutor),
        config,
    );
    SemanticCache::spawn_sweeper(orchestrator.semantic_cache(), sweep_interval);

    let request = QuestionRequest {
        customer_id: args.customer_id,
        question: args.question,
        intent,
        model_id: args.model_id,
        clarification_answers: None,
    };

    info!(question = %request.question, "resolving question");
    let result = orchestrator.handle(&request).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
