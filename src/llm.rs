//! Generative query step
//!
//! Chat-completions client behind the `GenerativeStep` trait. The prompt
//! carries the full context bundle (question, intent, concepts, schema
//! hits, dispositioned filters) plus any clarification answers, and the
//! model must answer with one JSON object tagged `response_type`. With the
//! dummy API key the client never leaves the process and returns a canned
//! SQL response, which keeps the pipeline runnable offline.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ResolverError, Result};
use crate::stores::{ContextBundle, GenerativeResponse, GenerativeStep};

pub struct HttpGenerativeStep {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpGenerativeStep {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn build_prompt(
        context: &ContextBundle,
        clarification_answers: Option<&HashMap<String, String>>,
    ) -> Result<String> {
        let schema_elements: Vec<String> = context
            .semantic_results
            .iter()
            .map(|r| {
                format!(
                    "- {}.{} ({}, concept: {}, confidence {:.2})",
                    r.table_or_form_name, r.field_name, r.data_type, r.semantic_concept, r.confidence
                )
            })
            .collect();

        let concepts: Vec<String> = context
            .concepts
            .iter()
            .map(|c| format!("- {}", c.text))
            .collect();

        let filters: Vec<String> = context
            .filters
            .iter()
            .map(|f| match &f.schema_value {
                Some(v) => format!("- '{}' maps to schema value '{}'", f.original, v),
                None => format!("- '{}' (unmapped)", f.original),
            })
            .collect();

        let answers = match clarification_answers {
            Some(a) if !a.is_empty() => {
                let rendered = serde_json::to_string_pretty(a)
                    .map_err(|e| ResolverError::Generation(format!("failed to serialize answers: {}", e)))?;
                format!("\nUser answers to earlier clarifications:\n{}\n", rendered)
            }
            _ => String::new(),
        };

        Ok(format!(
            r#"You generate a single read-only SQL query for a clinical analytics warehouse.

User question: "{}"
Intent type: {}

Concepts identified in the question:
{}

Schema elements these concepts mapped to:
{}

Active filters:
{}
{}
If the context is sufficient, return:
{{"response_type": "sql", "sql": "SELECT ...", "explanation": "one sentence"}}

If something essential is still ambiguous, return:
{{"response_type": "clarification", "clarifications": [{{"placeholder": "...", "prompt": "...", "freeformAllowed": true, "reason": "...", "semantic": "..."}}]}}

Rules: SELECT statements only, schema-qualified tables, no DDL or DML.
Only return the JSON, no other text."#,
            context.question,
            context.intent_type,
            concepts.join("\n"),
            schema_elements.join("\n"),
            if filters.is_empty() {
                "- none".to_string()
            } else {
                filters.join("\n")
            },
            answers,
        ))
    }

    async fn call_model(&self, prompt: &str, model_id: &str) -> Result<String> {
        // Dummy key short-circuits to a canned response for offline runs.
        if self.api_key == "dummy-api-key" {
            debug!("dummy api key set, returning canned generative response");
            return Ok(
                r#"{"response_type": "sql", "sql": "SELECT patient_id, wound_id, healing_rate FROM analytics.wound_assessments LIMIT 100", "explanation": "Canned offline response."}"#
                    .to_string(),
            );
        }

        let body = serde_json::json!({
            "model": model_id,
            "messages": [
                {"role": "system", "content": "You are a precise JSON-only responder. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 1500
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolverError::Generation(format!("model API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ResolverError::Generation(format!("failed to parse model response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ResolverError::Generation("no content in model response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl GenerativeStep for HttpGenerativeStep {
    async fn generate(
        &self,
        context: &ContextBundle,
        _customer_id: &str,
        model_id: &str,
        clarification_answers: Option<&HashMap<String, String>>,
    ) -> Result<GenerativeResponse> {
        let prompt = Self::build_prompt(context, clarification_answers)?;
        let raw = self.call_model(&prompt, model_id).await?;
        serde_json::from_str(&raw)
            .map_err(|e| ResolverError::Generation(format!("unparseable generative response: {}", e)))
    }
}
