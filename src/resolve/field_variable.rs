//! Field-variable resolver
//!
//! Extracts a candidate field-name fragment from the question ("X status",
//! "by X", "where X =") and looks it up in the schema index, form fields
//! first, then non-form columns. The first hit wins; its declared enum
//! values are kept on the audit record for later clarification use.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::catalog::types::PlaceholderSlot;
use crate::stores::{SearchTerm, SemanticIndexStore};

use super::{AuditRecord, Resolution, ResolvedFieldVariable, StrategyKind, StrategyOutcome};

lazy_static! {
    static ref STATUS_OF: Regex =
        Regex::new(r"(?i)\b([a-z_]+(?:\s+[a-z_]+)?)\s+status\b").unwrap();
    static ref GROUP_BY: Regex = Regex::new(r"(?i)\bby\s+([a-z_]+(?:\s+[a-z_]+)?)\b").unwrap();
    static ref WHERE_EQ: Regex = Regex::new(r"(?i)\bwhere\s+([a-z_]+)\s*=").unwrap();
}

const STOP_FRAGMENTS: [&str; 10] = [
    "the", "a", "an", "their", "my", "current", "where", "with", "and", "or",
];

fn applicable(slot: &PlaceholderSlot) -> bool {
    let name = slot.name.to_lowercase();
    matches!(slot.semantic.as_str(), "field_name" | "field")
        || name.contains("field")
        || name.contains("variable")
        || name.contains("column")
}

fn clean_fragment(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_FRAGMENTS.iter().any(|s| s == w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Candidate fragments in pattern-family priority order. "X status" keeps
/// the status suffix, since that is usually the field's actual name.
fn extract_fragments(question: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut push = |frag: String| {
        if !frag.is_empty() && !fragments.contains(&frag) {
            fragments.push(frag);
        }
    };
    for cap in STATUS_OF.captures_iter(question) {
        let frag = clean_fragment(&cap[1]);
        if !frag.is_empty() {
            push(format!("{} status", frag));
        }
    }
    for cap in GROUP_BY.captures_iter(question) {
        push(clean_fragment(&cap[1]));
    }
    for cap in WHERE_EQ.captures_iter(question) {
        push(clean_fragment(&cap[1]));
    }
    fragments
}

pub async fn resolve(
    question: &str,
    slot: &PlaceholderSlot,
    customer_id: &str,
    store: &Arc<dyn SemanticIndexStore>,
    search_timeout: Duration,
) -> StrategyOutcome {
    if !applicable(slot) {
        return StrategyOutcome::Miss;
    }
    let fragments = extract_fragments(question);
    if fragments.is_empty() {
        return StrategyOutcome::Miss;
    }

    for fragment in &fragments {
        let terms = vec![SearchTerm {
            text: fragment.clone(),
            concept_id: None,
            embedding: Vec::new(),
        }];

        let hit = match timeout(
            search_timeout,
            store.search_form_fields(customer_id, &terms, 1),
        )
        .await
        {
            Ok(Ok(hits)) if !hits.is_empty() => hits.into_iter().next(),
            Ok(Ok(_)) => match timeout(
                search_timeout,
                store.search_non_form_columns(customer_id, &terms, 1),
            )
            .await
            {
                Ok(Ok(hits)) => hits.into_iter().next(),
                Ok(Err(e)) => {
                    warn!(error = %e, "non-form column lookup failed during field resolution");
                    None
                }
                Err(_) => {
                    warn!("non-form column lookup timed out during field resolution");
                    None
                }
            },
            Ok(Err(e)) => {
                warn!(error = %e, "form field lookup failed during field resolution");
                None
            }
            Err(_) => {
                warn!("form field lookup timed out during field resolution");
                None
            }
        };

        if let Some(hit) = hit {
            let enum_values = match timeout(
                search_timeout,
                store.field_enum_values(customer_id, &hit.field_name),
            )
            .await
            {
                Ok(Ok(values)) => values,
                Ok(Err(e)) => {
                    warn!(field = %hit.field_name, error = %e, "enum value lookup failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(field = %hit.field_name, "enum value lookup timed out");
                    Vec::new()
                }
            };
            return StrategyOutcome::Hit(Resolution {
                value: json!(hit.field_name),
                display: format!("{}.{}", hit.table_or_form_name, hit.field_name),
                confidence: hit.confidence,
                strategy: StrategyKind::FieldVariable,
                source_phrase: fragment.clone(),
                audit: Some(AuditRecord::Field(ResolvedFieldVariable {
                    placeholder: slot.name.clone(),
                    field_name: hit.field_name,
                    table_or_form_name: hit.table_or_form_name,
                    confidence: hit.confidence,
                    source_phrase: fragment.clone(),
                    enum_values,
                    resolved_at: Utc::now(),
                })),
            });
        }
    }

    StrategyOutcome::Miss
}
