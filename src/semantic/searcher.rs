//! Semantic searcher
//!
//! Resolves concepts against the customer's schema index. Ontology
//! resolution and embedding generation both degrade gracefully; the
//! form-field and non-form-column searches run concurrently when both are
//! requested, since they are independent reads.

use futures::future::join_all;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::concepts::Concept;
use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::stores::{Embedder, SearchTerm, SemanticIndexStore};

use super::{SemanticCache, SemanticSearchResult};

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub min_confidence: f64,
    pub include_non_form: bool,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            include_non_form: false,
            limit: 50,
        }
    }
}

pub struct SemanticSearcher {
    store: Arc<dyn SemanticIndexStore>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<SemanticCache>,
    config: ResolverConfig,
}

impl SemanticSearcher {
    pub fn new(
        store: Arc<dyn SemanticIndexStore>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<SemanticCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub async fn search(
        &self,
        customer_id: &str,
        concepts: &[Concept],
        opts: &SearchOptions,
    ) -> Result<Vec<SemanticSearchResult>> {
        if customer_id.trim().is_empty() {
            return Err(ResolverError::Input("customer id is required".to_string()));
        }
        if concepts.is_empty() {
            return Err(ResolverError::Input(
                "at least one concept is required".to_string(),
            ));
        }
        let limit = opts.limit.min(self.config.max_search_results);

        let concept_texts: Vec<String> = concepts.iter().map(|c| c.text.clone()).collect();
        let key = SemanticCache::result_key(
            customer_id,
            &concept_texts,
            opts.min_confidence,
            opts.include_non_form,
            limit,
        );
        if let Some(hit) = self.cache.results(&key) {
            debug!(customer_id, "semantic search served from cache");
            return Ok(hit);
        }

        let terms = self.build_terms(concepts).await;

        let mut merged = if opts.include_non_form {
            let (form, non_form) = tokio::join!(
                self.bounded_form_search(customer_id, &terms, limit),
                self.bounded_non_form_search(customer_id, &terms, limit),
            );
            // One branch failing degrades; both failing is a real error.
            match (form, non_form) {
                (Ok(mut f), Ok(nf)) => {
                    f.extend(nf);
                    f
                }
                (Ok(f), Err(e)) => {
                    warn!(error = %e, "non-form column search failed, continuing with form fields");
                    f
                }
                (Err(e), Ok(nf)) => {
                    warn!(error = %e, "form field search failed, continuing with non-form columns");
                    nf
                }
                (Err(e), Err(_)) => return Err(e),
            }
        } else {
            self.bounded_form_search(customer_id, &terms, limit).await?
        };

        merged.retain(|r| r.confidence >= opts.min_confidence);
        merged.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(limit);

        self.cache.put_results(&key, merged.clone());
        Ok(merged)
    }

    /// Embed and ontology-resolve all concepts concurrently. Neither
    /// failure is fatal: a failed embedding becomes a zero vector, a failed
    /// ontology lookup falls back to literal string matching.
    async fn build_terms(&self, concepts: &[Concept]) -> Vec<SearchTerm> {
        join_all(concepts.iter().map(|c| self.term_for(c))).await
    }

    async fn term_for(&self, concept: &Concept) -> SearchTerm {
        let embedding_fut = async {
            match self.cache.embedding(&concept.text) {
                Some(e) => e,
                None => match timeout(
                    self.config.search_timeout,
                    self.embedder.embed(&concept.text),
                )
                .await
                {
                    Ok(Ok(e)) => {
                        self.cache.put_embedding(&concept.text, e.clone());
                        e
                    }
                    Ok(Err(e)) => {
                        warn!(concept = %concept.text, error = %e, "embedding failed, using zero vector");
                        vec![0.0; self.embedder.dimension()]
                    }
                    Err(_) => {
                        warn!(concept = %concept.text, "embedding timed out, using zero vector");
                        vec![0.0; self.embedder.dimension()]
                    }
                },
            }
        };

        let concept_id_fut = async {
            match timeout(
                self.config.search_timeout,
                self.store.resolve_ontology(&concept.text),
            )
            .await
            {
                Ok(Ok(Some(oc))) => Some(oc.concept_id),
                Ok(Ok(None)) => None,
                Ok(Err(e)) => {
                    warn!(concept = %concept.text, error = %e, "ontology resolution failed, matching literally");
                    None
                }
                Err(_) => {
                    warn!(concept = %concept.text, "ontology resolution timed out, matching literally");
                    None
                }
            }
        };

        let (embedding, concept_id) = tokio::join!(embedding_fut, concept_id_fut);
        SearchTerm {
            text: concept.text.clone(),
            concept_id,
            embedding,
        }
    }

    async fn bounded_form_search(
        &self,
        customer_id: &str,
        terms: &[SearchTerm],
        limit: usize,
    ) -> Result<Vec<SemanticSearchResult>> {
        timeout(
            self.config.search_timeout,
            self.store.search_form_fields(customer_id, terms, limit),
        )
        .await
        .map_err(|_| ResolverError::Timeout("form field search".to_string()))?
    }

    async fn bounded_non_form_search(
        &self,
        customer_id: &str,
        terms: &[SearchTerm],
        limit: usize,
    ) -> Result<Vec<SemanticSearchResult>> {
        timeout(
            self.config.search_timeout,
            self.store.search_non_form_columns(customer_id, terms, limit),
        )
        .await
        .map_err(|_| ResolverError::Timeout("non-form column search".to_string()))?
    }
}
