//! Two-tier TTL cache for semantic search
//!
//! Tier one holds embeddings per concept text, tier two holds result sets per
//! (customer, concept set, flags) key. Both are concurrent maps written
//! idempotently by key, so request handlers never take a cross-key lock. A
//! background sweep evicts expired entries through the same access path.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

use super::SemanticSearchResult;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

pub struct SemanticCache {
    embeddings: DashMap<String, Entry<Vec<f32>>>,
    results: DashMap<String, Entry<Vec<SemanticSearchResult>>>,
    ttl: Duration,
}

impl SemanticCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            embeddings: DashMap::new(),
            results: DashMap::new(),
            ttl,
        }
    }

    pub fn embedding(&self, concept: &str) -> Option<Vec<f32>> {
        self.embeddings.get(concept).and_then(|e| e.live())
    }

    pub fn put_embedding(&self, concept: &str, embedding: Vec<f32>) {
        self.embeddings
            .insert(concept.to_string(), Entry::new(embedding, self.ttl));
    }

    pub fn results(&self, key: &str) -> Option<Vec<SemanticSearchResult>> {
        self.results.get(key).and_then(|e| e.live())
    }

    pub fn put_results(&self, key: &str, results: Vec<SemanticSearchResult>) {
        self.results
            .insert(key.to_string(), Entry::new(results, self.ttl));
    }

    /// Cache key for one search request. Concepts are part of the key in
    /// order, so differently-ranked expansions do not alias.
    pub fn result_key(
        customer_id: &str,
        concepts: &[String],
        min_confidence: f64,
        include_non_form: bool,
        limit: usize,
    ) -> String {
        format!(
            "{}::{}::{:.2}::{}::{}",
            customer_id,
            concepts.join("|"),
            min_confidence,
            include_non_form,
            limit
        )
    }

    /// Drop expired entries from both tiers. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.embeddings.len() + self.results.len();
        self.embeddings.retain(|_, e| e.expires_at > now);
        self.results.retain(|_, e| e.expires_at > now);
        before - (self.embeddings.len() + self.results.len())
    }

    /// Drop every cached result set for one customer. Embeddings are
    /// customer-agnostic and stay.
    pub fn invalidate_customer(&self, customer_id: &str) {
        let prefix = format!("{}::", customer_id);
        self.results.retain(|k, _| !k.starts_with(&prefix));
    }

    /// Clear both tiers. For tests and forced reloads.
    pub fn reset(&self) {
        self.embeddings.clear();
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.embeddings.len() + self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodic eviction task. Uses the same concurrency-safe maps as the
    /// request path, so it never blocks readers.
    pub fn spawn_sweeper(cache: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "semantic cache sweep");
                }
            }
        })
    }
}
