//! Resolver configuration
//!
//! Every tunable in the pipeline lives here so tests and the CLI can
//! override them without touching globals. Environment variables
//! (INTENTQL_*) override the defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Max metric phrases fed into concept expansion
    pub max_metric_phrases: usize,
    /// Max filter phrases fed into concept expansion
    pub max_filter_phrases: usize,
    /// Max keywords derived from the intent type
    pub max_intent_keywords: usize,
    /// Ceiling on total expanded concepts (caller overrides are clamped to this)
    pub max_concepts: usize,
    /// Frequency cap per canonical concept so one repeated phrase cannot dominate
    pub max_concept_frequency: usize,
    /// Normalized-Levenshtein threshold for collapsing near-duplicate concepts
    pub concept_similarity_threshold: f64,

    /// Minimum confidence for semantic search results
    pub min_confidence: f64,
    /// Hard cap on semantic search results
    pub max_search_results: usize,
    /// TTL for both semantic cache tiers
    pub cache_ttl: Duration,
    /// How often the background sweep evicts expired cache entries
    pub cache_sweep_interval: Duration,

    /// Specialized resolver hits at or above this confidence ask for confirmation
    pub confirmation_threshold: f64,
    /// Minimum weighted score for a template match to be accepted
    pub match_threshold: f64,
    /// How many candidate templates the matcher returns
    pub match_top_k: usize,

    /// Bound on each semantic store / embedding call
    pub search_timeout: Duration,
    /// Bound on the generative step
    pub generation_timeout: Duration,

    /// Feature toggle: load templates from the live store instead of the static bundle
    pub use_live_catalog: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_metric_phrases: 10,
            max_filter_phrases: 10,
            max_intent_keywords: 5,
            max_concepts: 25,
            max_concept_frequency: 5,
            concept_similarity_threshold: 0.9,
            min_confidence: 0.7,
            max_search_results: 50,
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
            confirmation_threshold: 0.85,
            match_threshold: 2.5,
            match_top_k: 3,
            search_timeout: Duration::from_secs(10),
            generation_timeout: Duration::from_secs(60),
            use_live_catalog: false,
        }
    }
}

impl ResolverConfig {
    /// Build a config from defaults plus INTENTQL_* environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<f64>("INTENTQL_MIN_CONFIDENCE") {
            cfg.min_confidence = v;
        }
        if let Some(v) = env_parse::<f64>("INTENTQL_MATCH_THRESHOLD") {
            cfg.match_threshold = v;
        }
        if let Some(v) = env_parse::<f64>("INTENTQL_CONFIRMATION_THRESHOLD") {
            cfg.confirmation_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("INTENTQL_CACHE_TTL_SECS") {
            cfg.cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("INTENTQL_SEARCH_TIMEOUT_SECS") {
            cfg.search_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("INTENTQL_GENERATION_TIMEOUT_SECS") {
            cfg.generation_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<bool>("INTENTQL_USE_LIVE_CATALOG") {
            cfg.use_live_catalog = v;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
