//! Template catalog
//!
//! Loads parameterized query templates from the live store or the static
//! bundle, validates them fail-closed, and caches one immutable snapshot per
//! source. The live/static toggle is threaded in as a resolved source kind,
//! so flipping it takes effect on the next load without a restart.

pub mod matcher;
pub mod static_templates;
pub mod types;
pub mod validate;

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Once};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::stores::CatalogSource;

use static_templates::static_rows;
use types::{CatalogSnapshot, CatalogSourceKind, QueryTemplate, TemplateRow, TemplateStatus};
use validate::validate_template;

pub use matcher::{TemplateMatch, TemplateMatcher};

pub struct TemplateCatalog {
    live: Option<Arc<dyn CatalogSource>>,
    snapshots: DashMap<CatalogSourceKind, Arc<CatalogSnapshot>>,
    fallback_warning: Once,
}

impl TemplateCatalog {
    pub fn new(live: Option<Arc<dyn CatalogSource>>) -> Self {
        Self {
            live,
            snapshots: DashMap::new(),
            fallback_warning: Once::new(),
        }
    }

    pub fn source_kind(use_live: bool) -> CatalogSourceKind {
        if use_live {
            CatalogSourceKind::Live
        } else {
            CatalogSourceKind::Static
        }
    }

    /// Serve the cached snapshot for this source, loading it on first use.
    pub async fn load(&self, kind: CatalogSourceKind) -> Result<Arc<CatalogSnapshot>> {
        if let Some(snapshot) = self.snapshots.get(&kind) {
            return Ok(Arc::clone(&snapshot));
        }
        self.reload(kind).await
    }

    /// Drop the cached snapshot for this source and rebuild it.
    pub async fn force_reload(&self, kind: CatalogSourceKind) -> Result<Arc<CatalogSnapshot>> {
        self.snapshots.remove(&kind);
        self.reload(kind).await
    }

    async fn reload(&self, kind: CatalogSourceKind) -> Result<Arc<CatalogSnapshot>> {
        let (rows, effective) = self.fetch_rows(kind).await;
        let snapshot = Arc::new(build_snapshot(effective, rows)?);
        info!(
            source = ?effective,
            requested = ?kind,
            templates = snapshot.templates.len(),
            warnings = snapshot.warnings.len(),
            "template catalog loaded"
        );
        // A fallback snapshot is cached under the static key only, so a
        // transiently-down live store is retried on the next load.
        self.snapshots.insert(effective, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Fetch raw rows for a source, returning the source they actually came
    /// from. An unavailable or empty live store falls back to the static
    /// bundle; the warning fires once per catalog, not once per call.
    async fn fetch_rows(&self, kind: CatalogSourceKind) -> (Vec<TemplateRow>, CatalogSourceKind) {
        if kind == CatalogSourceKind::Live {
            if let Some(live) = &self.live {
                match live.load_approved_templates().await {
                    Ok(rows) if !rows.is_empty() => return (rows, CatalogSourceKind::Live),
                    Ok(_) => self.warn_fallback("live catalog returned zero templates"),
                    Err(e) => self.warn_fallback(&format!("live catalog load failed: {}", e)),
                }
            } else {
                self.warn_fallback("live catalog requested but no source is configured");
            }
        }
        (static_rows(), CatalogSourceKind::Static)
    }

    fn warn_fallback(&self, reason: &str) {
        self.fallback_warning.call_once(|| {
            warn!(reason, "falling back to the static template bundle");
        });
    }

    pub async fn template_by_name(
        &self,
        kind: CatalogSourceKind,
        name: &str,
    ) -> Result<Option<Arc<QueryTemplate>>> {
        Ok(self.load(kind).await?.by_name(name).cloned())
    }

    pub async fn templates_by_intent(
        &self,
        kind: CatalogSourceKind,
        intent: &str,
    ) -> Result<Vec<Arc<QueryTemplate>>> {
        Ok(self
            .load(kind)
            .await?
            .by_intent(intent)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Report a template execution outcome to the live store so the matcher's
    /// success-rate weighting has data to work with.
    pub async fn record_outcome(&self, name: &str, success: bool) -> Result<()> {
        if let Some(live) = &self.live {
            live.record_usage(name, success).await?;
        } else {
            debug!(name, success, "no live catalog source, outcome not recorded");
        }
        Ok(())
    }
}

/// Order-preserving dedupe that drops empty entries.
fn dedupe<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Normalize one raw row: trim and dedupe keywords/tags/placeholders, lower
/// keywords, derive the success rate.
pub fn normalize_row(row: TemplateRow) -> QueryTemplate {
    let success_rate = (row.usage_count > 0)
        .then(|| row.success_count as f64 / row.usage_count as f64);
    QueryTemplate {
        keywords: dedupe(row.keywords.iter().map(|k| k.trim().to_lowercase())),
        tags: dedupe(row.tags.iter().map(|t| t.trim().to_lowercase())),
        placeholders: dedupe(row.placeholders.iter().map(|p| p.trim().to_string())),
        specs: row
            .placeholder_specs
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect(),
        name: row.name.trim().to_string(),
        sql_pattern: row.sql_pattern.trim().to_string(),
        version: row.version.trim().to_string(),
        question_examples: row.question_examples,
        intent: row.intent.trim().to_string(),
        status: TemplateStatus::parse(&row.status),
        success_count: row.success_count,
        usage_count: row.usage_count,
        success_rate,
    }
}

/// Normalize and validate every row, fail closed on the first hard error.
/// Non-approved templates are dropped, warnings are logged and kept on the
/// snapshot.
fn build_snapshot(kind: CatalogSourceKind, rows: Vec<TemplateRow>) -> Result<CatalogSnapshot> {
    let mut templates = Vec::with_capacity(rows.len());
    let mut warnings = Vec::new();
    for row in rows {
        let template = normalize_row(row);
        if template.status != TemplateStatus::Approved {
            debug!(name = %template.name, status = ?template.status, "skipping non-approved template");
            continue;
        }
        let mut template_warnings = validate_template(&template)?;
        for w in &template_warnings {
            warn!("{}", w);
        }
        warnings.append(&mut template_warnings);
        templates.push(Arc::new(template));
    }
    Ok(CatalogSnapshot::new(kind, templates, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolverError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSource {
        rows: Vec<TemplateRow>,
        fail: AtomicBool,
        loads: AtomicUsize,
        usage_calls: AtomicUsize,
    }

    impl FakeSource {
        fn with_rows(rows: Vec<TemplateRow>) -> Self {
            Self {
                rows,
                fail: AtomicBool::new(false),
                loads: AtomicUsize::new(0),
                usage_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for FakeSource {
        async fn load_approved_templates(&self) -> Result<Vec<TemplateRow>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ResolverError::Catalog("store offline".to_string()));
            }
            Ok(self.rows.clone())
        }

        async fn load_template_by_name(&self, name: &str) -> Result<Option<TemplateRow>> {
            Ok(self.rows.iter().find(|r| r.name == name).cloned())
        }

        async fn record_usage(&self, _name: &str, _success: bool) -> Result<()> {
            self.usage_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn unsafe_row() -> TemplateRow {
        let mut row = static_rows().into_iter().next().unwrap();
        row.name = "malicious".to_string();
        row.sql_pattern = "DROP TABLE analytics.wounds".to_string();
        row
    }

    #[tokio::test]
    async fn static_bundle_loads_and_indexes() {
        let catalog = TemplateCatalog::new(None);
        let snap = catalog.load(CatalogSourceKind::Static).await.unwrap();
        assert!(!snap.templates.is_empty());
        assert!(snap.by_name("healing_rate_by_time_window").is_some());
        assert!(!snap.by_intent("trend_analysis").is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_cached_per_source() {
        let source = Arc::new(FakeSource::with_rows(static_rows()));
        let catalog = TemplateCatalog::new(Some(source.clone()));
        catalog.load(CatalogSourceKind::Live).await.unwrap();
        catalog.load(CatalogSourceKind::Live).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        // The static snapshot is keyed separately; loading it does not touch the store.
        catalog.load(CatalogSourceKind::Static).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_live_store_falls_back_to_static() {
        let source = FakeSource::with_rows(vec![]);
        source.fail.store(true, Ordering::SeqCst);
        let catalog = TemplateCatalog::new(Some(Arc::new(source)));
        let snap = catalog.load(CatalogSourceKind::Live).await.unwrap();
        assert!(snap.by_name("healing_rate_by_time_window").is_some());
        assert_eq!(snap.source, CatalogSourceKind::Static);
    }

    #[tokio::test]
    async fn live_store_is_retried_after_a_fallback() {
        let source = Arc::new(FakeSource::with_rows(static_rows()));
        source.fail.store(true, Ordering::SeqCst);
        let catalog = TemplateCatalog::new(Some(source.clone()));
        let snap = catalog.load(CatalogSourceKind::Live).await.unwrap();
        assert_eq!(snap.source, CatalogSourceKind::Static);

        // The fallback must not mask a recovered live store.
        source.fail.store(false, Ordering::SeqCst);
        let snap = catalog.load(CatalogSourceKind::Live).await.unwrap();
        assert_eq!(snap.source, CatalogSourceKind::Live);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_live_store_falls_back_to_static() {
        let catalog = TemplateCatalog::new(Some(Arc::new(FakeSource::with_rows(vec![]))));
        let snap = catalog.load(CatalogSourceKind::Live).await.unwrap();
        assert!(!snap.templates.is_empty());
    }

    #[tokio::test]
    async fn unsafe_live_template_rejects_the_load() {
        let catalog =
            TemplateCatalog::new(Some(Arc::new(FakeSource::with_rows(vec![unsafe_row()]))));
        let err = catalog.load(CatalogSourceKind::Live).await.unwrap_err();
        assert!(matches!(err, ResolverError::Catalog(_)));
    }

    #[tokio::test]
    async fn force_reload_picks_up_new_rows() {
        let source = Arc::new(FakeSource::with_rows(static_rows()));
        let catalog = TemplateCatalog::new(Some(source.clone()));
        catalog.load(CatalogSourceKind::Live).await.unwrap();
        catalog.force_reload(CatalogSourceKind::Live).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn normalize_row_dedupes_and_drops_empty_entries() {
        let mut row = static_rows().into_iter().next().unwrap();
        row.keywords = vec![
            "Healing".to_string(),
            "healing".to_string(),
            "  ".to_string(),
            "weeks".to_string(),
        ];
        row.tags = vec!["wound".to_string(), "wound".to_string()];
        let template = normalize_row(row);
        assert_eq!(template.keywords, vec!["healing", "weeks"]);
        assert_eq!(template.tags, vec!["wound"]);
    }

    #[tokio::test]
    async fn record_outcome_reaches_the_live_store() {
        let source = Arc::new(FakeSource::with_rows(static_rows()));
        let catalog = TemplateCatalog::new(Some(source.clone()));
        catalog
            .record_outcome("healing_rate_by_time_window", true)
            .await
            .unwrap();
        assert_eq!(source.usage_calls.load(Ordering::SeqCst), 1);
    }
}
