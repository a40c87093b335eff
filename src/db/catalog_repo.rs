//! Live template catalog repository
//!
//! Reads approved templates from the `query_templates` table and bumps
//! usage counters after executions. Placeholder specs are stored as a JSON
//! column and deserialized into the catalog's slot types; a malformed spec
//! row is a store error, not a silent skip, so bad authoring surfaces at
//! load time.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::catalog::types::{PlaceholderSlot, TemplateRow};
use crate::error::{ResolverError, Result};
use crate::stores::CatalogSource;

const SELECT_TEMPLATES: &str = r#"
    SELECT name, sql_pattern, version, placeholders, placeholder_specs,
           keywords, tags, question_examples, intent, status,
           success_count, usage_count
    FROM query_templates
    WHERE status = 'approved'
    ORDER BY name
"#;

const SELECT_TEMPLATE_BY_NAME: &str = r#"
    SELECT name, sql_pattern, version, placeholders, placeholder_specs,
           keywords, tags, question_examples, intent, status,
           success_count, usage_count
    FROM query_templates
    WHERE name = $1
"#;

const RECORD_USAGE: &str = r#"
    UPDATE query_templates
    SET usage_count = usage_count + 1,
        success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
        last_used_at = NOW()
    WHERE name = $1
"#;

pub struct PgCatalogSource {
    pool: PgPool,
}

impl PgCatalogSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_template(row: &sqlx::postgres::PgRow) -> Result<TemplateRow> {
        let specs_json: serde_json::Value = row
            .try_get("placeholder_specs")
            .map_err(|e| ResolverError::Store(format!("bad placeholder_specs column: {}", e)))?;
        let placeholder_specs: Vec<PlaceholderSlot> = serde_json::from_value(specs_json)
            .map_err(|e| ResolverError::Store(format!("malformed placeholder specs: {}", e)))?;

        Ok(TemplateRow {
            name: get(row, "name")?,
            sql_pattern: get(row, "sql_pattern")?,
            version: get(row, "version")?,
            placeholders: get(row, "placeholders")?,
            placeholder_specs,
            keywords: get(row, "keywords")?,
            tags: get(row, "tags")?,
            question_examples: get(row, "question_examples")?,
            intent: get(row, "intent")?,
            status: get(row, "status")?,
            success_count: get::<i64>(row, "success_count")? as u64,
            usage_count: get::<i64>(row, "usage_count")? as u64,
        })
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| ResolverError::Store(format!("bad '{}' column: {}", column, e)))
}

#[async_trait]
impl CatalogSource for PgCatalogSource {
    async fn load_approved_templates(&self) -> Result<Vec<TemplateRow>> {
        let rows = sqlx::query(SELECT_TEMPLATES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ResolverError::Store(format!("template load failed: {}", e)))?;
        rows.iter().map(Self::row_to_template).collect()
    }

    async fn load_template_by_name(&self, name: &str) -> Result<Option<TemplateRow>> {
        let row = sqlx::query(SELECT_TEMPLATE_BY_NAME)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ResolverError::Store(format!("template lookup failed: {}", e)))?;
        row.as_ref().map(Self::row_to_template).transpose()
    }

    async fn record_usage(&self, name: &str, success: bool) -> Result<()> {
        sqlx::query(RECORD_USAGE)
            .bind(name)
            .bind(success)
            .execute(&self.pool)
            .await
            .map_err(|e| ResolverError::Store(format!("usage update failed: {}", e)))?;
        Ok(())
    }
}
