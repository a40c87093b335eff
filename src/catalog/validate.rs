//! Template validation
//!
//! Fail closed on anything that could leak unsafe SQL: missing identity
//! fields or any write/DDL/procedure keyword rejects the template. Shape
//! concerns (placeholder list drift, non-SELECT parse, missing schema
//! qualifier) only warn, because they cannot make an approved pattern
//! destructive.

use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::ast::Statement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;

use crate::error::{ResolverError, Result};

use super::types::QueryTemplate;

const WRITE_KEYWORDS: [&str; 13] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "MERGE", "CALL",
];

lazy_static! {
    static ref BRACE_PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
    static ref VERSION: Regex = Regex::new(r"^\d+(\.\d+)*$").unwrap();
    static ref FROM_TARGET: Regex = Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z0-9_.]+)").unwrap();
}

/// Validate one template. Hard failures return an error; soft issues come
/// back as warning strings for the snapshot.
pub fn validate_template(template: &QueryTemplate) -> Result<Vec<String>> {
    if template.name.trim().is_empty() {
        return Err(ResolverError::Catalog(
            "template is missing a name".to_string(),
        ));
    }
    if !VERSION.is_match(template.version.trim()) {
        return Err(ResolverError::Catalog(format!(
            "template '{}' has missing or invalid version '{}'",
            template.name, template.version
        )));
    }
    if template.sql_pattern.trim().is_empty() {
        return Err(ResolverError::Catalog(format!(
            "template '{}' is missing an SQL pattern",
            template.name
        )));
    }
    if let Some(kw) = first_write_keyword(&template.sql_pattern) {
        return Err(ResolverError::Catalog(format!(
            "template '{}' contains forbidden keyword {}",
            template.name, kw
        )));
    }

    let mut warnings = Vec::new();

    // Placeholder drift, both directions.
    let in_pattern: HashSet<String> = BRACE_PLACEHOLDER
        .captures_iter(&template.sql_pattern)
        .map(|c| c[1].to_string())
        .collect();
    let declared: HashSet<String> = template.placeholders.iter().cloned().collect();
    for p in in_pattern.difference(&declared) {
        warnings.push(format!(
            "template '{}': placeholder {{{}}} appears in the pattern but is not declared",
            template.name, p
        ));
    }
    for p in declared.difference(&in_pattern) {
        warnings.push(format!(
            "template '{}': declared placeholder '{}' never appears in the pattern",
            template.name, p
        ));
    }

    // Read-only shape check on the pattern with placeholders stubbed out.
    let stubbed = BRACE_PLACEHOLDER.replace_all(&template.sql_pattern, "1");
    match Parser::parse_sql(&GenericDialect {}, &stubbed) {
        Ok(statements) => {
            if !statements
                .iter()
                .all(|s| matches!(s, Statement::Query(_)))
            {
                warnings.push(format!(
                    "template '{}': pattern does not parse as a read-only query",
                    template.name
                ));
            }
        }
        Err(e) => warnings.push(format!(
            "template '{}': pattern could not be parsed ({})",
            template.name, e
        )),
    }

    // Unqualified table references usually mean a missing schema qualifier.
    for cap in FROM_TARGET.captures_iter(&template.sql_pattern) {
        if !cap[1].contains('.') {
            warnings.push(format!(
                "template '{}': table '{}' has no schema qualifier",
                template.name, &cap[1]
            ));
        }
    }

    Ok(warnings)
}

fn first_write_keyword(sql: &str) -> Option<&'static str> {
    let upper = sql.to_uppercase();
    WRITE_KEYWORDS.iter().copied().find(|kw| {
        upper
            .match_indices(kw)
            .any(|(i, _)| is_word_boundary(&upper, i, kw.len()))
    })
}

fn is_word_boundary(text: &str, start: usize, len: usize) -> bool {
    let bytes = text.as_bytes();
    let before_ok = start == 0 || !(bytes[start - 1] as char).is_alphanumeric();
    let end = start + len;
    let after_ok = end >= bytes.len() || !(bytes[end] as char).is_alphanumeric();
    before_ok && after_ok
}
