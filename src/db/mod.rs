//! Database module for PostgreSQL connectivity
//!
//! Connection pooling plus the live template catalog repository.

pub mod catalog_repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{ResolverError, Result};

pub use catalog_repo::PgCatalogSource;

/// Open a connection pool against the catalog database.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|e| ResolverError::Store(format!("database connection failed: {}", e)))
}
