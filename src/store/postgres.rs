//! PostgreSQL ledger store.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_SCHEMA`: Schema (namespace) holding both ledgers (default: search path)
//! - `DB_ATTRIBUTES_TABLE`: Attribute table name (default: `schema_attributes`)
//! - `DB_VERSION_TABLE`: Applied-revision table name (default: `revision_version`)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 1)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//!
//! A migration run is one long-lived operation against one connection, so the
//! pool defaults to a single connection.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::{AppliedRevisionStore, AttributeStore};
use crate::revision::RevisionId;

/// Default attribute table name.
pub const DEFAULT_ATTRIBUTES_TABLE: &str = "schema_attributes";

/// Default applied-revision table name.
pub const DEFAULT_VERSION_TABLE: &str = "revision_version";

/// Column of the applied-revision table holding revision ids.
const VERSION_COLUMN: &str = "version_num";

/// Configuration for the PostgreSQL ledger store.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Schema holding the ledgers, `None` for the search path.
    pub schema: Option<String>,
    /// Attribute table name.
    pub attributes_table: String,
    /// Applied-revision table name.
    pub version_table: String,
    /// Maximum connections in pool (default: 1).
    pub max_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/registry".to_string()),
            schema: std::env::var("DB_SCHEMA").ok().filter(|s| !s.is_empty()),
            attributes_table: std::env::var("DB_ATTRIBUTES_TABLE")
                .unwrap_or_else(|_| DEFAULT_ATTRIBUTES_TABLE.to_string()),
            version_table: std::env::var("DB_VERSION_TABLE")
                .unwrap_or_else(|_| DEFAULT_VERSION_TABLE.to_string()),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }

    /// Quoted, schema-qualified name of a table.
    fn qualified(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
            None => quote_ident(table),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Error type for the PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// PostgreSQL store serving both ledgers.
pub struct PostgresLedgerStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresLedgerStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, PostgresError> {
        tracing::info!(
            schema = ?config.schema,
            attributes_table = %config.attributes_table,
            version_table = %config.version_table,
            max_connections = config.max_connections,
            "Connecting to ledger database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool, config })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, PostgresError> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema holding the ledgers.
    pub fn schema(&self) -> Option<&str> {
        self.config.schema.as_deref()
    }

    async fn table_exists(&self, table: &str) -> Result<bool, PostgresError> {
        let present: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(self.config.qualified(table))
            .fetch_one(&self.pool)
            .await?;
        Ok(present)
    }
}

#[async_trait]
impl AttributeStore for PostgresLedgerStore {
    type Error = PostgresError;

    async fn attributes(&self) -> Result<Option<Vec<(String, String)>>, Self::Error> {
        if !self.table_exists(&self.config.attributes_table).await? {
            tracing::debug!(table = %self.config.attributes_table, "Attribute table does not exist");
            return Ok(None);
        }
        let sql = format!(
            "SELECT name, value FROM {} ORDER BY name",
            self.config.qualified(&self.config.attributes_table)
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(Some(rows))
    }

    async fn get(&self, name: &str) -> Result<Option<String>, Self::Error> {
        if !self.table_exists(&self.config.attributes_table).await? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT value FROM {} WHERE name = $1",
            self.config.qualified(&self.config.attributes_table)
        );
        let value: Option<String> = sqlx::query_scalar(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn update(&self, name: &str, value: &str) -> Result<u64, Self::Error> {
        let sql = format!(
            "UPDATE {} SET value = $1 WHERE name = $2",
            self.config.qualified(&self.config.attributes_table)
        );
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AppliedRevisionStore for PostgresLedgerStore {
    type Error = PostgresError;

    async fn applied_revisions(&self) -> Result<Vec<RevisionId>, Self::Error> {
        if !self.table_exists(&self.config.version_table).await? {
            tracing::debug!(table = %self.config.version_table, "Applied-revision table does not exist");
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {column} FROM {table} ORDER BY {column}",
            column = quote_ident(VERSION_COLUMN),
            table = self.config.qualified(&self.config.version_table),
        );
        let ids: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(ids.into_iter().map(RevisionId::new).collect())
    }

    async fn stamp(&self, revisions: &[RevisionId], purge: bool) -> Result<(), Self::Error> {
        let table = self.config.qualified(&self.config.version_table);
        let column = quote_ident(VERSION_COLUMN);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} ({column} VARCHAR(32) NOT NULL PRIMARY KEY)"
        ))
        .execute(&mut *tx)
        .await?;

        if purge {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }

        let insert = format!("INSERT INTO {table} ({column}) VALUES ($1) ON CONFLICT DO NOTHING");
        for revision in revisions {
            sqlx::query(&insert)
                .bind(revision.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(count = revisions.len(), purge = purge, "Stamped applied revisions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_names() {
        let mut config = PostgresConfig {
            database_url: "postgresql://localhost/test".to_string(),
            schema: None,
            attributes_table: DEFAULT_ATTRIBUTES_TABLE.to_string(),
            version_table: DEFAULT_VERSION_TABLE.to_string(),
            max_connections: 1,
            connect_timeout_secs: 10,
        };
        assert_eq!(config.qualified("revision_version"), "\"revision_version\"");
        config.schema = Some("my\"schema".to_string());
        assert_eq!(config.qualified("t"), "\"my\"\"schema\".\"t\"");
    }
}
