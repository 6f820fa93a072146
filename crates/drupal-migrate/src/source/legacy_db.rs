//! Read-only handle on the legacy Drupal database.

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::query::SelectQuery;
use crate::core::php;
use crate::core::value::Value;
use crate::db::{self, Record};
use crate::error::{MigrateError, Result};

/// Legacy Drupal 6/7 database, shared by every SQL source plugin.
#[derive(Clone)]
pub struct LegacyDb {
    pool: SqlitePool,
}

impl LegacyDb {
    /// Connect to a legacy database URL.
    pub async fn connect(url: &str, max_conns: u32) -> Result<Self> {
        let pool = db::connect(url, max_conns, false).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a select query.
    pub async fn select(&self, query: &SelectQuery) -> Result<Vec<Record>> {
        let (sql, params) = query.to_sql()?;
        debug!("Legacy query: {}", sql);
        db::fetch_records(&self.pool, &sql, &params).await
    }

    /// Run raw SQL with bound parameters.
    pub async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        db::fetch_records(&self.pool, sql, params).await
    }

    /// Whether a table exists.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        db::table_exists(&self.pool, table).await
    }

    /// Fail with a requirements error naming the first missing table.
    pub async fn require_tables(&self, plugin: &str, tables: &[String]) -> Result<()> {
        for table in tables {
            if !self.table_exists(table).await? {
                return Err(MigrateError::requirements(
                    plugin,
                    format!("legacy table '{}' does not exist", table),
                ));
            }
        }
        Ok(())
    }

    /// Fail with a requirements error naming the first missing column.
    pub async fn require_columns(&self, plugin: &str, table: &str, columns: &[&str]) -> Result<()> {
        let existing = db::table_columns(&self.pool, table).await?;
        for column in columns {
            if !existing.iter().any(|c| c == column) {
                return Err(MigrateError::requirements(
                    plugin,
                    format!("legacy column '{}.{}' does not exist", table, column),
                ));
            }
        }
        Ok(())
    }

    /// Read a PHP-serialized variable from the `variable` table.
    ///
    /// Returns `None` when the table or the variable is absent.
    pub async fn variable(&self, name: &str) -> Result<Option<Value>> {
        if !self.table_exists("variable").await? {
            return Ok(None);
        }
        let rows = self
            .fetch("SELECT value FROM variable WHERE name = ?", &[Value::from(name)])
            .await?;
        match rows.first().and_then(|r| r.get("value")) {
            Some(Value::String(raw)) => Ok(Some(php::unserialize(raw)?)),
            Some(Value::Bytes(raw)) => Ok(Some(php::unserialize(&String::from_utf8_lossy(raw))?)),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Ok(Some(other.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{exec, insert, memory_pool};

    #[tokio::test]
    async fn test_requirements_name_the_missing_table() {
        let db = LegacyDb::from_pool(memory_pool().await);
        exec(db.pool(), "CREATE TABLE node_type (type TEXT, name TEXT)").await;

        assert!(db.require_tables("d6_node_type", &["node_type".into()]).await.is_ok());
        let err = db
            .require_tables("d6_taxonomy_vocabulary", &["vocabulary".into()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("vocabulary"));
        assert!(matches!(err, MigrateError::SourceRequirements { .. }));

        let err = db.require_columns("d6_node_type", "node_type", &["locked"]).await.unwrap_err();
        assert!(err.to_string().contains("node_type.locked"));
    }

    #[tokio::test]
    async fn test_variable_is_unserialized() {
        let db = LegacyDb::from_pool(memory_pool().await);
        assert_eq!(db.variable("site_name").await.unwrap(), None);

        exec(db.pool(), "CREATE TABLE variable (name TEXT PRIMARY KEY, value BLOB)").await;
        insert(
            db.pool(),
            "variable",
            &["name", "value"],
            vec![vec!["filter_url_length_1".into(), "i:72;".into()]],
        )
        .await;
        assert_eq!(db.variable("filter_url_length_1").await.unwrap(), Some(Value::Int(72)));
        assert_eq!(db.variable("missing").await.unwrap(), None);
    }
}
