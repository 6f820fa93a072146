//! ID map persisted as two SQLite tables per migration.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::{
    source_ids_hash, IdMapCounts, Lookup, MapEntry, Message, MessageLevel, RollbackAction,
    RowStatus,
};
use crate::core::identifier::{map_table_name, message_table_name, quote};
use crate::core::row::Row;
use crate::core::schema::IdSchema;
use crate::core::traits::IdMap;
use crate::core::value::Value;
use crate::db::{bind_all, fetch_records, Record};
use crate::error::{MigrateError, Result};

/// `migrate_map_<id>` / `migrate_message_<id>` tables in the target database.
pub struct SqlIdMap {
    pool: SqlitePool,
    migration_id: String,
    source_ids: IdSchema,
    destination_ids: IdSchema,
    map_table: String,
    message_table: String,
}

impl SqlIdMap {
    /// Create a map for a migration. Tables are created by [`IdMap::ensure_tables`].
    pub fn new(
        pool: SqlitePool,
        migration_id: impl Into<String>,
        source_ids: IdSchema,
        destination_ids: IdSchema,
    ) -> Self {
        let migration_id = migration_id.into();
        Self {
            pool,
            map_table: map_table_name(&migration_id),
            message_table: message_table_name(&migration_id),
            migration_id,
            source_ids,
            destination_ids,
        }
    }

    /// Name of the map table.
    pub fn map_table(&self) -> &str {
        &self.map_table
    }

    /// Name of the message table.
    pub fn message_table(&self) -> &str {
        &self.message_table
    }

    fn source_columns(&self) -> Vec<String> {
        (1..=self.source_ids.len()).map(|i| format!("sourceid{}", i)).collect()
    }

    fn destination_columns(&self) -> Vec<String> {
        (1..=self.destination_ids.len()).map(|i| format!("destid{}", i)).collect()
    }

    fn hash_source(&self, source_ids: &[Value]) -> Result<(String, Vec<Value>)> {
        let coerced = self
            .source_ids
            .coerce(source_ids)
            .map_err(|e| MigrateError::id_map(&self.migration_id, e.to_string()))?;
        Ok((source_ids_hash(&coerced), coerced))
    }

    fn select_list(&self) -> String {
        let mut columns = vec!["source_ids_hash".to_string()];
        columns.extend(self.source_columns());
        columns.extend(self.destination_columns());
        columns.extend(
            ["source_row_status", "rollback_action", "last_imported", "hash"]
                .iter()
                .map(|c| c.to_string()),
        );
        columns.join(", ")
    }

    fn entry_from_record(&self, record: &Record) -> Result<MapEntry> {
        let source_ids = self
            .source_columns()
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or_default())
            .collect();
        let destination_ids: Vec<Value> = self
            .destination_columns()
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or_default())
            .collect();
        let destination_ids = if destination_ids.iter().all(Value::is_null) {
            None
        } else {
            Some(destination_ids)
        };
        let int = |name: &str| record.get(name).and_then(Value::as_i64).unwrap_or_default();

        Ok(MapEntry {
            source_ids_hash: record
                .get("source_ids_hash")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            source_ids,
            destination_ids,
            status: RowStatus::from_code(int("source_row_status"))?,
            rollback_action: RollbackAction::from_code(int("rollback_action")),
            hash: record.get("hash").and_then(Value::as_str).map(str::to_string),
            last_imported: int("last_imported"),
        })
    }

    async fn count_where(&self, condition: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} {}",
            quote(&self.map_table)?,
            condition
        );
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl IdMap for SqlIdMap {
    fn migration_id(&self) -> &str {
        &self.migration_id
    }

    fn source_id_schema(&self) -> &IdSchema {
        &self.source_ids
    }

    fn destination_id_schema(&self) -> &IdSchema {
        &self.destination_ids
    }

    async fn ensure_tables(&self) -> Result<()> {
        let mut columns = vec!["source_ids_hash TEXT PRIMARY KEY NOT NULL".to_string()];
        for (name, field) in self.source_columns().iter().zip(self.source_ids.fields()) {
            columns.push(format!("{} {} NOT NULL", name, field.kind.sql_type()));
        }
        for (name, field) in self
            .destination_columns()
            .iter()
            .zip(self.destination_ids.fields())
        {
            columns.push(format!("{} {}", name, field.kind.sql_type()));
        }
        columns.push("source_row_status INTEGER NOT NULL DEFAULT 0".into());
        columns.push("rollback_action INTEGER NOT NULL DEFAULT 0".into());
        columns.push("last_imported INTEGER NOT NULL DEFAULT 0".into());
        columns.push("hash TEXT".into());

        let map_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&self.map_table)?,
            columns.join(", ")
        );
        sqlx::query(&map_sql).execute(&self.pool).await?;

        let message_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             msgid INTEGER PRIMARY KEY AUTOINCREMENT, \
             source_ids_hash TEXT NOT NULL, \
             level INTEGER NOT NULL DEFAULT 1, \
             message TEXT NOT NULL)",
            quote(&self.message_table)?
        );
        sqlx::query(&message_sql).execute(&self.pool).await?;

        debug!("Ensured ID map tables {} / {}", self.map_table, self.message_table);
        Ok(())
    }

    async fn save_id_mapping(
        &self,
        row: &Row,
        destination_ids: Option<&[Value]>,
        status: RowStatus,
        rollback_action: RollbackAction,
    ) -> Result<()> {
        let (hash_key, source_values) = self.hash_source(&row.source_id_values())?;

        let destination_values: Vec<Value> = match destination_ids {
            Some(ids) if !ids.is_empty() => self
                .destination_ids
                .coerce(ids)
                .map_err(|e| MigrateError::id_map(&self.migration_id, e.to_string()))?,
            _ => vec![Value::Null; self.destination_ids.len()],
        };

        let mut columns = vec!["source_ids_hash".to_string()];
        columns.extend(self.source_columns());
        columns.extend(self.destination_columns());
        columns.extend(
            ["source_row_status", "rollback_action", "last_imported", "hash"]
                .iter()
                .map(|c| c.to_string()),
        );

        let mut values = vec![Value::String(hash_key)];
        values.extend(source_values);
        values.extend(destination_values);
        values.push(Value::Int(status.code()));
        values.push(Value::Int(rollback_action.code()));
        values.push(Value::Int(Utc::now().timestamp()));
        values.push(row.hash().map(Value::from).unwrap_or_default());

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote(&self.map_table)?,
            columns.join(", "),
            placeholders
        );
        bind_all(sqlx::query(&sql), &values)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lookup_destination_ids(&self, source_ids: &[Value]) -> Result<Lookup> {
        Ok(match self.get_row_by_source(source_ids).await? {
            None => Lookup::Missing,
            Some(entry) => match entry.destination_ids {
                Some(ids) if entry.status != RowStatus::Failed => Lookup::Mapped(ids),
                _ => Lookup::Unmapped(entry.status),
            },
        })
    }

    async fn lookup_source_ids(&self, destination_ids: &[Value]) -> Result<Option<Vec<Value>>> {
        let coerced = self
            .destination_ids
            .coerce(destination_ids)
            .map_err(|e| MigrateError::id_map(&self.migration_id, e.to_string()))?;
        let condition = self
            .destination_columns()
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            self.select_list(),
            quote(&self.map_table)?,
            condition
        );
        let records = fetch_records(&self.pool, &sql, &coerced).await?;
        records
            .first()
            .map(|r| self.entry_from_record(r).map(|e| e.source_ids))
            .transpose()
    }

    async fn get_row_by_source(&self, source_ids: &[Value]) -> Result<Option<MapEntry>> {
        let (hash_key, _) = self.hash_source(source_ids)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE source_ids_hash = ?",
            self.select_list(),
            quote(&self.map_table)?
        );
        let records = fetch_records(&self.pool, &sql, &[Value::String(hash_key)]).await?;
        records.first().map(|r| self.entry_from_record(r)).transpose()
    }

    async fn save_message(
        &self,
        source_ids: &[Value],
        level: MessageLevel,
        message: &str,
    ) -> Result<()> {
        let (hash_key, _) = self.hash_source(source_ids)?;
        let sql = format!(
            "INSERT INTO {} (source_ids_hash, level, message) VALUES (?, ?, ?)",
            quote(&self.message_table)?
        );
        sqlx::query(&sql)
            .bind(hash_key)
            .bind(level.code())
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn messages(&self, source_ids: Option<&[Value]>) -> Result<Vec<Message>> {
        let mut sql = format!(
            "SELECT source_ids_hash, level, message FROM {}",
            quote(&self.message_table)?
        );
        let mut params = Vec::new();
        if let Some(ids) = source_ids {
            sql.push_str(" WHERE source_ids_hash = ?");
            params.push(Value::String(self.hash_source(ids)?.0));
        }
        sql.push_str(" ORDER BY msgid");

        let records = fetch_records(&self.pool, &sql, &params).await?;
        Ok(records
            .into_iter()
            .map(|r| Message {
                source_ids_hash: r
                    .get("source_ids_hash")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                level: MessageLevel::from_code(
                    r.get("level").and_then(Value::as_i64).unwrap_or(1),
                ),
                message: r
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    async fn clear_messages(&self) -> Result<()> {
        let sql = format!("DELETE FROM {}", quote(&self.message_table)?);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn prepare_update(&self) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET source_row_status = ?",
            quote(&self.map_table)?
        );
        sqlx::query(&sql)
            .bind(RowStatus::NeedsUpdate.code())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_update(&self, source_ids: &[Value]) -> Result<()> {
        let (hash_key, _) = self.hash_source(source_ids)?;
        let sql = format!(
            "UPDATE {} SET source_row_status = ? WHERE source_ids_hash = ?",
            quote(&self.map_table)?
        );
        let result = sqlx::query(&sql)
            .bind(RowStatus::NeedsUpdate.code())
            .bind(hash_key)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MigrateError::id_map(
                &self.migration_id,
                "cannot mark a source row for update: it has not been imported",
            ));
        }
        Ok(())
    }

    async fn delete(&self, source_ids: &[Value], messages_too: bool) -> Result<()> {
        let (hash_key, _) = self.hash_source(source_ids)?;
        let sql = format!(
            "DELETE FROM {} WHERE source_ids_hash = ?",
            quote(&self.map_table)?
        );
        sqlx::query(&sql)
            .bind(&hash_key)
            .execute(&self.pool)
            .await?;
        if messages_too {
            let sql = format!(
                "DELETE FROM {} WHERE source_ids_hash = ?",
                quote(&self.message_table)?
            );
            sqlx::query(&sql).bind(&hash_key).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<MapEntry>> {
        let order = self.source_columns().join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            self.select_list(),
            quote(&self.map_table)?,
            if order.is_empty() { "source_ids_hash".to_string() } else { order }
        );
        let records = fetch_records(&self.pool, &sql, &[]).await?;
        records.iter().map(|r| self.entry_from_record(r)).collect()
    }

    async fn counts(&self) -> Result<IdMapCounts> {
        let by_status = |status: RowStatus| format!("WHERE source_row_status = {}", status.code());
        Ok(IdMapCounts {
            processed: self.count_where("").await?,
            imported: self.count_where(&by_status(RowStatus::Imported)).await?,
            update: self.count_where(&by_status(RowStatus::NeedsUpdate)).await?,
            error: self.count_where(&by_status(RowStatus::Failed)).await?,
            ignored: self.count_where(&by_status(RowStatus::Ignored)).await?,
        })
    }

    async fn destroy(&self) -> Result<()> {
        for table in [&self.map_table, &self.message_table] {
            let sql = format!("DROP TABLE IF EXISTS {}", quote(table)?);
            sqlx::query(&sql).execute(&self.pool).await?;
        }
        Ok(())
    }
}
