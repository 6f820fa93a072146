//! SQLite pool construction and value binding shared by the legacy reader,
//! the ID map and the target store.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use crate::core::value::Value;
use crate::error::Result;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// One record keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// A query with SQLite arguments.
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Open a pool for a SQLite URL (`sqlite://path.db` or `sqlite::memory:`).
///
/// In-memory databases are private to one connection, so they are opened
/// with a single connection to keep every query on the same database.
pub async fn connect(url: &str, max_conns: u32, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(create);
    let in_memory = url.contains(":memory:");

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { max_conns.max(1) })
        .acquire_timeout(POOL_CONNECTION_TIMEOUT);
    if in_memory {
        // Closing the only connection would drop the database.
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options.connect_with(options).await?;

    // Test connection
    sqlx::query("SELECT 1").fetch_one(&pool).await?;
    debug!("Opened SQLite pool for {}", url);

    Ok(pool)
}

/// Bind one value as a query parameter.
///
/// Lists and maps are stored as their JSON text.
pub fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(i64::from(*b)),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        other => query.bind(other.to_json().to_string()),
    }
}

/// Bind a list of values in order.
pub fn bind_all<'q>(mut query: SqliteQuery<'q>, values: &[Value]) -> SqliteQuery<'q> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

/// Decode one column by its SQLite storage class.
pub fn decode_column(row: &SqliteRow, idx: usize) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(idx)?),
        "REAL" | "NUMERIC" => Value::Float(row.try_get::<f64, _>(idx)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            match String::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            }
        }
        _ => Value::String(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}

/// Decode a full row into a record.
pub fn decode_row(row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), decode_column(row, idx)?);
    }
    Ok(record)
}

/// Run a query and decode every row.
pub async fn fetch_records(pool: &SqlitePool, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
    let rows = bind_all(sqlx::query(sql), params).fetch_all(pool).await?;
    rows.iter().map(decode_row).collect()
}

/// Whether a table exists.
pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?")
            .bind(table)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Column names of a table, in declaration order.
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}
