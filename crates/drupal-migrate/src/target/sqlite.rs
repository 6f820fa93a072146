//! SQLite-backed target store.
//!
//! Entities and config objects are stored as JSON documents; the authmap
//! keeps its natural relational shape.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::{
    entity_type, AuthmapEntry, AuthmapStorage, ConfigStorage, Entity, EntityStorage,
    PriorStateStorage,
};
use crate::core::traits::BundleInfo;
use crate::core::value::Value;
use crate::db;
use crate::error::{MigrateError, Result};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS target_entity (
        entity_type TEXT NOT NULL,
        id TEXT NOT NULL,
        data TEXT NOT NULL,
        PRIMARY KEY (entity_type, id))",
    "CREATE TABLE IF NOT EXISTS target_config (
        name TEXT PRIMARY KEY,
        data TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS target_authmap (
        uid INTEGER NOT NULL,
        provider TEXT NOT NULL,
        authname TEXT NOT NULL,
        PRIMARY KEY (uid, provider))",
    "CREATE TABLE IF NOT EXISTS target_prior_state (
        key TEXT PRIMARY KEY,
        data TEXT NOT NULL)",
];

/// Target store on a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteTarget {
    pool: SqlitePool,
}

impl SqliteTarget {
    /// Open the target database at a SQLite URL, creating it if missing.
    pub async fn connect(url: &str, max_conns: u32) -> Result<Self> {
        let pool = db::connect(url, max_conns, true).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and create the storage tables.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn next_serial(&self, entity_type: &str) -> Result<i64> {
        let (max,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(CAST(id AS INTEGER)) FROM target_entity WHERE entity_type = ?",
        )
        .bind(entity_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0) + 1)
    }
}

fn id_key(id: &Value) -> Result<String> {
    match id.to_key() {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(MigrateError::Config(format!("Invalid entity id: {}", id))),
    }
}

fn decode_document(data: &str) -> Result<BTreeMap<String, Value>> {
    match Value::from_json(serde_json::from_str(data)?) {
        Value::Map(values) => Ok(values),
        _ => Ok(BTreeMap::new()),
    }
}

fn encode_document(values: &BTreeMap<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

#[async_trait]
impl EntityStorage for SqliteTarget {
    async fn load(&self, entity_type: &str, id: &Value) -> Result<Option<Entity>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM target_entity WHERE entity_type = ? AND id = ?")
                .bind(entity_type)
                .bind(id_key(id)?)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(data,)| Ok(Entity::new(entity_type, decode_document(&data)?)))
            .transpose()
    }

    async fn save(&self, entity: &Entity) -> Result<Value> {
        let def = entity_type(&entity.entity_type)?;
        let mut values = entity.values.clone();

        let id = match values.get(def.id_key).filter(|v| !v.is_null()) {
            Some(id) if def.auto_id() => Value::Int(id.as_i64().ok_or_else(|| {
                MigrateError::Config(format!("{} id must be an integer: {}", def.id, id))
            })?),
            Some(id) => id.clone(),
            None if def.auto_id() => Value::Int(self.next_serial(def.id).await?),
            None => {
                return Err(MigrateError::Config(format!(
                    "{} entities require a '{}' value",
                    def.id, def.id_key
                )))
            }
        };
        values.insert(def.id_key.to_string(), id.clone());

        sqlx::query("INSERT OR REPLACE INTO target_entity (entity_type, id, data) VALUES (?, ?, ?)")
            .bind(def.id)
            .bind(id_key(&id)?)
            .bind(encode_document(&values)?)
            .execute(&self.pool)
            .await?;
        debug!("Saved {} {}", def.id, id);
        Ok(id)
    }

    async fn delete(&self, entity_type: &str, id: &Value) -> Result<bool> {
        let result = sqlx::query("DELETE FROM target_entity WHERE entity_type = ? AND id = ?")
            .bind(entity_type)
            .bind(id_key(id)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, entity_type: &str) -> Result<Vec<Entity>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM target_entity WHERE entity_type = ?
             ORDER BY CAST(id AS INTEGER), id",
        )
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|(data,)| Ok(Entity::new(entity_type, decode_document(data)?)))
            .collect()
    }
}

#[async_trait]
impl ConfigStorage for SqliteTarget {
    async fn get(&self, name: &str) -> Result<Option<BTreeMap<String, Value>>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM target_config WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(data,)| decode_document(&data)).transpose()
    }

    async fn set(&self, name: &str, data: &BTreeMap<String, Value>) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO target_config (name, data) VALUES (?, ?)")
            .bind(name)
            .bind(encode_document(data)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM target_config WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuthmapStorage for SqliteTarget {
    async fn save(&self, entry: &AuthmapEntry) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO target_authmap (uid, provider, authname) VALUES (?, ?, ?)")
            .bind(entry.uid)
            .bind(&entry.provider)
            .bind(&entry.authname)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, uid: i64, provider: &str) -> Result<Option<AuthmapEntry>> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT uid, provider, authname FROM target_authmap WHERE uid = ? AND provider = ?",
        )
        .bind(uid)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(uid, provider, authname)| AuthmapEntry {
            uid,
            provider,
            authname,
        }))
    }

    async fn delete(&self, uid: i64, provider: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM target_authmap WHERE uid = ? AND provider = ?")
            .bind(uid)
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PriorStateStorage for SqliteTarget {
    async fn load_prior(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM target_prior_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(data,)| Ok(Value::from_json(serde_json::from_str(&data)?)))
            .transpose()
    }

    async fn save_prior(&self, key: &str, state: &Value) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO target_prior_state (key, data) VALUES (?, ?)")
            .bind(key)
            .bind(serde_json::to_string(state)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_prior(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM target_prior_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BundleInfo for SqliteTarget {
    async fn bundles(&self, entity_type_id: &str) -> Result<Vec<String>> {
        let def = entity_type(entity_type_id)?;
        let Some(bundle_type) = def.bundle_entity_type else {
            return Ok(vec![entity_type_id.to_string()]);
        };
        let mut bundles: Vec<String> = EntityStorage::list(self, bundle_type)
            .await?
            .iter()
            .filter_map(|entity| entity.id().and_then(Value::to_key))
            .collect();
        bundles.sort();
        Ok(bundles)
    }
}
