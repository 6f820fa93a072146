//! The Drupal-8-shaped target store written by destination plugins.
//!
//! Small capability traits cover what destinations need: entity
//! create/load/save/delete ([`EntityStorage`]), named configuration objects
//! ([`ConfigStorage`]), external-auth mappings ([`AuthmapStorage`]) and the
//! prior state of shared objects that destinations merge into
//! ([`PriorStateStorage`]). [`SqliteTarget`] implements them all on one
//! SQLite database and also answers
//! [`BundleInfo`](crate::core::traits::BundleInfo) queries.

mod entity_types;
mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::core::value::Value;
use crate::error::Result;

pub use entity_types::{entity_type, entity_type_ids, EntityKind, EntityTypeDef};
pub use sqlite::SqliteTarget;

/// One stored entity: its type and property values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    pub entity_type: String,
    pub values: BTreeMap<String, Value>,
}

impl Entity {
    /// Create an entity from property values.
    pub fn new(entity_type: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            entity_type: entity_type.into(),
            values,
        }
    }

    /// The entity id, read from the type's id key.
    pub fn id(&self) -> Option<&Value> {
        let def = entity_type(&self.entity_type).ok()?;
        self.values.get(def.id_key).filter(|v| !v.is_null())
    }

    /// Read a property.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }
}

/// Entity create/load/save/delete.
#[async_trait]
pub trait EntityStorage: Send + Sync {
    /// Load an entity by id.
    async fn load(&self, entity_type: &str, id: &Value) -> Result<Option<Entity>>;

    /// Insert or replace an entity, assigning a serial id to new content
    /// entities. Returns the id.
    async fn save(&self, entity: &Entity) -> Result<Value>;

    /// Delete an entity. Returns whether it existed.
    async fn delete(&self, entity_type: &str, id: &Value) -> Result<bool>;

    /// All entities of a type, ordered by id.
    async fn list(&self, entity_type: &str) -> Result<Vec<Entity>>;
}

/// Named configuration objects.
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    /// Read a config object.
    async fn get(&self, name: &str) -> Result<Option<BTreeMap<String, Value>>>;

    /// Replace a config object.
    async fn set(&self, name: &str, data: &BTreeMap<String, Value>) -> Result<()>;

    /// Delete a config object. Returns whether it existed.
    async fn remove(&self, name: &str) -> Result<bool>;
}

/// One external authentication mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthmapEntry {
    pub uid: i64,
    pub provider: String,
    pub authname: String,
}

/// External authentication mappings keyed by `(uid, provider)`.
#[async_trait]
pub trait AuthmapStorage: Send + Sync {
    /// Insert or replace a mapping.
    async fn save(&self, entry: &AuthmapEntry) -> Result<()>;

    /// Read a mapping.
    async fn get(&self, uid: i64, provider: &str) -> Result<Option<AuthmapEntry>>;

    /// Delete a mapping. Returns whether it existed.
    async fn delete(&self, uid: i64, provider: &str) -> Result<bool>;
}

/// Snapshots of what merge destinations overwrote, keyed by the shared
/// object they merged into. Rollback reads them to put the object back.
#[async_trait]
pub trait PriorStateStorage: Send + Sync {
    /// Read a snapshot.
    async fn load_prior(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or replace a snapshot.
    async fn save_prior(&self, key: &str, state: &Value) -> Result<()>;

    /// Drop a snapshot. Returns whether it existed.
    async fn remove_prior(&self, key: &str) -> Result<bool>;
}
