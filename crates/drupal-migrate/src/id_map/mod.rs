//! Source-to-destination ID correlation, scoped per migration.
//!
//! Every source row that reaches the executor leaves exactly one map entry
//! behind: the destination ids it was written to (or none), its status, its
//! row hash and the rollback action. The map is what makes re-runs
//! idempotent, lets dependent migrations resolve foreign references, and
//! drives rollback.

mod sql;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::traits::IdMap;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

pub use sql::SqlIdMap;

/// Status of one source row in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Written to the destination.
    Imported = 0,
    /// Must be reprocessed on the next run.
    NeedsUpdate = 1,
    /// Deliberately skipped by the pipeline.
    Ignored = 2,
    /// Processing or the destination write failed.
    Failed = 3,
}

impl RowStatus {
    /// Stored integer code.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Parse a stored integer code.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(RowStatus::Imported),
            1 => Ok(RowStatus::NeedsUpdate),
            2 => Ok(RowStatus::Ignored),
            3 => Ok(RowStatus::Failed),
            _ => Err(MigrateError::State(format!("Invalid row status: {}", code))),
        }
    }

    /// Lowercase label for reports.
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Imported => "imported",
            RowStatus::NeedsUpdate => "needs_update",
            RowStatus::Ignored => "ignored",
            RowStatus::Failed => "failed",
        }
    }
}

/// What rollback does with the destination object of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackAction {
    /// The migration created the object; rollback removes it.
    #[default]
    Delete = 0,
    /// The object existed before the migration; rollback leaves it.
    Preserve = 1,
}

impl RollbackAction {
    /// Stored integer code.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Parse a stored integer code.
    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            RollbackAction::Preserve
        } else {
            RollbackAction::Delete
        }
    }
}

/// One map row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEntry {
    /// Hash of the source id tuple (primary key).
    pub source_ids_hash: String,
    /// Source id tuple.
    pub source_ids: Vec<Value>,
    /// Destination id tuple, absent when nothing was written.
    pub destination_ids: Option<Vec<Value>>,
    /// Row status.
    pub status: RowStatus,
    /// Rollback action.
    pub rollback_action: RollbackAction,
    /// Row hash at the time of the last import.
    pub hash: Option<String>,
    /// Unix timestamp of the last write.
    pub last_imported: i64,
}

/// Result of resolving a source id tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The row was imported to these destination ids.
    Mapped(Vec<Value>),
    /// The row is known but has no destination (ignored or failed).
    Unmapped(RowStatus),
    /// The row has not been seen yet.
    Missing,
}

impl Lookup {
    /// Destination ids, if mapped.
    pub fn destination_ids(&self) -> Option<&[Value]> {
        match self {
            Lookup::Mapped(ids) => Some(ids),
            _ => None,
        }
    }
}

/// Severity of a migration message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Error = 1,
    Warning = 2,
    Notice = 3,
    Information = 4,
}

impl MessageLevel {
    /// Stored integer code.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Parse a stored integer code.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => MessageLevel::Error,
            2 => MessageLevel::Warning,
            3 => MessageLevel::Notice,
            _ => MessageLevel::Information,
        }
    }
}

/// One message recorded against a source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub source_ids_hash: String,
    pub level: MessageLevel,
    pub message: String,
}

/// Row counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdMapCounts {
    pub processed: u64,
    pub imported: u64,
    pub update: u64,
    pub error: u64,
    pub ignored: u64,
}

/// Hash a source id tuple into the map's primary key.
pub fn source_ids_hash(source_ids: &[Value]) -> String {
    let json = serde_json::to_string(source_ids).unwrap_or_default();
    hex::encode(Sha256::digest(json.as_bytes()))
}

/// ID maps of every migration in a run, keyed by migration id.
///
/// Built before any process pipeline so `migration_lookup` steps can
/// resolve the maps they read, including their own migration's.
#[derive(Clone, Default)]
pub struct IdMapRegistry {
    maps: BTreeMap<String, Arc<dyn IdMap>>,
}

impl IdMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration's map.
    pub fn register(&mut self, map: Arc<dyn IdMap>) {
        self.maps.insert(map.migration_id().to_string(), map);
    }

    /// The map of a migration.
    pub fn get(&self, migration_id: &str) -> Option<Arc<dyn IdMap>> {
        self.maps.get(migration_id).cloned()
    }

    /// The map of a migration, or a configuration error naming it.
    pub fn require(&self, migration_id: &str) -> Result<Arc<dyn IdMap>> {
        self.get(migration_id).ok_or_else(|| {
            MigrateError::Config(format!("Unknown migration referenced: {}", migration_id))
        })
    }

    /// Registered migration ids, sorted.
    pub fn migration_ids(&self) -> Vec<&str> {
        self.maps.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_roundtrip() {
        for status in [
            RowStatus::Imported,
            RowStatus::NeedsUpdate,
            RowStatus::Ignored,
            RowStatus::Failed,
        ] {
            assert_eq!(RowStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(RowStatus::from_code(9).is_err());
    }

    #[test]
    fn test_source_ids_hash_depends_on_type_and_order() {
        let a = source_ids_hash(&[Value::from("page"), Value::Int(1)]);
        let b = source_ids_hash(&[Value::Int(1), Value::from("page")]);
        assert_ne!(a, b);
        assert_eq!(a, source_ids_hash(&[Value::from("page"), Value::Int(1)]));
    }
}
