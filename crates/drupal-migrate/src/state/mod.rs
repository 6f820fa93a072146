//! Run state: per-migration operation status and high-water marks.
//!
//! The ID map is the durable row-level checkpoint. Run state adds what the
//! map cannot express: which operation a migration is currently running
//! (the lightweight lock that stops two invocations re-entering the same
//! migration) and the highest high-water value seen by the last import.

mod backend;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::core::value::Value;
use crate::error::{MigrateError, Result};

pub use backend::{FileStateBackend, StateBackend};
pub use memory::MemoryStateBackend;

type HmacSha256 = Hmac<Sha256>;

/// State of every migration touched by runs of one configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Identifier of the run that created this state.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the state was created.
    pub started_at: DateTime<Utc>,

    /// When the state was last changed.
    pub updated_at: DateTime<Utc>,

    /// Per-migration state, keyed by migration id.
    #[serde(default)]
    pub migrations: BTreeMap<String, MigrationState>,

    /// HMAC-SHA256 over the serialized state (excluding this field), keyed
    /// by `config_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Operation a migration is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    Idle,
    Importing,
    RollingBack,
}

impl MigrationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStatus::Idle => "idle",
            MigrationStatus::Importing => "importing",
            MigrationStatus::RollingBack => "rolling_back",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-migration state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    /// Current operation.
    #[serde(default)]
    pub status: MigrationStatus,

    /// Highest high-water value imported so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water: Option<Value>,

    /// When the last import finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_imported: Option<DateTime<Utc>>,

    /// Error that stopped the last operation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RunState {
    /// Create empty state.
    pub fn new(run_id: String, config_hash: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            config_hash,
            started_at: now,
            updated_at: now,
            migrations: BTreeMap::new(),
            hmac: None,
        }
    }

    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state for HMAC: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;
        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load state from a file, verifying its signature.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        match &state.hmac {
            Some(stored) if *stored == state.compute_hmac()? => Ok(state),
            Some(_) => Err(MigrateError::State(
                "State file integrity check failed: HMAC mismatch (possible tampering)".to_string(),
            )),
            None => Err(MigrateError::State(
                "State file has no HMAC signature".to_string(),
            )),
        }
    }

    /// Sign and save state to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Fail unless the state was written for this configuration.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }

    /// State of one migration, if it has run.
    pub fn migration(&self, id: &str) -> Option<&MigrationState> {
        self.migrations.get(id)
    }

    fn migration_mut(&mut self, id: &str) -> &mut MigrationState {
        self.updated_at = Utc::now();
        self.migrations.entry(id.to_string()).or_default()
    }

    /// Current operation of a migration.
    pub fn status(&self, id: &str) -> MigrationStatus {
        self.migration(id).map(|m| m.status).unwrap_or_default()
    }

    /// Claim a migration for an operation.
    ///
    /// Fails with [`MigrateError::Busy`] while another operation holds it.
    pub fn begin(&mut self, id: &str, operation: MigrationStatus) -> Result<()> {
        let current = self.status(id);
        if current != MigrationStatus::Idle {
            return Err(MigrateError::Busy {
                migration: id.to_string(),
                status: current.to_string(),
            });
        }
        let migration = self.migration_mut(id);
        migration.status = operation;
        migration.last_error = None;
        Ok(())
    }

    /// Release a migration after an operation, recording its error if any.
    pub fn finish(&mut self, id: &str, error: Option<String>) {
        let migration = self.migration_mut(id);
        migration.status = MigrationStatus::Idle;
        migration.last_error = error;
    }

    /// Force a migration back to idle. Returns the status it had.
    pub fn reset_status(&mut self, id: &str) -> MigrationStatus {
        let migration = self.migration_mut(id);
        std::mem::take(&mut migration.status)
    }

    /// Highest high-water value imported by a migration.
    pub fn high_water(&self, id: &str) -> Option<&Value> {
        self.migration(id).and_then(|m| m.high_water.as_ref())
    }

    /// Record a new high-water value.
    pub fn set_high_water(&mut self, id: &str, value: Value) {
        self.migration_mut(id).high_water = Some(value);
    }

    /// Forget a migration's high-water value (after rollback).
    pub fn clear_high_water(&mut self, id: &str) {
        self.migration_mut(id).high_water = None;
    }

    /// Record the end of a successful import.
    pub fn mark_imported(&mut self, id: &str) {
        self.migration_mut(id).last_imported = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_state_save_load() {
        let mut state = RunState::new("test-run".into(), "abc123".into());
        state.set_high_water("d6_url_alias", Value::Int(42));

        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let loaded = RunState::load(file.path()).unwrap();
        assert_eq!(loaded.run_id, "test-run");
        assert_eq!(loaded.config_hash, "abc123");
        assert_eq!(loaded.high_water("d6_url_alias"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_config_validation() {
        let state = RunState::new("test-run".into(), "abc123".into());
        assert!(state.validate_config("abc123").is_ok());
        assert!(matches!(
            state.validate_config("different"),
            Err(MigrateError::ConfigChanged)
        ));
    }

    #[test]
    fn test_tampered_state_is_rejected() {
        let mut state = RunState::new("test-run".into(), "abc123".into());
        state.set_high_water("d6_url_alias", Value::Int(42));
        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        std::fs::write(file.path(), content.replace("42", "7")).unwrap();

        assert!(RunState::load(file.path()).is_err());
    }

    #[test]
    fn test_state_file_is_pretty_json() {
        let mut state = RunState::new("test".into(), "hash".into());
        let file = NamedTempFile::new().unwrap();
        state.save(file.path()).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
        assert!(content.contains('\n'));
        assert!(content.contains("\"run_id\""));
    }

    #[test]
    fn test_busy_migration_rejects_second_operation() {
        let mut state = RunState::new("test".into(), "hash".into());
        state.begin("d6_node_type", MigrationStatus::Importing).unwrap();

        let err = state
            .begin("d6_node_type", MigrationStatus::RollingBack)
            .unwrap_err();
        assert!(matches!(err, MigrateError::Busy { ref status, .. } if status == "importing"));

        // Other migrations are unaffected.
        state.begin("d6_url_alias", MigrationStatus::Importing).unwrap();

        state.finish("d6_node_type", None);
        state.begin("d6_node_type", MigrationStatus::RollingBack).unwrap();
    }

    #[test]
    fn test_reset_status() {
        let mut state = RunState::new("test".into(), "hash".into());
        state.begin("d6_node_type", MigrationStatus::Importing).unwrap();

        assert_eq!(state.reset_status("d6_node_type"), MigrationStatus::Importing);
        assert_eq!(state.status("d6_node_type"), MigrationStatus::Idle);
        assert_eq!(state.reset_status("d6_node_type"), MigrationStatus::Idle);
    }

    #[test]
    fn test_finish_records_error() {
        let mut state = RunState::new("test".into(), "hash".into());
        state.begin("d6_node_type", MigrationStatus::Importing).unwrap();
        state.finish("d6_node_type", Some("legacy table missing".into()));

        let migration = state.migration("d6_node_type").unwrap();
        assert_eq!(migration.status, MigrationStatus::Idle);
        assert_eq!(migration.last_error.as_deref(), Some("legacy table missing"));
    }
}
