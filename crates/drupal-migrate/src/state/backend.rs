//! State backend trait for run state storage.
//!
//! The orchestrator works with `Arc<dyn StateBackend>` without knowing where
//! state lives:
//!
//! - [`FileStateBackend`]: signed JSON file, survives process restarts
//! - [`MemoryStateBackend`](super::MemoryStateBackend): lives as long as the
//!   process, for library use and tests

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use super::RunState;
use crate::error::Result;

/// Trait for run state persistence backends.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Load the state written for a configuration hash, if any.
    ///
    /// Fails with `ConfigChanged` when stored state belongs to a different
    /// configuration.
    async fn load(&self, config_hash: &str) -> Result<Option<RunState>>;

    /// Persist the complete state.
    async fn save(&self, state: &RunState) -> Result<()>;

    /// Backend type name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Run state in a signed JSON file.
#[derive(Debug, Clone)]
pub struct FileStateBackend {
    path: PathBuf,
    force: bool,
}

impl FileStateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            force: false,
        }
    }

    /// Accept state written for a different configuration, rebinding it to
    /// the current one.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateBackend for FileStateBackend {
    async fn load(&self, config_hash: &str) -> Result<Option<RunState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut state = RunState::load(&self.path)?;
        if let Err(e) = state.validate_config(config_hash) {
            if !self.force {
                return Err(e);
            }
            warn!("Configuration changed since {:?} was written; continuing (--force)", self.path);
            state.config_hash = config_hash.to_string();
        }
        info!("Loaded run state from {:?}", self.path);
        Ok(Some(state))
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        state.clone().save(&self.path)
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;
    use crate::state::MigrationStatus;

    #[tokio::test]
    async fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileStateBackend::new(dir.path().join("state.json"));
        assert!(backend.load("hash").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_and_config_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = FileStateBackend::new(&path);

        let mut state = RunState::new("run".into(), "hash-a".into());
        state.begin("d6_node_type", MigrationStatus::Importing).unwrap();
        backend.save(&state).await.unwrap();

        let loaded = backend.load("hash-a").await.unwrap().unwrap();
        assert_eq!(loaded.status("d6_node_type"), MigrationStatus::Importing);

        assert!(matches!(
            backend.load("hash-b").await,
            Err(MigrateError::ConfigChanged)
        ));

        let forced = FileStateBackend::new(&path).with_force(true);
        let loaded = forced.load("hash-b").await.unwrap().unwrap();
        assert_eq!(loaded.config_hash, "hash-b");
    }
}
