//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migration::MigrationDefinition;

impl Config {
    /// Load configuration from a YAML file, including any `migrations_dir`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        if let Some(dir) = &config.migrations_dir {
            let dir = match path.parent() {
                Some(parent) if dir.is_relative() => parent.join(dir),
                _ => dir.clone(),
            };
            config.migrations.extend(load_migrations_dir(&dir)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// `migrations_dir` is only read by [`Config::load`].
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for run state validation.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// A migration definition by id.
    pub fn migration(&self, id: &str) -> Option<&MigrationDefinition> {
        self.migrations.iter().find(|m| m.id == id)
    }
}

/// Read every `*.yml` / `*.yaml` file of a directory, in file name order.
fn load_migrations_dir(dir: &Path) -> Result<Vec<MigrationDefinition>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yml" || e == "yaml");
        if is_yaml && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|path| {
            debug!("Loading migration definition {:?}", path);
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content).map_err(|e| {
                MigrateError::Config(format!("{}: {}", path.display(), e))
            })
        })
        .collect()
}
