//! Configuration validation.

use std::collections::BTreeSet;

use super::Config;
use crate::error::{MigrateError, Result};
use crate::migration::MigrationDefinition;
use crate::orchestrator::graph::dependency_order;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.url.is_empty() {
        return Err(MigrateError::Config("target.url is required".into()));
    }
    if config.target.max_connections == 0 {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }
    if let Some(legacy) = &config.legacy {
        if legacy.url.is_empty() {
            return Err(MigrateError::Config("legacy.url is required".into()));
        }
        if legacy.url == config.target.url && !legacy.url.contains(":memory:") {
            return Err(MigrateError::Config(
                "legacy and target cannot be the same database".into(),
            ));
        }
    }
    if config.run.batch_size == 0 {
        return Err(MigrateError::Config("run.batch_size must be at least 1".into()));
    }

    let mut ids = BTreeSet::new();
    for migration in &config.migrations {
        migration.validate()?;
        if !ids.insert(migration.id.as_str()) {
            return Err(MigrateError::Config(format!(
                "duplicate migration id: {}",
                migration.id
            )));
        }
    }
    for migration in &config.migrations {
        for dep in &migration.migration_dependencies.required {
            if !ids.contains(dep.as_str()) {
                return Err(MigrateError::Config(format!(
                    "{} requires unknown migration {}",
                    migration.id, dep
                )));
            }
        }
    }

    let all: Vec<&MigrationDefinition> = config.migrations.iter().collect();
    dependency_order(&all)?;
    Ok(())
}
