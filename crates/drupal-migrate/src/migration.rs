//! Migration definitions and their runnable form.
//!
//! A [`MigrationDefinition`] is what the YAML configuration declares. A
//! [`Migration`] is the same definition with its plugins instantiated: one
//! source, one process pipeline, one destination and one ID map.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::core::catalog::{PluginCatalog, PluginConfig, Services};
use crate::core::identifier::validate_identifier;
use crate::core::traits::{Destination, IdMap, Source};
use crate::error::{MigrateError, Result};
use crate::id_map::{IdMapRegistry, SqlIdMap};
use crate::process::{Pipeline, PipelineBuilder, ProcessMap};

/// Dependency edges on other migrations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Migrations that must be complete before this one runs.
    #[serde(default)]
    pub required: Vec<String>,

    /// Migrations that run first when present, but do not block this one.
    #[serde(default)]
    pub optional: Vec<String>,
}

/// One migration as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDefinition {
    /// Unique migration id; also names the ID map tables.
    pub id: String,

    /// Human readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Free-form tags for selecting groups of migrations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migration_tags: Vec<String>,

    /// Source plugin and options.
    pub source: PluginConfig,

    /// Destination property pipelines, in declaration order.
    #[serde(default)]
    pub process: ProcessMap,

    /// Destination plugin and options.
    pub destination: PluginConfig,

    #[serde(default)]
    pub migration_dependencies: Dependencies,

    /// Source property used as a high-water mark: later imports only read
    /// rows whose value is greater than the highest one already imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water_property: Option<String>,
}

impl MigrationDefinition {
    /// Label, falling back to the id.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Required and optional dependencies, required first.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &str> {
        self.migration_dependencies
            .required
            .iter()
            .chain(&self.migration_dependencies.optional)
            .map(String::as_str)
    }

    /// Check the definition on its own, without looking at other migrations.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.id)?;
        if self.source.plugin.is_empty() {
            return Err(MigrateError::Config(format!("{}: source.plugin is required", self.id)));
        }
        if self.destination.plugin.is_empty() {
            return Err(MigrateError::Config(format!(
                "{}: destination.plugin is required",
                self.id
            )));
        }
        if self.all_dependencies().any(|dep| dep == self.id) {
            return Err(MigrateError::Config(format!("{}: depends on itself", self.id)));
        }
        Ok(())
    }
}

/// A migration with its plugins instantiated.
pub struct Migration {
    definition: MigrationDefinition,
    source: Arc<dyn Source>,
    pipeline: Pipeline,
    destination: Arc<dyn Destination>,
    id_map: Arc<dyn IdMap>,
}

impl Migration {
    /// Assemble a migration from already-built parts.
    pub fn new(
        definition: MigrationDefinition,
        source: Arc<dyn Source>,
        pipeline: Pipeline,
        destination: Arc<dyn Destination>,
        id_map: Arc<dyn IdMap>,
    ) -> Self {
        Self {
            definition,
            source,
            pipeline,
            destination,
            id_map,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn label(&self) -> &str {
        self.definition.label()
    }

    pub fn definition(&self) -> &MigrationDefinition {
        &self.definition
    }

    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn destination(&self) -> &dyn Destination {
        self.destination.as_ref()
    }

    pub fn id_map(&self) -> &Arc<dyn IdMap> {
        &self.id_map
    }

    pub fn required_dependencies(&self) -> &[String] {
        &self.definition.migration_dependencies.required
    }
}

/// Instantiates migrations from definitions.
///
/// Building happens in two passes: every source, destination and ID map
/// first, then every pipeline. `migration_lookup` steps resolve ID maps at
/// build time, so all maps must exist before the first pipeline is built.
pub struct MigrationBuilder<'a> {
    catalog: &'a PluginCatalog,
    services: &'a Services,
    map_pool: SqlitePool,
}

impl<'a> MigrationBuilder<'a> {
    /// `map_pool` is the database holding the ID map tables.
    pub fn new(catalog: &'a PluginCatalog, services: &'a Services, map_pool: SqlitePool) -> Self {
        Self {
            catalog,
            services,
            map_pool,
        }
    }

    /// Build every definition, in the given order.
    pub async fn build(&self, definitions: &[MigrationDefinition]) -> Result<Vec<Migration>> {
        let mut registry = IdMapRegistry::new();
        let mut parts = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let source = self.catalog.create_source(&definition.source, self.services)?;
            let destination = self
                .catalog
                .create_destination(&definition.destination, self.services)?;
            let id_map: Arc<dyn IdMap> = Arc::new(SqlIdMap::new(
                self.map_pool.clone(),
                definition.id.clone(),
                source.ids(),
                destination.ids(),
            ));
            id_map.ensure_tables().await?;
            registry.register(id_map.clone());
            parts.push((definition, source, destination, id_map));
        }

        let builder = PipelineBuilder::new(self.catalog, &registry);
        let mut migrations = Vec::with_capacity(parts.len());
        for (definition, source, destination, id_map) in parts {
            let pipeline = builder.build(&definition.process).map_err(|e| match e {
                MigrateError::Config(msg) => {
                    MigrateError::Config(format!("{}: {}", definition.id, msg))
                }
                other => other,
            })?;
            debug!(
                "Built migration {}: {} -> {} ({} properties)",
                definition.id,
                source.plugin_id(),
                destination.plugin_id(),
                pipeline.destination_properties().len()
            );
            migrations.push(Migration::new(
                definition.clone(),
                source,
                pipeline,
                destination,
                id_map,
            ));
        }
        Ok(migrations)
    }
}
