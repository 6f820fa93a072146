//! `migration_lookup`: resolve legacy ids through other migrations' ID maps.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{PipelineBuilder, ProcessContext, ProcessPlugin, ProcessResult, ProcessSignal};
use crate::core::catalog::PluginConfig;
use crate::core::traits::IdMap;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::id_map::Lookup;

/// What a lookup miss does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnMiss {
    /// Produce null.
    #[default]
    Null,
    /// Skip the whole row.
    SkipRow,
    /// Leave the property unset.
    SkipProcess,
}

impl OnMiss {
    fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None | Some("null") => Ok(OnMiss::Null),
            Some("skip_row") => Ok(OnMiss::SkipRow),
            Some("skip_process") => Ok(OnMiss::SkipProcess),
            Some(other) => Err(MigrateError::Config(format!(
                "migration_lookup: on_miss must be null, skip_row or skip_process, got '{}'",
                other
            ))),
        }
    }
}

/// `migration_lookup`: map a source id (or id tuple) to the destination ids
/// recorded by one of the named migrations.
///
/// Migrations are tried in order; the first mapped entry wins. A row that is
/// known but ignored or failed counts as a miss, as does one not yet seen.
pub struct MigrationLookupPlugin {
    migrations: Vec<Arc<dyn IdMap>>,
    on_miss: OnMiss,
}

impl MigrationLookupPlugin {
    pub fn new(migrations: Vec<Arc<dyn IdMap>>, on_miss: OnMiss) -> Self {
        Self { migrations, on_miss }
    }

    pub fn from_config(config: &PluginConfig, builder: &PipelineBuilder<'_>) -> Result<Self> {
        let ids: Vec<String> = match config.require_option("migration")? {
            Value::List(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            other => other.as_str().map(|s| vec![s.to_string()]).unwrap_or_default(),
        };
        if ids.is_empty() {
            return Err(MigrateError::Config(
                "migration_lookup: migration must name at least one migration".into(),
            ));
        }
        let migrations = ids
            .iter()
            .map(|id| builder.id_maps().require(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(migrations, OnMiss::parse(config.str_option("on_miss"))?))
    }

    fn miss(&self, key: &[Value], reason: &str, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        debug!(
            "migration_lookup miss for {} ({:?}): {}",
            ctx.destination_property, key, reason
        );
        match self.on_miss {
            OnMiss::Null => Ok(Value::Null),
            OnMiss::SkipProcess => Err(ProcessSignal::SkipProcess),
            OnMiss::SkipRow => Err(ProcessSignal::SkipRow(format!(
                "no destination found for {} in the lookup migrations ({})",
                key.iter().map(Value::to_string).collect::<Vec<_>>().join(", "),
                reason
            ))),
        }
    }
}

#[async_trait]
impl ProcessPlugin for MigrationLookupPlugin {
    fn plugin_id(&self) -> &str {
        "migration_lookup"
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        let key: Vec<Value> = match value {
            Value::List(items) => items,
            scalar => vec![scalar],
        };
        if key.iter().all(Value::is_empty) {
            return Err(ProcessSignal::SkipProcess);
        }

        let mut reason = "not yet migrated";
        for map in &self.migrations {
            if map.source_id_schema().len() != key.len() {
                continue;
            }
            match map.lookup_destination_ids(&key).await? {
                Lookup::Mapped(mut ids) => {
                    return Ok(if ids.len() == 1 {
                        ids.remove(0)
                    } else {
                        Value::List(ids)
                    })
                }
                Lookup::Unmapped(status) => {
                    debug!(
                        "{} row {:?} is {}",
                        map.migration_id(),
                        key,
                        status.as_str()
                    );
                    reason = "source row was not imported";
                }
                Lookup::Missing => {}
            }
        }
        self.miss(&key, reason, ctx)
    }
}
