//! Plugin catalog for explicit dependency injection.
//!
//! The [`PluginCatalog`] maps plugin ids to factory functions for sources,
//! process steps and destinations. It is constructed explicitly and passed
//! to the orchestrator; nothing is discovered at runtime.
//!
//! Factories receive the [`Services`] a plugin may depend on (legacy
//! database, target storage, bundle info), so plugins never reach for
//! global state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::traits::{BundleInfo, Destination, Source};
use crate::core::value::Value;
use crate::destination::{
    AuthmapDestination, ComponentDisplayDestination, ConfigDestination, DisplayKind,
    EntityDestination, FieldGroupDestination,
};
use crate::error::{MigrateError, Result};
use crate::process::{
    CallbackPlugin, ConcatPlugin, DefaultValuePlugin, ExplodePlugin, ExtractPlugin, FlattenPlugin,
    GetPlugin, MachineNamePlugin, MigrationLookupPlugin, PipelineBuilder, ProcessMap,
    ProcessPlugin, SkipOnEmptyPlugin, SkipRowIfNotSetPlugin, StaticMapPlugin, SubProcessPlugin,
};
use crate::source::{
    AuthmapSource, EmbeddedDataSource, FieldGroupSource, FieldInstancePerViewModeSource,
    FilterFormatSource, LegacyDb, MetatagFieldInstanceSource, NodeTypeSource, TermSource,
    UrlAliasSource, VocabularySource,
};
use crate::target::{AuthmapStorage, ConfigStorage, EntityStorage, PriorStateStorage, SqliteTarget};

/// A plugin id plus its options, as written in migration YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin id.
    pub plugin: String,

    /// Nested pipeline (`sub_process`), kept in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessMap>,

    /// Every other option.
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

impl PluginConfig {
    /// Create a config with no options.
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            process: None,
            options: BTreeMap::new(),
        }
    }

    /// Set an option (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// A non-null option.
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key).filter(|v| !v.is_null())
    }

    /// A string option.
    pub fn str_option(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }

    /// A boolean option, false when absent.
    pub fn bool_option(&self, key: &str) -> bool {
        self.option(key).is_some_and(Value::as_bool)
    }

    /// A required option.
    pub fn require_option(&self, key: &str) -> Result<&Value> {
        self.option(key).ok_or_else(|| {
            MigrateError::Config(format!("{}: the '{}' option is required", self.plugin, key))
        })
    }

    /// A required string option.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.require_option(key)?.as_str().ok_or_else(|| {
            MigrateError::Config(format!("{}: the '{}' option must be a string", self.plugin, key))
        })
    }
}

/// Collaborators injected into source and destination plugins.
#[derive(Clone)]
pub struct Services {
    /// The legacy database, absent for runs that only use `embedded_data`.
    pub legacy: Option<LegacyDb>,
    pub entities: Arc<dyn EntityStorage>,
    pub config: Arc<dyn ConfigStorage>,
    pub authmap: Arc<dyn AuthmapStorage>,
    pub prior: Arc<dyn PriorStateStorage>,
    pub bundle_info: Arc<dyn BundleInfo>,
}

impl Services {
    /// Wire every target capability to one SQLite target store.
    pub fn new(legacy: Option<LegacyDb>, target: SqliteTarget) -> Self {
        let target = Arc::new(target);
        Self {
            legacy,
            entities: target.clone(),
            config: target.clone(),
            authmap: target.clone(),
            prior: target.clone(),
            bundle_info: target,
        }
    }

    /// Replace the bundle info provider.
    pub fn with_bundle_info(mut self, bundle_info: Arc<dyn BundleInfo>) -> Self {
        self.bundle_info = bundle_info;
        self
    }

    /// The legacy database, or a configuration error naming the plugin.
    pub fn legacy(&self, plugin: &str) -> Result<LegacyDb> {
        self.legacy.clone().ok_or_else(|| {
            MigrateError::Config(format!(
                "Source plugin {} needs a legacy database but none is configured",
                plugin
            ))
        })
    }
}

/// Builds a source plugin.
pub type SourceFactory = fn(&PluginConfig, &Services) -> Result<Arc<dyn Source>>;

/// Builds a destination plugin.
pub type DestinationFactory = fn(&PluginConfig, &Services) -> Result<Arc<dyn Destination>>;

/// Builds a process step.
pub type ProcessFactory = fn(&PluginConfig, &PipelineBuilder<'_>) -> Result<Box<dyn ProcessPlugin>>;

/// Registry of source, process and destination plugins.
///
/// Destination ids of the form `base:derivative` (e.g. `entity:node_type`)
/// resolve to the factory registered for `base`.
#[derive(Default)]
pub struct PluginCatalog {
    sources: HashMap<String, SourceFactory>,
    processes: HashMap<String, ProcessFactory>,
    destinations: HashMap<String, DestinationFactory>,
}

impl PluginCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every built-in plugin registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog.register_source("d6_node_type", |_, s| {
            Ok(Arc::new(NodeTypeSource::new(s.legacy("d6_node_type")?)))
        });
        catalog.register_source("d6_taxonomy_vocabulary", |_, s| {
            Ok(Arc::new(VocabularySource::new(s.legacy("d6_taxonomy_vocabulary")?)))
        });
        catalog.register_source("d6_taxonomy_term", |c, s| {
            let bundle = TermSource::bundle_option(c.option("bundle"))?;
            Ok(Arc::new(TermSource::new(s.legacy("d6_taxonomy_term")?, bundle)))
        });
        catalog.register_source("d6_filter_format", |_, s| {
            Ok(Arc::new(FilterFormatSource::new(s.legacy("d6_filter_format")?)))
        });
        catalog.register_source("d6_field_instance_per_view_mode", |_, s| {
            Ok(Arc::new(FieldInstancePerViewModeSource::new(
                s.legacy("d6_field_instance_per_view_mode")?,
            )))
        });
        catalog.register_source("d6_field_group", |_, s| {
            Ok(Arc::new(FieldGroupSource::new(s.legacy("d6_field_group")?)))
        });
        catalog.register_source("d6_metatag_field_instance", |_, s| {
            Ok(Arc::new(MetatagFieldInstanceSource::new(
                s.legacy("d6_metatag_field_instance")?,
                s.bundle_info.clone(),
            )))
        });
        catalog.register_source("d6_url_alias", |_, s| {
            Ok(Arc::new(UrlAliasSource::new(s.legacy("d6_url_alias")?)))
        });
        catalog.register_source("d6_authmap", |_, s| {
            Ok(Arc::new(AuthmapSource::new(s.legacy("d6_authmap")?)))
        });
        catalog.register_source("embedded_data", |c, _| {
            Ok(Arc::new(EmbeddedDataSource::from_options(
                c.option("data_rows"),
                c.option("ids"),
            )?))
        });

        catalog.register_process("get", |c, _| Ok(Box::new(GetPlugin::from_config(c)?)));
        catalog.register_process("default_value", |c, _| {
            Ok(Box::new(DefaultValuePlugin::from_config(c)?))
        });
        catalog.register_process("static_map", |c, _| Ok(Box::new(StaticMapPlugin::from_config(c)?)));
        catalog.register_process("callback", |c, _| Ok(Box::new(CallbackPlugin::from_config(c)?)));
        catalog.register_process("machine_name", |c, _| {
            Ok(Box::new(MachineNamePlugin::from_config(c)?))
        });
        catalog.register_process("concat", |c, _| Ok(Box::new(ConcatPlugin::from_config(c)?)));
        catalog.register_process("explode", |c, _| Ok(Box::new(ExplodePlugin::from_config(c)?)));
        catalog.register_process("extract", |c, _| Ok(Box::new(ExtractPlugin::from_config(c)?)));
        catalog.register_process("flatten", |c, _| Ok(Box::new(FlattenPlugin::from_config(c)?)));
        catalog.register_process("skip_on_empty", |c, _| {
            Ok(Box::new(SkipOnEmptyPlugin::from_config(c)?))
        });
        catalog.register_process("skip_row_if_not_set", |c, _| {
            Ok(Box::new(SkipRowIfNotSetPlugin::from_config(c)?))
        });
        catalog.register_process("migration_lookup", |c, b| {
            Ok(Box::new(MigrationLookupPlugin::from_config(c, b)?))
        });
        catalog.register_process("sub_process", |c, b| {
            Ok(Box::new(SubProcessPlugin::from_config(c, b)?))
        });

        catalog.register_destination("entity", |c, s| {
            Ok(Arc::new(EntityDestination::from_config(c, s.entities.clone())?))
        });
        catalog.register_destination("component_entity_display", |_, s| {
            Ok(Arc::new(ComponentDisplayDestination::new(
                DisplayKind::View,
                s.entities.clone(),
                s.prior.clone(),
            )))
        });
        catalog.register_destination("component_entity_form_display", |_, s| {
            Ok(Arc::new(ComponentDisplayDestination::new(
                DisplayKind::Form,
                s.entities.clone(),
                s.prior.clone(),
            )))
        });
        catalog.register_destination("field_group", |_, s| {
            Ok(Arc::new(FieldGroupDestination::new(
                s.entities.clone(),
                s.prior.clone(),
            )))
        });
        catalog.register_destination("config", |c, s| {
            Ok(Arc::new(ConfigDestination::from_config(c, s.config.clone())?))
        });
        catalog.register_destination("authmap", |c, s| {
            Ok(Arc::new(AuthmapDestination::from_config(c, s.authmap.clone())?))
        });

        catalog
    }

    /// Register a source plugin.
    pub fn register_source(&mut self, id: impl Into<String>, factory: SourceFactory) {
        self.sources.insert(id.into(), factory);
    }

    /// Register a process plugin.
    pub fn register_process(&mut self, id: impl Into<String>, factory: ProcessFactory) {
        self.processes.insert(id.into(), factory);
    }

    /// Register a destination plugin (or a `base` for `base:derivative` ids).
    pub fn register_destination(&mut self, id: impl Into<String>, factory: DestinationFactory) {
        self.destinations.insert(id.into(), factory);
    }

    /// Build a source plugin.
    pub fn create_source(&self, config: &PluginConfig, services: &Services) -> Result<Arc<dyn Source>> {
        let factory = self
            .sources
            .get(&config.plugin)
            .ok_or_else(|| MigrateError::Config(format!("Unknown source plugin: {}", config.plugin)))?;
        factory(config, services)
    }

    /// Build a process step.
    pub fn create_process(
        &self,
        config: &PluginConfig,
        builder: &PipelineBuilder<'_>,
    ) -> Result<Box<dyn ProcessPlugin>> {
        let factory = self
            .processes
            .get(&config.plugin)
            .ok_or_else(|| MigrateError::Config(format!("Unknown process plugin: {}", config.plugin)))?;
        factory(config, builder)
    }

    /// Build a destination plugin.
    pub fn create_destination(
        &self,
        config: &PluginConfig,
        services: &Services,
    ) -> Result<Arc<dyn Destination>> {
        let factory = self
            .destinations
            .get(&config.plugin)
            .or_else(|| {
                let (base, _) = config.plugin.split_once(':')?;
                self.destinations.get(base)
            })
            .ok_or_else(|| {
                MigrateError::Config(format!("Unknown destination plugin: {}", config.plugin))
            })?;
        factory(config, services)
    }

    /// Check if a source plugin is registered.
    pub fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Check if a process plugin is registered.
    pub fn has_process(&self, id: &str) -> bool {
        self.processes.contains_key(id)
    }

    /// Registered source plugin ids, sorted.
    pub fn source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Registered destination plugin ids, sorted.
    pub fn destination_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.destinations.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    async fn services() -> Services {
        let target = SqliteTarget::from_pool(memory_pool().await).await.unwrap();
        Services::new(Some(LegacyDb::from_pool(memory_pool().await)), target)
    }

    #[test]
    fn test_builtins_registered() {
        let catalog = PluginCatalog::with_builtins();
        for id in ["d6_node_type", "d6_metatag_field_instance", "embedded_data"] {
            assert!(catalog.has_source(id), "missing source {}", id);
        }
        for id in ["get", "migration_lookup", "sub_process"] {
            assert!(catalog.has_process(id), "missing process {}", id);
        }
        assert!(catalog.destination_ids().contains(&"field_group"));
    }

    #[test]
    fn test_plugin_config_from_yaml() {
        let config: PluginConfig = serde_yaml::from_str(
            "plugin: d6_taxonomy_term\nbundle: [5]\nlabel: Terms\n",
        )
        .unwrap();
        assert_eq!(config.plugin, "d6_taxonomy_term");
        assert_eq!(config.option("bundle"), Some(&Value::List(vec![Value::Int(5)])));
        assert_eq!(config.str_option("label"), Some("Terms"));
        assert!(config.require_str("missing").is_err());
    }

    #[tokio::test]
    async fn test_create_plugins() {
        let catalog = PluginCatalog::with_builtins();
        let services = services().await;

        let source = catalog
            .create_source(&PluginConfig::new("d6_node_type"), &services)
            .unwrap();
        assert_eq!(source.plugin_id(), "d6_node_type");

        let destination = catalog
            .create_destination(&PluginConfig::new("entity:taxonomy_term"), &services)
            .unwrap();
        assert_eq!(destination.plugin_id(), "entity:taxonomy_term");

        assert!(catalog
            .create_source(&PluginConfig::new("d7_node"), &services)
            .is_err());
        assert!(catalog
            .create_destination(&PluginConfig::new("entity:webform"), &services)
            .is_err());
    }

    #[tokio::test]
    async fn test_sql_source_needs_legacy_database() {
        let catalog = PluginCatalog::with_builtins();
        let target = SqliteTarget::from_pool(memory_pool().await).await.unwrap();
        let services = Services::new(None, target);
        assert!(catalog
            .create_source(&PluginConfig::new("d6_url_alias"), &services)
            .is_err());
    }
}
