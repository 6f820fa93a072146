//! `config`: write destination properties into a named config object.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::catalog::PluginConfig;
use crate::core::row::Row;
use crate::core::schema::{FieldInfo, IdSchema};
use crate::core::traits::{Destination, Imported, RollbackKind};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::target::ConfigStorage;

const PLUGIN_ID: &str = "config";

/// Merges every destination property into the config object named by the
/// `config_name` option. Nested maps are merged key by key.
///
/// Config objects are shared by many writers and carry no record of their
/// previous values, so this destination cannot be rolled back.
pub struct ConfigDestination {
    config_name: String,
    storage: Arc<dyn ConfigStorage>,
}

impl ConfigDestination {
    pub fn new(config_name: impl Into<String>, storage: Arc<dyn ConfigStorage>) -> Self {
        Self {
            config_name: config_name.into(),
            storage,
        }
    }

    pub fn from_config(config: &PluginConfig, storage: Arc<dyn ConfigStorage>) -> Result<Self> {
        Ok(Self::new(config.require_str("config_name")?, storage))
    }
}

fn merge_into(target: &mut BTreeMap<String, Value>, values: &BTreeMap<String, Value>) {
    for (key, value) in values {
        match (target.get_mut(key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => merge_into(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl Destination for ConfigDestination {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        Vec::new()
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().string("config_name")
    }

    async fn import(&self, row: &Row, _old_destination_ids: &[Value]) -> Result<Imported> {
        let mut data = self.storage.get(&self.config_name).await?.unwrap_or_default();
        merge_into(&mut data, row.destination());
        self.storage.set(&self.config_name, &data).await?;
        Ok(Imported::preserved(vec![self.config_name.as_str().into()]))
    }

    async fn rollback(&self, _destination_ids: &[Value]) -> Result<()> {
        Err(MigrateError::destination(
            PLUGIN_ID,
            format!("config object {} cannot be rolled back", self.config_name),
        ))
    }

    fn rollback_kind(&self) -> RollbackKind {
        RollbackKind::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::map;
    use crate::db::testing::memory_pool;
    use crate::target::SqliteTarget;

    #[tokio::test]
    async fn test_import_merges_nested_keys() {
        let storage = Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap());
        let initial = BTreeMap::from([
            ("name".to_string(), Value::from("Old")),
            ("page".to_string(), map([("front", "node"), ("403", "denied")])),
        ]);
        storage.set("system.site", &initial).await.unwrap();

        let destination = ConfigDestination::new("system.site", storage.clone());
        let mut row = Row::new(
            BTreeMap::from([("id".to_string(), Value::Int(1))]),
            &IdSchema::new().integer("id"),
        )
        .unwrap();
        row.set_destination_property("name", "Site");
        row.set_destination_property("page/front", "home");

        let imported = destination.import(&row, &[]).await.unwrap();
        assert_eq!(imported.ids, vec![Value::from("system.site")]);

        let data = storage.get("system.site").await.unwrap().unwrap();
        assert_eq!(data["name"], Value::from("Site"));
        assert_eq!(data["page"], map([("front", "home"), ("403", "denied")]));
    }

    #[tokio::test]
    async fn test_rollback_is_unsupported() {
        let storage = Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap());
        let destination = ConfigDestination::new("system.site", storage);
        assert!(!destination.supports_rollback());
        assert!(destination.rollback(&["system.site".into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_config_name_is_required() {
        let storage = Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap());
        let config = PluginConfig::new("config");
        assert!(ConfigDestination::from_config(&config, storage.clone()).is_err());

        let config = config.with("config_name", "system.site");
        assert!(ConfigDestination::from_config(&config, storage).is_ok());
    }
}
