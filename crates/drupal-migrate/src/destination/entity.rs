//! `entity:<type>`: create or update one entity per row.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::id_string;
use crate::core::catalog::PluginConfig;
use crate::core::row::Row;
use crate::core::schema::{FieldInfo, IdSchema};
use crate::core::traits::{check_destination_ids, Destination, Imported};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::id_map::RollbackAction;
use crate::target::{entity_type, Entity, EntityKind, EntityStorage, EntityTypeDef};

/// Writes destination properties as the values of one entity.
///
/// On re-import the entity recorded in the ID map is loaded and updated in
/// place. An entity that already existed before its first import is
/// recorded with [`RollbackAction::Preserve`].
pub struct EntityDestination {
    plugin_id: String,
    def: &'static EntityTypeDef,
    default_bundle: Option<String>,
    storage: Arc<dyn EntityStorage>,
}

impl EntityDestination {
    pub fn new(entity_type_id: &str, storage: Arc<dyn EntityStorage>) -> Result<Self> {
        Ok(Self {
            plugin_id: format!("entity:{}", entity_type_id),
            def: entity_type(entity_type_id)?,
            default_bundle: None,
            storage,
        })
    }

    pub fn from_config(config: &PluginConfig, storage: Arc<dyn EntityStorage>) -> Result<Self> {
        let (_, entity_type_id) = config.plugin.split_once(':').ok_or_else(|| {
            MigrateError::Config(format!(
                "Entity destination needs an entity type (entity:<type>), got {}",
                config.plugin
            ))
        })?;
        let mut destination = Self::new(entity_type_id, storage)?;
        destination.default_bundle = config.str_option("default_bundle").map(str::to_string);
        Ok(destination)
    }

    /// Id for the row: the recorded one on re-import, else the row's own.
    fn target_id(&self, row: &Row, old_destination_ids: &[Value]) -> Option<Value> {
        old_destination_ids
            .first()
            .cloned()
            .or_else(|| row.destination_property(self.def.id_key).cloned())
            .filter(|v| !v.is_null())
    }
}

#[async_trait]
impl Destination for EntityDestination {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn fields(&self) -> Vec<FieldInfo> {
        let mut fields = vec![FieldInfo {
            name: self.def.id_key.to_string(),
            label: format!("The {} id", self.def.id),
        }];
        if let Some(bundle) = self.def.bundle_key {
            fields.push(FieldInfo {
                name: bundle.to_string(),
                label: "Bundle".to_string(),
            });
        }
        fields
    }

    fn ids(&self) -> IdSchema {
        match self.def.kind {
            EntityKind::Config => IdSchema::new().string(self.def.id_key),
            EntityKind::Content => IdSchema::new().integer(self.def.id_key),
        }
    }

    async fn import(&self, row: &Row, old_destination_ids: &[Value]) -> Result<Imported> {
        let id = self.target_id(row, old_destination_ids);
        let existing = match &id {
            Some(id) => self.storage.load(self.def.id, id).await?,
            None => None,
        };

        let rollback_action = match (old_destination_ids.is_empty(), &existing) {
            (true, Some(_)) => RollbackAction::Preserve,
            (true, None) => RollbackAction::Delete,
            (false, _) => row
                .id_map()
                .map(|entry| entry.rollback_action)
                .unwrap_or_default(),
        };

        let mut entity = existing.unwrap_or_else(|| Entity::new(self.def.id, Default::default()));
        for (key, value) in row.destination() {
            entity.set(key.clone(), value.clone());
        }
        if let (Some(bundle_key), Some(bundle)) = (self.def.bundle_key, &self.default_bundle) {
            if entity.get(bundle_key).map_or(true, Value::is_null) {
                entity.set(bundle_key, bundle.clone());
            }
        }
        if let Some(id) = id {
            entity.set(self.def.id_key, id);
        } else if self.def.kind == EntityKind::Config {
            return Err(MigrateError::destination(
                &self.plugin_id,
                format!("required property '{}' is missing", self.def.id_key),
            ));
        }

        let id = self.storage.save(&entity).await?;
        debug!("{} saved {}", self.plugin_id, id);
        Ok(Imported {
            ids: vec![id],
            rollback_action,
        })
    }

    async fn rollback(&self, destination_ids: &[Value]) -> Result<()> {
        check_destination_ids(&self.plugin_id, &self.ids(), destination_ids)?;
        let id = match self.def.kind {
            EntityKind::Config => Value::from(id_string(destination_ids, 0)),
            EntityKind::Content => destination_ids[0].clone(),
        };
        if !self.storage.delete(self.def.id, &id).await? {
            debug!("{} {} already gone", self.plugin_id, id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::db::testing::memory_pool;
    use crate::target::SqliteTarget;

    async fn storage() -> Arc<SqliteTarget> {
        Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap())
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new(
            BTreeMap::from([("id".to_string(), Value::Int(1))]),
            &IdSchema::new().integer("id"),
        )
        .unwrap();
        for (key, value) in pairs {
            row.set_destination_property(key, value.clone());
        }
        row
    }

    #[tokio::test]
    async fn test_import_and_rollback_round_trip() {
        let storage = storage().await;
        let destination = EntityDestination::new("node_type", storage.clone()).unwrap();
        let before = storage.list("node_type").await.unwrap();

        let imported = destination
            .import(&row(&[("type", "page".into()), ("name", "Page".into())]), &[])
            .await
            .unwrap();
        assert_eq!(imported, Imported::created(vec!["page".into()]));
        assert_eq!(storage.list("node_type").await.unwrap().len(), 1);

        destination.rollback(&imported.ids).await.unwrap();
        assert_eq!(storage.list("node_type").await.unwrap(), before);
        // Rolling back again is a no-op.
        destination.rollback(&imported.ids).await.unwrap();
    }

    #[tokio::test]
    async fn test_reimport_updates_the_recorded_entity() {
        let storage = storage().await;
        let destination = EntityDestination::new("taxonomy_term", storage.clone()).unwrap();

        let first = destination
            .import(&row(&[("name", "Drupal".into()), ("vid", "tags".into())]), &[])
            .await
            .unwrap();
        assert_eq!(first.ids, vec![Value::Int(1)]);

        let second = destination
            .import(&row(&[("name", "Drupal 8".into())]), &first.ids)
            .await
            .unwrap();
        assert_eq!(second.ids, first.ids);

        let term = storage.load("taxonomy_term", &Value::Int(1)).await.unwrap().unwrap();
        assert_eq!(term.get("name"), Some(&Value::from("Drupal 8")));
        assert_eq!(term.get("vid"), Some(&Value::from("tags")));
        assert_eq!(storage.list("taxonomy_term").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_entity_is_preserved() {
        let storage = storage().await;
        let existing = Entity::new(
            "node_type",
            BTreeMap::from([("type".to_string(), Value::from("page"))]),
        );
        storage.save(&existing).await.unwrap();

        let destination = EntityDestination::new("node_type", storage.clone()).unwrap();
        let imported = destination
            .import(&row(&[("type", "page".into()), ("name", "Page".into())]), &[])
            .await
            .unwrap();
        assert_eq!(imported.rollback_action, RollbackAction::Preserve);
    }

    #[tokio::test]
    async fn test_config_entity_requires_id_and_type_must_exist() {
        let storage = storage().await;
        let destination = EntityDestination::new("node_type", storage.clone()).unwrap();
        assert!(destination.import(&row(&[("name", "Page".into())]), &[]).await.is_err());
        assert!(EntityDestination::new("webform", storage).is_err());
    }

    #[tokio::test]
    async fn test_default_bundle() {
        let storage = storage().await;
        let config = PluginConfig::new("entity:taxonomy_term").with("default_bundle", "tags");
        let destination = EntityDestination::from_config(&config, storage.clone()).unwrap();
        let imported = destination
            .import(&row(&[("name", "news".into())]), &[])
            .await
            .unwrap();
        let term = storage.load("taxonomy_term", &imported.ids[0]).await.unwrap().unwrap();
        assert_eq!(term.get("vid"), Some(&Value::from("tags")));
    }
}
