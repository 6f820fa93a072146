//! `authmap`: external authentication mappings.

use std::sync::Arc;

use async_trait::async_trait;

use super::{id_string, required_string};
use crate::core::catalog::PluginConfig;
use crate::core::row::Row;
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{check_destination_ids, Destination, Imported};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::target::{AuthmapEntry, AuthmapStorage};

const PLUGIN_ID: &str = "authmap";

pub struct AuthmapDestination {
    storage: Arc<dyn AuthmapStorage>,
}

impl AuthmapDestination {
    pub fn new(storage: Arc<dyn AuthmapStorage>) -> Self {
        Self { storage }
    }

    pub fn from_config(_config: &PluginConfig, storage: Arc<dyn AuthmapStorage>) -> Result<Self> {
        Ok(Self::new(storage))
    }
}

fn uid_of(value: Option<&Value>) -> Result<i64> {
    value
        .and_then(Value::as_i64)
        .filter(|uid| *uid > 0)
        .ok_or_else(|| MigrateError::destination(PLUGIN_ID, "required property 'uid' is missing"))
}

#[async_trait]
impl Destination for AuthmapDestination {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("uid", "Primary key: users.uid for user"),
            ("provider", "The name of the authentication provider"),
            ("authname", "Unique authentication name"),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().integer("uid").string("provider")
    }

    async fn import(&self, row: &Row, _old_destination_ids: &[Value]) -> Result<Imported> {
        let entry = AuthmapEntry {
            uid: uid_of(row.destination_property("uid"))?,
            provider: required_string(row, PLUGIN_ID, "provider")?,
            authname: required_string(row, PLUGIN_ID, "authname")?,
        };
        self.storage.save(&entry).await?;
        Ok(Imported::created(vec![
            Value::Int(entry.uid),
            Value::String(entry.provider),
        ]))
    }

    async fn rollback(&self, destination_ids: &[Value]) -> Result<()> {
        check_destination_ids(PLUGIN_ID, &self.ids(), destination_ids)?;
        let uid = uid_of(destination_ids.first())?;
        self.storage.delete(uid, &id_string(destination_ids, 1)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::db::testing::memory_pool;
    use crate::target::SqliteTarget;

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new(
            BTreeMap::from([("aid".to_string(), Value::Int(1))]),
            &IdSchema::new().integer("aid"),
        )
        .unwrap();
        for (key, value) in pairs {
            row.set_destination_property(key, value.clone());
        }
        row
    }

    #[tokio::test]
    async fn test_import_and_rollback() {
        let storage = Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap());
        let destination = AuthmapDestination::new(storage.clone());

        let imported = destination
            .import(
                &row(&[
                    ("uid", Value::Int(3)),
                    ("provider", "openid".into()),
                    ("authname", "https://example.com/alice".into()),
                ]),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(imported.ids, vec![Value::Int(3), Value::from("openid")]);

        let entry = AuthmapStorage::get(storage.as_ref(), 3, "openid").await.unwrap();
        assert_eq!(entry.unwrap().authname, "https://example.com/alice");

        destination.rollback(&imported.ids).await.unwrap();
        assert!(AuthmapStorage::get(storage.as_ref(), 3, "openid").await.unwrap().is_none());
        destination.rollback(&imported.ids).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_properties_fail() {
        let storage = Arc::new(SqliteTarget::from_pool(memory_pool().await).await.unwrap());
        let destination = AuthmapDestination::new(storage);
        let result = destination
            .import(&row(&[("uid", Value::Int(3)), ("provider", "openid".into())]), &[])
            .await;
        assert!(result.is_err());
    }
}
