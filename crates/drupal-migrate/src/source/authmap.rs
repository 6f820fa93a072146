//! Drupal 6 external authentication mappings.

use async_trait::async_trait;

use super::{count_query, fetch_page, LegacyDb, SelectQuery};
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::db::Record;
use crate::error::Result;

const PLUGIN_ID: &str = "d6_authmap";

/// `d6_authmap`: one row per `authmap` record.
pub struct AuthmapSource {
    db: LegacyDb,
}

impl AuthmapSource {
    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("authmap", "a").fields("a", &["aid", "uid", "authname", "module"])
    }
}

#[async_trait]
impl Source for AuthmapSource {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("aid", "Primary key: Unique authmap ID."),
            ("uid", "User's users.uid."),
            ("authname", "Unique authentication name."),
            ("module", "Module which is controlling the authentication."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().integer("aid")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["authmap".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db.require_tables(PLUGIN_ID, &self.required_tables()).await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["aid"], request).await
    }

    async fn count(&self) -> Result<u64> {
        self.check_requirements().await?;
        count_query(&self.db, &self.base_query()).await
    }
}
