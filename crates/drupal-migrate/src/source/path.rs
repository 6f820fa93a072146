//! Drupal 6 URL aliases.

use async_trait::async_trait;

use super::{count_query, fetch_page, LegacyDb, SelectQuery};
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::db::Record;
use crate::error::Result;

const PLUGIN_ID: &str = "d6_url_alias";

/// `d6_url_alias`: one row per `url_alias` record.
pub struct UrlAliasSource {
    db: LegacyDb,
}

impl UrlAliasSource {
    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("url_alias", "ua").fields("ua", &["pid", "src", "dst", "language"])
    }
}

#[async_trait]
impl Source for UrlAliasSource {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("pid", "The numeric identifier of the path alias."),
            ("src", "The internal system path."),
            ("dst", "The path alias."),
            ("language", "The language code of the URL alias."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().integer("pid")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["url_alias".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db.require_tables(PLUGIN_ID, &self.required_tables()).await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["pid"], request).await
    }

    async fn count(&self) -> Result<u64> {
        self.check_requirements().await?;
        count_query(&self.db, &self.base_query()).await
    }
}
