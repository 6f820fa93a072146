//! Drupal 6 content types.

use async_trait::async_trait;

use super::{count_query, fetch_page, LegacyDb, SelectQuery};
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::db::Record;
use crate::error::Result;

const PLUGIN_ID: &str = "d6_node_type";

/// `d6_node_type`: one row per `node_type` record, unchanged.
pub struct NodeTypeSource {
    db: LegacyDb,
}

impl NodeTypeSource {
    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("node_type", "t").all_fields("t")
    }
}

#[async_trait]
impl Source for NodeTypeSource {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("type", "Machine name of the node type."),
            ("name", "Human name of the node type."),
            ("module", "The module providing the node type."),
            ("description", "Description of the node type."),
            ("help", "Help text for the node type."),
            ("title_label", "Title label."),
            ("has_body", "Flag indicating the node type has a body field."),
            ("body_label", "Body label."),
            ("min_word_count", "Minimum word count for the body field."),
            ("custom", "Flag."),
            ("modified", "Flag."),
            ("locked", "Flag."),
            ("orig_type", "The original type."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().string("type")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["node_type".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db.require_tables(PLUGIN_ID, &self.required_tables()).await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["type"], request).await
    }

    async fn count(&self) -> Result<u64> {
        self.check_requirements().await?;
        count_query(&self.db, &self.base_query()).await
    }
}
