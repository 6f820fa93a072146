//! Drupal 6 Nodewords settings, expanded into per-bundle metatag field
//! instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{fetch_page, LegacyDb, SelectQuery};
use crate::core::row::Row;
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{BundleInfo, PageRequest, Source};
use crate::core::value::Value;
use crate::db::Record;
use crate::error::Result;

const PLUGIN_ID: &str = "d6_metatag_field_instance";

/// Map a Nodewords `type` code to a Drupal 8 entity type.
///
/// Only node (5), term (6) and user (8) settings carry per-entity tags;
/// the remaining codes (front page, pager, ...) have no field instance.
fn entity_type_for(code: i64) -> Option<&'static str> {
    match code {
        5 => Some("node"),
        6 => Some("taxonomy_term"),
        8 => Some("user"),
        _ => None,
    }
}

/// `d6_metatag_field_instance`: one row per (entity type, bundle) that has
/// Nodewords data.
pub struct MetatagFieldInstanceSource {
    db: LegacyDb,
    bundle_info: Arc<dyn BundleInfo>,
}

impl MetatagFieldInstanceSource {
    pub fn new(db: LegacyDb, bundle_info: Arc<dyn BundleInfo>) -> Self {
        Self { db, bundle_info }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("nodewords", "n").fields("n", &["type"]).distinct()
    }
}

#[async_trait]
impl Source for MetatagFieldInstanceSource {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("type", "Nodewords type code."),
            ("entity_type", "Entity type the metatag field is attached to."),
            ("bundle", "Bundle the metatag field is attached to."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().string("entity_type").string("bundle")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["nodewords".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db.require_tables(PLUGIN_ID, &self.required_tables()).await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["type"], request).await
    }

    async fn prepare_row(&self, row: Row) -> Result<Vec<Row>> {
        let code = row.source_property("type").and_then(Value::as_i64);
        let Some(entity_type) = code.and_then(entity_type_for) else {
            return Ok(Vec::new());
        };

        let bundles = self.bundle_info.bundles(entity_type).await?;
        Ok(bundles
            .into_iter()
            .map(|bundle| {
                let mut source: BTreeMap<String, Value> = row.source().clone();
                source.insert("entity_type".into(), Value::from(entity_type));
                source.insert("bundle".into(), Value::from(bundle));
                Row::from_record(source)
            })
            .collect())
    }
}
