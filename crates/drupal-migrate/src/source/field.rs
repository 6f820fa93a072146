//! Drupal 6 CCK field instance displays and field groups.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{fetch_page, LegacyDb, Operator, SelectQuery};
use crate::core::php;
use crate::core::row::Row;
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::core::value::Value;
use crate::db::Record;
use crate::error::Result;

/// Keys of `display_settings` that are not view modes.
const NON_VIEW_MODE_KEYS: &[&str] = &["label", "parent", "weight"];

/// `d6_field_instance_per_view_mode`: one row per (field instance, view mode)
/// whose display is neither hidden nor excluded.
pub struct FieldInstancePerViewModeSource {
    db: LegacyDb,
}

impl FieldInstancePerViewModeSource {
    const PLUGIN_ID: &'static str = "d6_field_instance_per_view_mode";

    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("content_node_field_instance", "cnfi")
            .fields(
                "cnfi",
                &[
                    "field_name",
                    "type_name",
                    "weight",
                    "label",
                    "display_settings",
                    "widget_settings",
                ],
            )
            .join("content_node_field", "cnf", "cnfi.field_name", "cnf.field_name")
            .fields("cnf", &["type", "module"])
    }
}

/// Whether a view mode's display settings make it visible.
fn displayed(settings: &Value) -> bool {
    let hidden = settings
        .get_path(&["format"])
        .and_then(Value::as_str)
        .is_some_and(|f| f == "hidden");
    let excluded = settings.get_path(&["exclude"]).is_some_and(Value::as_bool);
    settings.is_array() && !hidden && !excluded
}

#[async_trait]
impl Source for FieldInstancePerViewModeSource {
    fn plugin_id(&self) -> &str {
        Self::PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("entity_type", "The entity type ID."),
            ("view_mode", "The view mode this row describes."),
            ("type_name", "Content type where this field is used."),
            ("field_name", "Field name."),
            ("type", "Field type."),
            ("module", "Module that implements the field type."),
            ("weight", "Weight."),
            ("label", "Label position of the field in this view mode."),
            ("display_settings", "Display settings for this view mode."),
            ("widget_settings", "Widget settings."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new()
            .string("entity_type")
            .string("type_name")
            .string("view_mode")
            .string("field_name")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["content_node_field_instance".into(), "content_node_field".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db
            .require_tables(Self::PLUGIN_ID, &self.required_tables())
            .await?;
        self.db
            .require_columns(
                Self::PLUGIN_ID,
                "content_node_field_instance",
                &["display_settings", "widget_settings"],
            )
            .await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["type_name", "field_name"], request).await
    }

    async fn prepare_row(&self, row: Row) -> Result<Vec<Row>> {
        let display = php::unserialize_lenient(
            row.source_property("display_settings").unwrap_or(&Value::Null),
        );
        let widget = php::unserialize_lenient(
            row.source_property("widget_settings").unwrap_or(&Value::Null),
        );
        let label = display
            .get_path(&["label", "format"])
            .cloned()
            .unwrap_or_default();

        let Some(modes) = display.as_map() else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (view_mode, settings) in modes {
            if NON_VIEW_MODE_KEYS.contains(&view_mode.as_str()) || !displayed(settings) {
                continue;
            }
            let mut source: BTreeMap<String, Value> = BTreeMap::new();
            for key in ["type_name", "field_name", "type", "module", "weight"] {
                source.insert(
                    key.to_string(),
                    row.source_property(key).cloned().unwrap_or_default(),
                );
            }
            source.insert("entity_type".into(), Value::from("node"));
            source.insert("view_mode".into(), Value::from(view_mode.as_str()));
            source.insert("label".into(), label.clone());
            source.insert("display_settings".into(), settings.clone());
            source.insert("widget_settings".into(), widget.clone());
            rows.push(Row::from_record(source));
        }
        Ok(rows)
    }
}

/// `d6_field_group`: `content_group` records with their child fields.
pub struct FieldGroupSource {
    db: LegacyDb,
}

impl FieldGroupSource {
    const PLUGIN_ID: &'static str = "d6_field_group";

    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("content_group", "cg").fields(
            "cg",
            &["group_type", "type_name", "group_name", "label", "settings", "weight"],
        )
    }
}

#[async_trait]
impl Source for FieldGroupSource {
    fn plugin_id(&self) -> &str {
        Self::PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("group_type", "The group type (standard or multigroup)."),
            ("type_name", "Content type of the group."),
            ("group_name", "Machine name of the group."),
            ("label", "Label of the group."),
            ("settings", "Form and display settings of the group."),
            ("weight", "Weight of the group."),
            ("children", "Field names in the group."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().string("type_name").string("group_name")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["content_group".into(), "content_group_fields".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db
            .require_tables(Self::PLUGIN_ID, &self.required_tables())
            .await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["type_name", "group_name"], request).await
    }

    async fn prepare_row(&self, mut row: Row) -> Result<Vec<Row>> {
        let type_name = row.source_property("type_name").cloned().unwrap_or_default();
        let group_name = row.source_property("group_name").cloned().unwrap_or_default();
        let children = self
            .db
            .select(
                &SelectQuery::new("content_group_fields", "cgf")
                    .fields("cgf", &["field_name"])
                    .condition("cgf.type_name", Operator::Eq, type_name)
                    .condition("cgf.group_name", Operator::Eq, group_name)
                    .order_by("cgf.field_name", true),
            )
            .await?;
        let children: Vec<Value> = children
            .into_iter()
            .filter_map(|mut r| r.remove("field_name"))
            .collect();
        row.set_source_property("children", children)?;

        let settings = php::unserialize_lenient(row.source_property("settings").unwrap_or(&Value::Null));
        row.set_source_property("settings", settings)?;
        Ok(vec![row])
    }
}
