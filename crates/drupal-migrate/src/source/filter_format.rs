//! Drupal 6 input formats and their filters.

use async_trait::async_trait;

use super::{fetch_page, LegacyDb, Operator, SelectQuery};
use crate::core::row::Row;
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::core::value::{map, Value};
use crate::db::Record;
use crate::error::Result;

const PLUGIN_ID: &str = "d6_filter_format";

/// Settings of the core `filter` module, keyed by filter delta, with the
/// defaults Drupal 6 applies when a variable was never saved.
fn filter_module_settings(delta: i64) -> &'static [(&'static str, DefaultSetting)] {
    match delta {
        0 => &[
            ("filter_html", DefaultSetting::Int(1)),
            (
                "allowed_html",
                DefaultSetting::Str("<a> <em> <strong> <cite> <code> <ul> <ol> <li> <dl> <dt> <dd>"),
            ),
            ("filter_html_help", DefaultSetting::Int(1)),
            ("filter_html_nofollow", DefaultSetting::Int(0)),
        ],
        2 => &[("filter_url_length", DefaultSetting::Int(72))],
        _ => &[],
    }
}

#[derive(Clone, Copy)]
enum DefaultSetting {
    Int(i64),
    Str(&'static str),
}

impl From<DefaultSetting> for Value {
    fn from(d: DefaultSetting) -> Self {
        match d {
            DefaultSetting::Int(i) => Value::Int(i),
            DefaultSetting::Str(s) => Value::from(s),
        }
    }
}

/// `d6_filter_format`: one row per format, with roles exploded and the
/// format's filters ordered by weight.
pub struct FilterFormatSource {
    db: LegacyDb,
}

impl FilterFormatSource {
    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("filter_formats", "f").fields("f", &["format", "name", "roles", "cache"])
    }

    async fn filters(&self, format: &Value) -> Result<Vec<Value>> {
        let records = self
            .db
            .select(
                &SelectQuery::new("filters", "f")
                    .fields("f", &["module", "delta", "weight"])
                    .condition("f.format", Operator::Eq, format.clone())
                    .order_by("f.weight", true)
                    .order_by("f.fid", true),
            )
            .await?;

        let mut filters = Vec::with_capacity(records.len());
        for record in records {
            let module = record.get("module").cloned().unwrap_or_default();
            let delta = record.get("delta").cloned().unwrap_or_default();
            let mut settings = std::collections::BTreeMap::new();
            if module.as_str() == Some("filter") {
                for (name, default) in filter_module_settings(delta.as_i64().unwrap_or(-1)) {
                    let variable = format!("{}_{}", name, format);
                    let value = self.db.variable(&variable).await?;
                    settings.insert(name.to_string(), value.unwrap_or_else(|| (*default).into()));
                }
            }
            filters.push(map([
                ("module", module),
                ("delta", delta),
                ("weight", record.get("weight").cloned().unwrap_or_default()),
                ("settings", Value::Map(settings)),
            ]));
        }
        Ok(filters)
    }
}

/// Explode a stored `,1,2,` role list into role ids.
fn explode_roles(raw: Option<&Value>) -> Vec<Value> {
    let raw = raw.and_then(Value::to_key).unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().map(Value::Int).unwrap_or_else(|_| Value::from(s)))
        .collect()
}

#[async_trait]
impl Source for FilterFormatSource {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("format", "Format ID."),
            ("name", "The name of the filter format."),
            ("roles", "The user roles that can use this filter format."),
            ("cache", "Flag to indicate whether format is cacheable."),
            ("filters", "The filters configured for this text format, ordered by weight."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().integer("format")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["filter_formats".into(), "filters".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db.require_tables(PLUGIN_ID, &self.required_tables()).await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["format"], request).await
    }

    async fn prepare_row(&self, mut row: Row) -> Result<Vec<Row>> {
        let format = row.source_property("format").cloned().unwrap_or_default();
        let filters = self.filters(&format).await?;
        row.set_source_property("filters", filters)?;

        let roles = explode_roles(row.source_property("roles"));
        row.set_source_property("roles", roles)?;
        Ok(vec![row])
    }
}
