//! Drupal 6 vocabularies and terms.

use async_trait::async_trait;

use super::{fetch_page, LegacyDb, Operator, SelectQuery};
use crate::core::row::Row;
use crate::core::schema::{field_list, FieldInfo, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::core::value::Value;
use crate::db::Record;
use crate::error::{MigrateError, Result};

/// Cardinality of a multi-valued field.
const CARDINALITY_UNLIMITED: i64 = -1;

/// `d6_taxonomy_vocabulary`: vocabularies with the node types they apply to.
pub struct VocabularySource {
    db: LegacyDb,
}

impl VocabularySource {
    const PLUGIN_ID: &'static str = "d6_taxonomy_vocabulary";

    pub fn new(db: LegacyDb) -> Self {
        Self { db }
    }

    fn base_query(&self) -> SelectQuery {
        SelectQuery::new("vocabulary", "v").fields(
            "v",
            &[
                "vid",
                "name",
                "description",
                "help",
                "relations",
                "hierarchy",
                "multiple",
                "required",
                "tags",
                "module",
                "weight",
            ],
        )
    }
}

#[async_trait]
impl Source for VocabularySource {
    fn plugin_id(&self) -> &str {
        Self::PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("vid", "The vocabulary ID."),
            ("name", "The name of the vocabulary."),
            ("description", "The description of the vocabulary."),
            ("help", "Help text to display for the vocabulary."),
            ("relations", "Whether or not related terms are enabled within the vocabulary."),
            ("hierarchy", "The type of hierarchy allowed within the vocabulary."),
            ("multiple", "Whether or not multiple terms from this vocabulary may be assigned to a node."),
            ("required", "Whether or not terms are required for nodes using this vocabulary."),
            ("tags", "Whether or not free tagging is enabled for the vocabulary."),
            ("weight", "The weight of the vocabulary in relation to other vocabularies."),
            ("node_types", "Node types the vocabulary applies to."),
            ("cardinality", "Number of terms a node may reference."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().integer("vid")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["vocabulary".into(), "vocabulary_node_types".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db
            .require_tables(Self::PLUGIN_ID, &self.required_tables())
            .await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["vid"], request).await
    }

    async fn prepare_row(&self, mut row: Row) -> Result<Vec<Row>> {
        let vid = row.source_property("vid").cloned().unwrap_or_default();
        let types = self
            .db
            .select(
                &SelectQuery::new("vocabulary_node_types", "vnt")
                    .fields("vnt", &["type"])
                    .condition("vnt.vid", Operator::Eq, vid)
                    .order_by("vnt.type", true),
            )
            .await?;
        let node_types: Vec<Value> = types
            .into_iter()
            .filter_map(|mut r| r.remove("type"))
            .collect();
        row.set_source_property("node_types", node_types)?;

        let multi = row.source_property("tags").is_some_and(Value::as_bool)
            || row.source_property("multiple").is_some_and(Value::as_bool);
        row.set_source_property("cardinality", if multi { CARDINALITY_UNLIMITED } else { 1 })?;

        Ok(vec![row])
    }
}

/// `d6_taxonomy_term`: terms with their parents, optionally restricted to
/// some vocabularies.
pub struct TermSource {
    db: LegacyDb,
    bundle: Option<Vec<Value>>,
}

impl TermSource {
    const PLUGIN_ID: &'static str = "d6_taxonomy_term";

    /// Create the source. `bundle` restricts iteration to these vocabulary ids.
    pub fn new(db: LegacyDb, bundle: Option<Vec<Value>>) -> Self {
        Self { db, bundle }
    }

    /// Parse the `bundle` option: a single vocabulary id or a list of them.
    pub fn bundle_option(option: Option<&Value>) -> Result<Option<Vec<Value>>> {
        let ids = match option {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::List(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        };
        ids.iter()
            .map(|v| {
                v.as_i64().map(Value::Int).ok_or_else(|| {
                    MigrateError::Config(format!(
                        "{}: bundle must be a vocabulary id, got {}",
                        Self::PLUGIN_ID,
                        v
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    fn base_query(&self) -> SelectQuery {
        let query = SelectQuery::new("term_data", "td")
            .fields("td", &["tid", "vid", "name", "description", "weight"])
            .distinct();
        match &self.bundle {
            Some(vids) => query.condition_in("td.vid", vids.clone()),
            None => query,
        }
    }
}

#[async_trait]
impl Source for TermSource {
    fn plugin_id(&self) -> &str {
        Self::PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        field_list(&[
            ("tid", "The term ID."),
            ("vid", "Existing term VID"),
            ("name", "The name of the term."),
            ("description", "The term description."),
            ("weight", "Weight"),
            ("parent", "Parent term IDs."),
        ])
    }

    fn ids(&self) -> IdSchema {
        IdSchema::new().integer("tid")
    }

    fn query(&self) -> Option<SelectQuery> {
        Some(self.base_query())
    }

    fn required_tables(&self) -> Vec<String> {
        vec!["term_data".into(), "term_hierarchy".into()]
    }

    async fn check_requirements(&self) -> Result<()> {
        self.db
            .require_tables(Self::PLUGIN_ID, &self.required_tables())
            .await
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        fetch_page(&self.db, &self.base_query(), &["tid"], request).await
    }

    async fn prepare_row(&self, mut row: Row) -> Result<Vec<Row>> {
        let tid = row.source_property("tid").cloned().unwrap_or_default();
        let parents = self
            .db
            .select(
                &SelectQuery::new("term_hierarchy", "th")
                    .fields("th", &["parent"])
                    .condition("th.tid", Operator::Eq, tid)
                    .order_by("th.parent", true),
            )
            .await?;
        let parent: Vec<Value> = parents
            .into_iter()
            .filter_map(|mut r| r.remove("parent"))
            .collect();
        row.set_source_property("parent", parent)?;
        Ok(vec![row])
    }
}
