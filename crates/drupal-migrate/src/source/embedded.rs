//! Rows declared inline in the migration configuration.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::core::schema::{FieldInfo, IdKind, IdSchema};
use crate::core::traits::{PageRequest, Source};
use crate::core::value::Value;
use crate::db::Record;
use crate::error::{MigrateError, Result};

const PLUGIN_ID: &str = "embedded_data";

/// `embedded_data`: rows from the `data_rows` option, keyed by the `ids`
/// option (`{name: {type: integer|string}}`).
#[derive(Debug, Clone)]
pub struct EmbeddedDataSource {
    rows: Vec<Record>,
    ids: IdSchema,
}

impl EmbeddedDataSource {
    /// Create the source from already-parsed rows.
    pub fn new(rows: Vec<Record>, ids: IdSchema) -> Self {
        Self { rows, ids }
    }

    /// Parse `data_rows` and `ids` options.
    pub fn from_options(data_rows: Option<&Value>, ids: Option<&Value>) -> Result<Self> {
        let rows = match data_rows {
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_map().cloned().ok_or_else(|| {
                        MigrateError::Config(format!("{}: each data row must be a map", PLUGIN_ID))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
            Some(_) => {
                return Err(MigrateError::Config(format!(
                    "{}: data_rows must be a list",
                    PLUGIN_ID
                )))
            }
        };

        let ids_map = ids.and_then(Value::as_map).ok_or_else(|| {
            MigrateError::Config(format!("{}: the ids option is required", PLUGIN_ID))
        })?;
        let mut schema = IdSchema::new();
        for (name, spec) in ids_map {
            let kind = spec.get_path(&["type"]).and_then(Value::as_str).unwrap_or("string");
            schema = match kind {
                "integer" | "int" => schema.integer(name),
                "string" => schema.string(name),
                other => {
                    return Err(MigrateError::Config(format!(
                        "{}: unknown id type '{}' for {}",
                        PLUGIN_ID, other, name
                    )))
                }
            };
        }
        Ok(Self::new(rows, schema))
    }
}

/// Compare two values for high-water filtering.
fn compare(a: &Value, b: &Value, kind: Option<IdKind>) -> Option<Ordering> {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) if kind != Some(IdKind::String) => Some(x.cmp(&y)),
        _ => Some(a.to_key()?.cmp(&b.to_key()?)),
    }
}

#[async_trait]
impl Source for EmbeddedDataSource {
    fn plugin_id(&self) -> &str {
        PLUGIN_ID
    }

    fn fields(&self) -> Vec<FieldInfo> {
        let mut names: Vec<&String> = self.rows.iter().flat_map(|r| r.keys()).collect();
        names.sort();
        names.dedup();
        names
            .into_iter()
            .map(|name| FieldInfo {
                name: name.clone(),
                label: name.clone(),
            })
            .collect()
    }

    fn ids(&self) -> IdSchema {
        self.ids.clone()
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>> {
        let kind = request.high_water.as_ref().and_then(|mark| {
            self.ids
                .fields()
                .iter()
                .find(|f| f.name == mark.property)
                .map(|f| f.kind)
        });
        Ok(self
            .rows
            .iter()
            .filter(|row| match &request.high_water {
                Some(mark) => row
                    .get(&mark.property)
                    .and_then(|v| compare(v, &mark.value, kind))
                    .is_some_and(|o| o == Ordering::Greater),
                None => true,
            })
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .cloned()
            .collect())
    }
}
