//! `sub_process`: run a nested pipeline over each element of an array.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Pipeline, PipelineBuilder, ProcessContext, ProcessPlugin, ProcessResult};
use crate::core::catalog::PluginConfig;
use crate::core::row::Row;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// `sub_process`: each element (a map) becomes the source of a nested row;
/// the nested row's destination properties form the output element.
///
/// With `key`, the output is a map keyed by that property of each nested
/// row. With `include_source`, the parent row's source is visible under
/// `source_key` (default `source`).
pub struct SubProcessPlugin {
    pipeline: Pipeline,
    key: Option<String>,
    include_source: bool,
    source_key: String,
}

impl SubProcessPlugin {
    pub fn from_config(config: &PluginConfig, builder: &PipelineBuilder<'_>) -> Result<Self> {
        let process = config.process.as_ref().ok_or_else(|| {
            MigrateError::Config("sub_process: the 'process' option is required".into())
        })?;
        Ok(Self {
            pipeline: builder.build(process)?,
            key: config.str_option("key").map(str::to_string),
            include_source: config.bool_option("include_source"),
            source_key: config.str_option("source_key").unwrap_or("source").to_string(),
        })
    }
}

#[async_trait]
impl ProcessPlugin for SubProcessPlugin {
    fn plugin_id(&self) -> &str {
        "sub_process"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        if value.is_null() {
            return Ok(Value::List(Vec::new()));
        }
        if !value.is_array() {
            return Err(ctx.failed("sub_process input must be an array"));
        }

        let mut list = Vec::new();
        let mut keyed = BTreeMap::new();
        for element in value.elements() {
            let Value::Map(fields) = element else {
                return Err(ctx.failed("sub_process elements must be maps"));
            };
            let mut record = fields.clone();
            if self.include_source {
                record.insert(self.source_key.clone(), Value::Map(ctx.row.source().clone()));
            }
            let mut nested = Row::from_record(record);
            self.pipeline.process_row(&mut nested).await?;

            let output = Value::Map(nested.destination().clone());
            match &self.key {
                Some(key) => {
                    let name = nested
                        .get(key)
                        .and_then(Value::to_key)
                        .ok_or_else(|| ctx.failed(format!("sub_process key '{}' is not scalar", key)))?;
                    keyed.insert(name, output);
                }
                None => list.push(output),
            }
        }
        Ok(if self.key.is_some() {
            Value::Map(keyed)
        } else {
            Value::List(list)
        })
    }
}
