//! Plugins that skip a row or a property: `skip_on_empty` and
//! `skip_row_if_not_set`.

use async_trait::async_trait;
use tracing::debug;

use super::{ProcessContext, ProcessPlugin, ProcessResult, ProcessSignal};
use crate::core::catalog::PluginConfig;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// What `skip_on_empty` skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipMethod {
    Row,
    Process,
}

/// `skip_on_empty`: stop the row or the property when the value is empty.
#[derive(Debug, Clone)]
pub struct SkipOnEmptyPlugin {
    method: SkipMethod,
    message: Option<String>,
}

impl SkipOnEmptyPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let method = match config.require_str("method")? {
            "row" => SkipMethod::Row,
            "process" => SkipMethod::Process,
            other => {
                return Err(MigrateError::Config(format!(
                    "skip_on_empty: method must be 'row' or 'process', got '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            method,
            message: config.str_option("message").map(str::to_string),
        })
    }
}

#[async_trait]
impl ProcessPlugin for SkipOnEmptyPlugin {
    fn plugin_id(&self) -> &str {
        "skip_on_empty"
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        if !value.is_empty() {
            return Ok(value);
        }
        match self.method {
            SkipMethod::Row => Err(ProcessSignal::SkipRow(self.message.clone().unwrap_or_default())),
            SkipMethod::Process => {
                if let Some(message) = &self.message {
                    debug!("{}: {}", ctx.destination_property, message);
                }
                Err(ProcessSignal::SkipProcess)
            }
        }
    }
}

/// `skip_row_if_not_set`: skip the row when an array lacks a key.
#[derive(Debug, Clone)]
pub struct SkipRowIfNotSetPlugin {
    index: String,
    message: Option<String>,
}

impl SkipRowIfNotSetPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let index = config
            .require_option("index")?
            .to_key()
            .ok_or_else(|| MigrateError::Config("skip_row_if_not_set: index must be scalar".into()))?;
        Ok(Self {
            index,
            message: config.str_option("message").map(str::to_string),
        })
    }
}

#[async_trait]
impl ProcessPlugin for SkipRowIfNotSetPlugin {
    fn plugin_id(&self) -> &str {
        "skip_row_if_not_set"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    async fn transform(&self, value: Value, _ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        match value.get_path(&[self.index.as_str()]) {
            Some(found) if !found.is_null() => Ok(found.clone()),
            _ => Err(ProcessSignal::SkipRow(self.message.clone().unwrap_or_else(|| {
                format!("index '{}' is not set", self.index)
            }))),
        }
    }
}
