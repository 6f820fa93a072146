//! Array process plugins: `concat`, `explode`, `extract` and `flatten`.

use async_trait::async_trait;

use super::{ProcessContext, ProcessPlugin, ProcessResult};
use crate::core::catalog::PluginConfig;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// `concat`: join the elements of a list.
#[derive(Debug, Clone)]
pub struct ConcatPlugin {
    delimiter: String,
}

impl ConcatPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        Ok(Self {
            delimiter: config.str_option("delimiter").unwrap_or("").to_string(),
        })
    }
}

#[async_trait]
impl ProcessPlugin for ConcatPlugin {
    fn plugin_id(&self) -> &str {
        "concat"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        if !value.is_array() {
            return Err(ctx.failed(format!("concat input must be an array, got '{}'", value)));
        }
        let parts = value
            .elements()
            .into_iter()
            .map(|v| v.to_key().ok_or_else(|| ctx.failed("concat cannot join nested arrays")))
            .collect::<ProcessResult<Vec<_>>>()?;
        Ok(parts.join(&self.delimiter).into())
    }
}

/// `explode`: split a string on a delimiter.
///
/// `limit` follows PHP `explode()`: a positive limit caps the number of
/// pieces (the last one holds the rest), a negative limit drops that many
/// pieces from the end.
#[derive(Debug, Clone)]
pub struct ExplodePlugin {
    delimiter: String,
    limit: Option<i64>,
}

impl ExplodePlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let delimiter = config.require_str("delimiter")?;
        if delimiter.is_empty() {
            return Err(MigrateError::Config("explode: delimiter is empty".into()));
        }
        Ok(Self {
            delimiter: delimiter.to_string(),
            limit: config.option("limit").and_then(Value::as_i64),
        })
    }

    fn split(&self, text: &str) -> Vec<Value> {
        let pieces: Vec<&str> = match self.limit {
            Some(limit) if limit > 0 => text.splitn(limit as usize, self.delimiter.as_str()).collect(),
            Some(0) => vec![text],
            Some(limit) => {
                let all: Vec<&str> = text.split(self.delimiter.as_str()).collect();
                let keep = all.len().saturating_sub(limit.unsigned_abs() as usize);
                all[..keep].to_vec()
            }
            None => text.split(self.delimiter.as_str()).collect(),
        };
        pieces.into_iter().map(Value::from).collect()
    }
}

#[async_trait]
impl ProcessPlugin for ExplodePlugin {
    fn plugin_id(&self) -> &str {
        "explode"
    }

    fn multiple(&self, _output: &Value) -> bool {
        true
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        if value.is_array() {
            return Err(ctx.failed("explode input must be a string"));
        }
        let text = value.to_key().unwrap_or_default();
        if text.is_empty() {
            return Ok(Value::List(Vec::new()));
        }
        Ok(Value::List(self.split(&text)))
    }
}

/// `extract`: read a nested element of an array by an index path.
#[derive(Debug, Clone)]
pub struct ExtractPlugin {
    index: Vec<String>,
    default: Option<Value>,
}

impl ExtractPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let index = match config.require_option("index")? {
            Value::List(items) => items
                .iter()
                .map(|item| {
                    item.to_key()
                        .ok_or_else(|| MigrateError::Config("extract: index entries must be scalar".into()))
                })
                .collect::<Result<Vec<_>>>()?,
            other => vec![other
                .to_key()
                .ok_or_else(|| MigrateError::Config("extract: index must be a list".into()))?],
        };
        Ok(Self {
            index,
            default: config.options.get("default").cloned(),
        })
    }
}

#[async_trait]
impl ProcessPlugin for ExtractPlugin {
    fn plugin_id(&self) -> &str {
        "extract"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        if !value.is_array() {
            return Err(ctx.failed("extract input should be an array"));
        }
        let path: Vec<&str> = self.index.iter().map(String::as_str).collect();
        match (value.get_path(&path), &self.default) {
            (Some(found), _) => Ok(found.clone()),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(ctx.failed(format!(
                "array index missing, extraction failed for '{}'",
                self.index.join("/")
            ))),
        }
    }
}

/// `flatten`: collapse nested arrays into one list.
#[derive(Debug, Clone, Default)]
pub struct FlattenPlugin;

impl FlattenPlugin {
    pub fn from_config(_config: &PluginConfig) -> Result<Self> {
        Ok(Self)
    }
}

fn flatten_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::List(items) => items.into_iter().for_each(|v| flatten_into(v, out)),
        Value::Map(entries) => entries.into_values().for_each(|v| flatten_into(v, out)),
        scalar => out.push(scalar),
    }
}

#[async_trait]
impl ProcessPlugin for FlattenPlugin {
    fn plugin_id(&self) -> &str {
        "flatten"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    fn multiple(&self, _output: &Value) -> bool {
        true
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        if !value.is_array() {
            return Err(ctx.failed(format!("flatten input must be an array, got '{}'", value)));
        }
        let mut out = Vec::new();
        flatten_into(value, &mut out);
        Ok(Value::List(out))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run, source};
    use super::super::ProcessSignal;
    use super::*;
    use crate::core::value::map;

    fn explode(limit: Option<i64>) -> ExplodePlugin {
        let mut config = PluginConfig::new("explode").with("delimiter", ",");
        if let Some(limit) = limit {
            config = config.with("limit", limit);
        }
        ExplodePlugin::from_config(&config).unwrap()
    }

    #[test]
    fn test_explode_limit_follows_php() {
        let strs = |v: Vec<Value>| v.into_iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(strs(explode(None).split("a,b,c")), vec!["a", "b", "c"]);
        assert_eq!(strs(explode(Some(2)).split("a,b,c")), vec!["a", "b,c"]);
        assert_eq!(strs(explode(Some(-1)).split("a,b,c")), vec!["a", "b"]);
        assert_eq!(strs(explode(Some(0)).split("a,b,c")), vec!["a,b,c"]);
        assert!(ExplodePlugin::from_config(&PluginConfig::new("explode")).is_err());
    }

    #[tokio::test]
    async fn test_concat_and_extract() {
        let yaml = "
path:
  plugin: concat
  source: [constants/prefix, nid]
  delimiter: /
format:
  plugin: extract
  source: settings
  index: [display, format]
missing:
  plugin: extract
  source: settings
  index: [nothing]
  default: plain
";
        let row = run(
            yaml,
            source(vec![
                ("constants", map([("prefix", "node")])),
                ("nid", Value::Int(4)),
                ("settings", map([("display", map([("format", "trimmed")]))])),
            ]),
        )
        .await
        .unwrap();
        assert_eq!(row.destination_property("path"), Some(&Value::from("node/4")));
        assert_eq!(row.destination_property("format"), Some(&Value::from("trimmed")));
        assert_eq!(row.destination_property("missing"), Some(&Value::from("plain")));
    }

    #[tokio::test]
    async fn test_extract_missing_index_fails_the_row() {
        let yaml = "
format:
  plugin: extract
  source: settings
  index: [display]
";
        let result = run(yaml, source(vec![("settings", map([("other", 1)]))])).await;
        assert!(matches!(result, Err(ProcessSignal::Failed(_))));
    }

    #[tokio::test]
    async fn test_flatten() {
        let yaml = "
flat:
  plugin: flatten
  source: nested
";
        let nested = Value::List(vec![
            Value::Int(1),
            Value::List(vec![Value::Int(2), Value::List(vec![Value::Int(3)])]),
        ]);
        let row = run(yaml, source(vec![("nested", nested)])).await.unwrap();
        assert_eq!(
            row.destination_property("flat"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
    }
}
