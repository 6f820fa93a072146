//! Scalar process plugins: `get`, `default_value`, `static_map`, `callback`
//! and `machine_name`.

use async_trait::async_trait;

use super::{ProcessContext, ProcessPlugin, ProcessResult, ProcessSignal};
use crate::core::catalog::PluginConfig;
use crate::core::php;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, PartialEq)]
enum GetSource {
    Single(String),
    Many(Vec<String>),
}

/// `get`: read one source property, or a tuple of properties.
///
/// Names starting with `@` read destination properties computed earlier in
/// the pipeline.
#[derive(Debug, Clone)]
pub struct GetPlugin {
    source: GetSource,
}

impl GetPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let source = match config.require_option("source")? {
            Value::List(items) => GetSource::Many(
                items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            MigrateError::Config("get: source entries must be strings".into())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => GetSource::Single(other.to_key().ok_or_else(|| {
                MigrateError::Config("get: source must be a string or a list".into())
            })?),
        };
        Ok(Self { source })
    }
}

#[async_trait]
impl ProcessPlugin for GetPlugin {
    fn plugin_id(&self) -> &str {
        "get"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    fn multiple(&self, output: &Value) -> bool {
        matches!(self.source, GetSource::Single(_)) && matches!(output, Value::List(_))
    }

    async fn transform(&self, _value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        let read = |name: &str| ctx.row.get(name).cloned().unwrap_or_default();
        Ok(match &self.source {
            GetSource::Single(name) => read(name),
            GetSource::Many(names) => Value::List(names.iter().map(|n| read(n)).collect()),
        })
    }
}

/// `default_value`: replace an empty value (or only null, with `strict`).
#[derive(Debug, Clone)]
pub struct DefaultValuePlugin {
    default: Value,
    strict: bool,
}

impl DefaultValuePlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        if !config.options.contains_key("default_value") {
            return Err(MigrateError::Config(
                "default_value: the 'default_value' option is required".into(),
            ));
        }
        Ok(Self {
            default: config.options["default_value"].clone(),
            strict: config.bool_option("strict"),
        })
    }
}

#[async_trait]
impl ProcessPlugin for DefaultValuePlugin {
    fn plugin_id(&self) -> &str {
        "default_value"
    }

    fn handles_multiple(&self) -> bool {
        true
    }

    async fn transform(&self, value: Value, _ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        let use_default = if self.strict {
            value.is_null()
        } else {
            value.is_empty()
        };
        Ok(if use_default {
            self.default.clone()
        } else {
            value
        })
    }
}

/// `static_map`: translate a value through a fixed map.
///
/// A list input is a path into a nested map.
#[derive(Debug, Clone)]
pub struct StaticMapPlugin {
    map: Value,
    bypass: bool,
    default: Option<Value>,
}

impl StaticMapPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let map = config.require_option("map")?;
        if !matches!(map, Value::Map(_)) {
            return Err(MigrateError::Config("static_map: map must be a map".into()));
        }
        Ok(Self {
            map: map.clone(),
            bypass: config.bool_option("bypass"),
            default: config.options.get("default_value").cloned(),
        })
    }
}

#[async_trait]
impl ProcessPlugin for StaticMapPlugin {
    fn plugin_id(&self) -> &str {
        "static_map"
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        let keys: Option<Vec<String>> = match &value {
            Value::List(items) => items.iter().map(Value::to_key).collect(),
            other => other.to_key().map(|k| vec![k]),
        };
        let keys = keys.ok_or_else(|| ctx.failed("static_map input must be scalar"))?;
        let path: Vec<&str> = keys.iter().map(String::as_str).collect();

        if let Some(mapped) = self.map.get_path(&path) {
            return Ok(mapped.clone());
        }
        if let Some(default) = &self.default {
            return Ok(default.clone());
        }
        if self.bypass {
            return Ok(value);
        }
        Err(ProcessSignal::SkipRow(format!(
            "no static mapping found for '{}' and no default value provided for destination '{}'",
            value, ctx.destination_property
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callable {
    StrToLower,
    StrToUpper,
    UcFirst,
    Trim,
    IntVal,
    StrVal,
    BoolVal,
    Unserialize,
    ArrayFilter,
    ArrayValues,
    ArrayKeys,
    Count,
}

impl Callable {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "strtolower" | "mb_strtolower" => Callable::StrToLower,
            "strtoupper" | "mb_strtoupper" => Callable::StrToUpper,
            "ucfirst" => Callable::UcFirst,
            "trim" => Callable::Trim,
            "intval" => Callable::IntVal,
            "strval" => Callable::StrVal,
            "boolval" => Callable::BoolVal,
            "unserialize" => Callable::Unserialize,
            "array_filter" => Callable::ArrayFilter,
            "array_values" => Callable::ArrayValues,
            "array_keys" => Callable::ArrayKeys,
            "count" => Callable::Count,
            _ => return None,
        })
    }

    fn takes_array(self) -> bool {
        matches!(
            self,
            Callable::ArrayFilter | Callable::ArrayValues | Callable::ArrayKeys | Callable::Count
        )
    }
}

/// `callback`: apply one of a fixed set of named functions.
#[derive(Debug, Clone)]
pub struct CallbackPlugin {
    name: String,
    callable: Callable,
}

impl CallbackPlugin {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        let name = config.require_str("callable")?;
        let callable = Callable::parse(name).ok_or_else(|| {
            MigrateError::Config(format!("callback: unsupported callable '{}'", name))
        })?;
        Ok(Self {
            name: name.to_string(),
            callable,
        })
    }

    fn text(&self, value: &Value, ctx: &ProcessContext<'_>) -> ProcessResult<String> {
        value
            .to_key()
            .ok_or_else(|| ctx.failed(format!("{} expects a scalar value", self.name)))
    }
}

#[async_trait]
impl ProcessPlugin for CallbackPlugin {
    fn plugin_id(&self) -> &str {
        "callback"
    }

    fn handles_multiple(&self) -> bool {
        self.callable.takes_array()
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        Ok(match self.callable {
            Callable::StrToLower => self.text(&value, ctx)?.to_lowercase().into(),
            Callable::StrToUpper => self.text(&value, ctx)?.to_uppercase().into(),
            Callable::UcFirst => {
                let text = self.text(&value, ctx)?;
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()).into(),
                    None => Value::from(""),
                }
            }
            Callable::Trim => self.text(&value, ctx)?.trim().into(),
            Callable::IntVal => Value::Int(value.as_i64().unwrap_or(0)),
            Callable::StrVal => self.text(&value, ctx)?.into(),
            Callable::BoolVal => Value::Bool(value.as_bool()),
            Callable::Unserialize => match value {
                Value::String(blob) => php::unserialize(&blob)?,
                other => other,
            },
            Callable::ArrayFilter => match value {
                Value::List(items) => Value::List(items.into_iter().filter(|v| !v.is_empty()).collect()),
                Value::Map(entries) => {
                    Value::Map(entries.into_iter().filter(|(_, v)| !v.is_empty()).collect())
                }
                other => other,
            },
            Callable::ArrayValues => {
                Value::List(value.elements().into_iter().cloned().collect())
            }
            Callable::ArrayKeys => match value {
                Value::List(items) => Value::List((0..items.len() as i64).map(Value::Int).collect()),
                Value::Map(entries) => Value::List(entries.into_keys().map(Value::String).collect()),
                _ => Value::List(Vec::new()),
            },
            Callable::Count => Value::Int(value.elements().len() as i64),
        })
    }
}

/// `machine_name`: lowercase and replace runs of anything but `[a-z0-9_]`
/// with a single underscore.
#[derive(Debug, Clone, Default)]
pub struct MachineNamePlugin;

impl MachineNamePlugin {
    pub fn from_config(_config: &PluginConfig) -> Result<Self> {
        Ok(Self)
    }
}

/// Machine-name form of a label.
pub fn machine_name(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl ProcessPlugin for MachineNamePlugin {
    fn plugin_id(&self) -> &str {
        "machine_name"
    }

    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value> {
        let text = value
            .to_key()
            .ok_or_else(|| ctx.failed("machine_name expects a scalar value"))?;
        Ok(machine_name(&text).into())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run, source};
    use super::*;
    use crate::core::value::map;

    #[test]
    fn test_machine_name() {
        assert_eq!(machine_name("Big Release!"), "big_release_");
        assert_eq!(machine_name("foo--bar__baz"), "foo_bar_baz");
        assert_eq!(machine_name("Ünïcode"), "_n_code");
    }

    #[tokio::test]
    async fn test_get_reads_tuples_and_nested_paths() {
        let yaml = "
pair:
  plugin: get
  source: [vid, name]
nested: settings/rows
";
        let row = run(
            yaml,
            source(vec![
                ("vid", Value::Int(5)),
                ("name", "Tags".into()),
                ("settings", map([("rows", Value::Int(3))])),
            ]),
        )
        .await
        .unwrap();
        assert_eq!(
            row.destination_property("pair"),
            Some(&Value::List(vec![Value::Int(5), "Tags".into()]))
        );
        assert_eq!(row.destination_property("nested"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_default_value() {
        let yaml = "
loose:
  plugin: default_value
  source: zero
  default_value: fallback
strict:
  plugin: default_value
  source: zero
  default_value: fallback
  strict: true
missing:
  plugin: default_value
  source: nothing
  default_value: 7
";
        let row = run(yaml, source(vec![("zero", "0".into())])).await.unwrap();
        assert_eq!(row.destination_property("loose"), Some(&Value::from("fallback")));
        assert_eq!(row.destination_property("strict"), Some(&Value::from("0")));
        assert_eq!(row.destination_property("missing"), Some(&Value::Int(7)));
    }

    #[tokio::test]
    async fn test_static_map() {
        let yaml = "
status:
  plugin: static_map
  source: status
  map:
    '0': blocked
    '1': active
";
        let row = run(yaml, source(vec![("status", Value::Int(1))])).await.unwrap();
        assert_eq!(row.destination_property("status"), Some(&Value::from("active")));

        let result = run(yaml, source(vec![("status", Value::Int(9))])).await;
        assert!(matches!(result, Err(ProcessSignal::SkipRow(m)) if m.contains("no static mapping found for '9'")));
    }

    #[tokio::test]
    async fn test_static_map_nested_path_with_default() {
        let yaml = "
plugin_id:
  plugin: static_map
  source: [module, delta]
  map:
    filter:
      '0': filter_html
      '2': filter_url
  default_value: filter_null
";
        let row = run(
            yaml,
            source(vec![("module", "filter".into()), ("delta", Value::Int(2))]),
        )
        .await
        .unwrap();
        assert_eq!(row.destination_property("plugin_id"), Some(&Value::from("filter_url")));

        let row = run(
            yaml,
            source(vec![("module", "markdown".into()), ("delta", Value::Int(0))]),
        )
        .await
        .unwrap();
        assert_eq!(row.destination_property("plugin_id"), Some(&Value::from("filter_null")));
    }

    #[tokio::test]
    async fn test_callbacks() {
        let yaml = "
upper:
  plugin: callback
  callable: ucfirst
  source: name
count:
  plugin: callback
  callable: count
  source: roles
";
        let row = run(
            yaml,
            source(vec![
                ("name", "story".into()),
                ("roles", Value::List(vec![Value::Int(1), Value::Int(2)])),
            ]),
        )
        .await
        .unwrap();
        assert_eq!(row.destination_property("upper"), Some(&Value::from("Story")));
        assert_eq!(row.destination_property("count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_unknown_callable_is_a_config_error() {
        let config = PluginConfig::new("callback").with("callable", "exec");
        assert!(CallbackPlugin::from_config(&config).is_err());
    }
}
