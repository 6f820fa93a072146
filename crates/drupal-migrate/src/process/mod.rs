//! The process pipeline: ordered destination properties, each derived by a
//! chain of transform plugins.
//!
//! A step with a `source` option reads its input from the row through an
//! implicit [`get`](GetPlugin) step. When a step produced multiple values
//! (for example `explode`), the next step is applied to each element unless
//! it declares [`ProcessPlugin::handles_multiple`].

mod array;
mod basic;
mod lookup;
mod skip;
mod sub_process;

use std::fmt;

use async_trait::async_trait;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::core::catalog::{PluginCatalog, PluginConfig};
use crate::core::row::Row;
use crate::core::value::Value;
use crate::error::MigrateError;
use crate::id_map::IdMapRegistry;

pub use array::{ConcatPlugin, ExplodePlugin, ExtractPlugin, FlattenPlugin};
pub use basic::{CallbackPlugin, DefaultValuePlugin, GetPlugin, MachineNamePlugin, StaticMapPlugin};
pub use lookup::{MigrationLookupPlugin, OnMiss};
pub use skip::{SkipMethod, SkipOnEmptyPlugin, SkipRowIfNotSetPlugin};
pub use sub_process::SubProcessPlugin;

/// How a process step stops normal flow.
#[derive(Debug)]
pub enum ProcessSignal {
    /// Abort the whole row; it is recorded as ignored.
    SkipRow(String),
    /// Stop this property's pipeline and leave the property unset.
    SkipProcess,
    /// The row failed.
    Failed(MigrateError),
}

impl From<MigrateError> for ProcessSignal {
    fn from(err: MigrateError) -> Self {
        ProcessSignal::Failed(err)
    }
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessSignal::SkipRow(message) if message.is_empty() => f.write_str("row skipped"),
            ProcessSignal::SkipRow(message) => write!(f, "row skipped: {}", message),
            ProcessSignal::SkipProcess => f.write_str("process skipped"),
            ProcessSignal::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Result of a process step.
pub type ProcessResult<T> = std::result::Result<T, ProcessSignal>;

/// What a step can see while transforming a value.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    /// The row being processed, with destination properties computed so far.
    pub row: &'a Row,
    /// The destination property this pipeline produces.
    pub destination_property: &'a str,
}

impl ProcessContext<'_> {
    /// A failure attributed to the current destination property.
    pub fn failed(&self, message: impl Into<String>) -> ProcessSignal {
        ProcessSignal::Failed(MigrateError::process(self.destination_property, message))
    }
}

/// One transform step.
#[async_trait]
pub trait ProcessPlugin: Send + Sync {
    /// Plugin id (e.g. `static_map`).
    fn plugin_id(&self) -> &str;

    /// Whether the step takes a list input as a whole instead of per element.
    fn handles_multiple(&self) -> bool {
        false
    }

    /// Whether `output` should be treated as multiple values by the next step.
    fn multiple(&self, _output: &Value) -> bool {
        false
    }

    /// Transform one value.
    async fn transform(&self, value: Value, ctx: &ProcessContext<'_>) -> ProcessResult<Value>;
}

/// A destination property's process definition as written in YAML.
///
/// A bare string is shorthand for `get` from that source property.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProcessDefinition {
    Shorthand(String),
    Single(PluginConfig),
    Pipeline(Vec<PluginConfig>),
}

impl ProcessDefinition {
    fn into_steps(self) -> Vec<PluginConfig> {
        match self {
            ProcessDefinition::Shorthand(source) => {
                vec![PluginConfig::new("get").with("source", source)]
            }
            ProcessDefinition::Single(config) => vec![config],
            ProcessDefinition::Pipeline(configs) => configs,
        }
    }
}

/// Destination properties and their steps, in declaration order.
///
/// Order matters: later properties may read earlier ones as `@name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessMap {
    entries: Vec<(String, Vec<PluginConfig>)>,
}

impl ProcessMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property (builder style).
    pub fn with(mut self, property: impl Into<String>, steps: Vec<PluginConfig>) -> Self {
        self.push(property, steps);
        self
    }

    /// Append a property, replacing an earlier definition of the same name.
    pub fn push(&mut self, property: impl Into<String>, steps: Vec<PluginConfig>) {
        let property = property.into();
        self.entries.retain(|(name, _)| *name != property);
        self.entries.push((property, steps));
    }

    /// Iterate `(property, steps)` in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PluginConfig])> {
        self.entries.iter().map(|(name, steps)| (name.as_str(), steps.as_slice()))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no properties are defined.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for ProcessMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ProcessMapVisitor;

        impl<'de> Visitor<'de> for ProcessMapVisitor {
            type Value = ProcessMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of destination property to process definition")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ProcessMap, A::Error> {
                let mut map = ProcessMap::new();
                while let Some((property, definition)) =
                    access.next_entry::<String, ProcessDefinition>()?
                {
                    map.push(property, definition.into_steps());
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(ProcessMapVisitor)
    }
}

impl Serialize for ProcessMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (property, steps) in &self.entries {
            map.serialize_entry(property, steps)?;
        }
        map.end()
    }
}

/// Builds runnable pipelines from process maps.
pub struct PipelineBuilder<'a> {
    catalog: &'a PluginCatalog,
    id_maps: &'a IdMapRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(catalog: &'a PluginCatalog, id_maps: &'a IdMapRegistry) -> Self {
        Self { catalog, id_maps }
    }

    /// ID maps available to `migration_lookup`.
    pub fn id_maps(&self) -> &IdMapRegistry {
        self.id_maps
    }

    /// Build a pipeline for every property of a process map.
    pub fn build(&self, process: &ProcessMap) -> crate::error::Result<Pipeline> {
        let mut properties = Vec::with_capacity(process.len());
        for (property, configs) in process.iter() {
            properties.push((property.to_string(), self.build_steps(configs)?));
        }
        Ok(Pipeline { properties })
    }

    fn build_steps(&self, configs: &[PluginConfig]) -> crate::error::Result<Vec<Box<dyn ProcessPlugin>>> {
        let mut steps: Vec<Box<dyn ProcessPlugin>> = Vec::new();
        for config in configs {
            if config.option("source").is_some() {
                steps.push(Box::new(GetPlugin::from_config(config)?));
            }
            if config.plugin != "get" {
                steps.push(self.catalog.create_process(config, self)?);
            }
        }
        Ok(steps)
    }
}

/// A runnable process pipeline.
pub struct Pipeline {
    properties: Vec<(String, Vec<Box<dyn ProcessPlugin>>)>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("properties", &self.destination_properties())
            .finish()
    }
}

impl Pipeline {
    /// Destination properties in processing order.
    pub fn destination_properties(&self) -> Vec<&str> {
        self.properties.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run every property pipeline, writing results into the row's
    /// destination properties.
    pub async fn process_row(&self, row: &mut Row) -> ProcessResult<()> {
        for (property, steps) in &self.properties {
            if let Some(value) = run_steps(steps, row, property).await? {
                row.set_destination_property(property, value);
            }
        }
        Ok(())
    }
}

/// Run one property's steps. `None` means the property was skipped.
async fn run_steps(
    steps: &[Box<dyn ProcessPlugin>],
    row: &Row,
    property: &str,
) -> ProcessResult<Option<Value>> {
    let ctx = ProcessContext {
        row,
        destination_property: property,
    };
    let mut value = Value::Null;
    let mut multiple = false;

    for step in steps {
        let result = if multiple && !step.handles_multiple() {
            match value {
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(step.transform(item, &ctx).await?);
                    }
                    Ok(Value::List(out))
                }
                other => step.transform(other, &ctx).await,
            }
        } else {
            let result = step.transform(value, &ctx).await;
            if let Ok(output) = &result {
                multiple = step.multiple(output);
            }
            result
        };

        value = match result {
            Ok(v) => v,
            Err(ProcessSignal::SkipProcess) => {
                debug!("Skipped process for {}", property);
                return Ok(None);
            }
            Err(signal) => return Err(signal),
        };
    }
    Ok(Some(value))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::schema::IdSchema;
    use crate::core::value::map;

    /// A row keyed by `id` with the given source map.
    pub fn row(source: Value) -> Row {
        let Value::Map(source) = source else {
            panic!("row source must be a map");
        };
        Row::new(source, &IdSchema::new().integer("id")).unwrap()
    }

    /// Parse a process map from YAML and build it with the builtin catalog.
    pub fn pipeline(yaml: &str, id_maps: &IdMapRegistry) -> Pipeline {
        let process: ProcessMap = serde_yaml::from_str(yaml).unwrap();
        let catalog = PluginCatalog::with_builtins();
        PipelineBuilder::new(&catalog, id_maps).build(&process).unwrap()
    }

    /// Run a pipeline over a fresh row, returning the processed row.
    pub async fn run(yaml: &str, source: Value) -> ProcessResult<Row> {
        let registry = IdMapRegistry::new();
        let pipeline = pipeline(yaml, &registry);
        let mut row = row(source);
        pipeline.process_row(&mut row).await?;
        Ok(row)
    }

    pub fn source(pairs: Vec<(&str, Value)>) -> Value {
        let mut pairs = pairs;
        if !pairs.iter().any(|(k, _)| *k == "id") {
            pairs.push(("id", Value::Int(1)));
        }
        map(pairs)
    }
}
