//! ID schemas and field declarations for source and destination plugins.
//!
//! The ID schema is the contract between a plugin and the ID map: the map
//! table's `sourceid*` / `destid*` columns are created verbatim from it.

use serde::{Deserialize, Serialize};

use crate::core::value::Value;
use crate::error::{MigrateError, Result};

/// Storage type of one ID field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// Integer key (serial ids, vids, tids).
    Integer,
    /// String key (machine names, config names).
    String,
}

impl IdKind {
    /// SQLite column type for this kind.
    pub fn sql_type(self) -> &'static str {
        match self {
            IdKind::Integer => "INTEGER",
            IdKind::String => "TEXT",
        }
    }

    /// Coerce a value to this kind, so `"5"` and `5` map to the same key.
    pub fn coerce(self, value: &Value) -> Result<Value> {
        match self {
            IdKind::Integer => value.as_i64().map(Value::Int).ok_or_else(|| {
                MigrateError::Config(format!("ID value {} is not an integer", value))
            }),
            IdKind::String => value
                .to_key()
                .map(Value::String)
                .ok_or_else(|| MigrateError::Config("ID value cannot be an array".into())),
        }
    }
}

/// One ID field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdField {
    /// Property name on the row.
    pub name: String,
    /// Storage type.
    pub kind: IdKind,
}

/// Ordered ID field declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdSchema {
    fields: Vec<IdField>,
}

impl IdSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an integer field.
    pub fn integer(mut self, name: impl Into<String>) -> Self {
        self.fields.push(IdField {
            name: name.into(),
            kind: IdKind::Integer,
        });
        self
    }

    /// Add a string field.
    pub fn string(mut self, name: impl Into<String>) -> Self {
        self.fields.push(IdField {
            name: name.into(),
            kind: IdKind::String,
        });
        self
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> &[IdField] {
        &self.fields
    }

    /// Field names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Number of ID fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Coerce a tuple of values to this schema's kinds.
    pub fn coerce(&self, values: &[Value]) -> Result<Vec<Value>> {
        if values.len() != self.fields.len() {
            return Err(MigrateError::Config(format!(
                "expected {} ID values, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        self.fields
            .iter()
            .zip(values)
            .map(|(field, value)| field.kind.coerce(value))
            .collect()
    }
}

/// A declared field with its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    /// Machine name.
    pub name: String,
    /// Description shown to site builders.
    pub label: String,
}

/// Build a field list from `(name, label)` pairs.
pub fn field_list(pairs: &[(&str, &str)]) -> Vec<FieldInfo> {
    pairs
        .iter()
        .map(|(name, label)| FieldInfo {
            name: (*name).to_string(),
            label: (*label).to_string(),
        })
        .collect()
}
