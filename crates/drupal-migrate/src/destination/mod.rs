//! Destination plugins: write processed rows to the target store and undo
//! those writes on rollback.
//!
//! Rollback semantics are declared per destination through
//! [`RollbackKind`](crate::core::traits::RollbackKind): entity-like
//! destinations delete, destinations that merge into a shared object unset
//! their part of it, and `config` cannot be rolled back at all.

mod authmap;
mod config;
mod display;
mod entity;

use crate::core::row::Row;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};

pub use authmap::AuthmapDestination;
pub use config::ConfigDestination;
pub use display::{ComponentDisplayDestination, DisplayKind, FieldGroupDestination};
pub use entity::EntityDestination;

/// A non-empty scalar destination property, as a string.
pub(crate) fn required_string(row: &Row, plugin: &str, property: &str) -> Result<String> {
    row.destination_property(property)
        .filter(|v| !v.is_null())
        .and_then(Value::to_key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            MigrateError::destination(plugin, format!("required property '{}' is missing", property))
        })
}

/// The id value at `index`, as a string.
pub(crate) fn id_string(ids: &[Value], index: usize) -> String {
    ids.get(index).and_then(Value::to_key).unwrap_or_default()
}
