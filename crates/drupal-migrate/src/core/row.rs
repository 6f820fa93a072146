//! One unit of work flowing through a migration.
//!
//! A [`Row`] carries the source properties read from the legacy database and
//! the destination properties derived by the process pipeline. Source
//! properties are frozen once the source plugin has finished preparing the
//! row; the pipeline only ever writes destination properties.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::core::schema::IdSchema;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::id_map::{MapEntry, RowStatus};

/// Separator for nested property paths.
pub const PROPERTY_SEPARATOR: char = '/';

/// Prefix that makes [`Row::get`] read a destination property.
pub const DESTINATION_PREFIX: char = '@';

/// Source and destination properties for one source record.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    source: BTreeMap<String, Value>,
    destination: BTreeMap<String, Value>,
    source_id_fields: Vec<String>,
    frozen: bool,
    hash: Option<String>,
    id_map: Option<MapEntry>,
}

impl Row {
    /// Create a row, checking that every ID field is present.
    pub fn new(source: BTreeMap<String, Value>, ids: &IdSchema) -> Result<Self> {
        let mut row = Self::from_record(source);
        row.assign_ids(ids)?;
        Ok(row)
    }

    /// Wrap a raw record before its ID fields are known to be present.
    ///
    /// Fan-out sources derive some ID fields in `prepare_row`; the cursor
    /// assigns and checks the ID schema afterwards.
    pub fn from_record(source: BTreeMap<String, Value>) -> Self {
        Self {
            source,
            destination: BTreeMap::new(),
            source_id_fields: Vec::new(),
            frozen: false,
            hash: None,
            id_map: None,
        }
    }

    /// Key the row by an ID schema, failing when an ID field is missing.
    pub fn assign_ids(&mut self, ids: &IdSchema) -> Result<()> {
        for name in ids.names() {
            match self.source.get(&name) {
                Some(v) if !v.is_null() => {}
                _ => {
                    return Err(MigrateError::process(
                        name,
                        "source ID is missing from the row",
                    ))
                }
            }
        }
        self.source_id_fields = ids.names();
        Ok(())
    }

    /// Values of the source ID fields, in schema order.
    pub fn source_id_values(&self) -> Vec<Value> {
        self.source_id_fields
            .iter()
            .map(|name| self.source.get(name).cloned().unwrap_or_default())
            .collect()
    }

    /// Names of the source ID fields.
    pub fn source_id_fields(&self) -> &[String] {
        &self.source_id_fields
    }

    /// All source properties.
    pub fn source(&self) -> &BTreeMap<String, Value> {
        &self.source
    }

    /// Read a source property. Nested elements are addressed as `a/b/c`.
    pub fn source_property(&self, path: &str) -> Option<&Value> {
        lookup(&self.source, path)
    }

    /// Whether a source property is set and not NULL.
    pub fn has_source_property(&self, path: &str) -> bool {
        self.source_property(path).is_some_and(|v| !v.is_null())
    }

    /// Set a source property. Fails once the row is frozen.
    pub fn set_source_property(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        if self.frozen {
            return Err(MigrateError::process(
                name,
                "source properties are read-only after the row is prepared",
            ));
        }
        self.source.insert(name, value.into());
        Ok(())
    }

    /// Make the source properties read-only.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the source properties are read-only.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// All destination properties.
    pub fn destination(&self) -> &BTreeMap<String, Value> {
        &self.destination
    }

    /// Read a destination property. Nested elements are addressed as `a/b/c`.
    pub fn destination_property(&self, path: &str) -> Option<&Value> {
        lookup(&self.destination, path)
    }

    /// Whether a destination property has been set.
    pub fn has_destination_property(&self, path: &str) -> bool {
        self.destination_property(path).is_some()
    }

    /// Set a destination property, creating intermediate maps for nested paths.
    pub fn set_destination_property(&mut self, path: &str, value: impl Into<Value>) {
        let parts: Vec<&str> = path.split(PROPERTY_SEPARATOR).collect();
        set_nested(&mut self.destination, &parts, value.into());
    }

    /// Remove a destination property.
    pub fn remove_destination_property(&mut self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = path.split(PROPERTY_SEPARATOR).collect();
        let (last, parents) = parts.split_last()?;
        if parents.is_empty() {
            return self.destination.remove(*last);
        }
        let mut current = self.destination.get_mut(parents[0])?;
        for key in &parents[1..] {
            current = current.as_map_mut()?.get_mut(*key)?;
        }
        current.as_map_mut()?.remove(*last)
    }

    /// Read `@name` from the destination, anything else from the source.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match name.strip_prefix(DESTINATION_PREFIX) {
            Some(dest) => self.destination_property(dest),
            None => self.source_property(name),
        }
    }

    /// Recompute the row hash from the source properties.
    ///
    /// The hash covers every source property, so any change in the legacy
    /// record (or in what `prepare_row` derives from it) changes the hash.
    pub fn rehash(&mut self) -> &str {
        let json = serde_json::to_string(&self.source).unwrap_or_default();
        let digest = Sha256::digest(json.as_bytes());
        self.hash.insert(hex::encode(digest))
    }

    /// The row hash, if computed.
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Attach the ID map entry that existed before processing.
    pub fn set_id_map(&mut self, entry: Option<MapEntry>) {
        self.id_map = entry;
    }

    /// The ID map entry that existed before processing.
    pub fn id_map(&self) -> Option<&MapEntry> {
        self.id_map.as_ref()
    }

    /// Whether the row is marked for reprocessing.
    pub fn needs_update(&self) -> bool {
        self.id_map
            .as_ref()
            .is_some_and(|e| e.status == RowStatus::NeedsUpdate)
    }

    /// Whether the source differs from what was last imported.
    pub fn changed(&self) -> bool {
        match &self.id_map {
            Some(entry) => entry.hash.as_deref() != self.hash.as_deref(),
            None => true,
        }
    }

    /// Whether this row can be skipped as already imported and unchanged.
    pub fn is_unchanged_import(&self) -> bool {
        self.id_map
            .as_ref()
            .is_some_and(|e| e.status == RowStatus::Imported)
            && !self.changed()
    }
}

fn set_nested(target: &mut BTreeMap<String, Value>, parts: &[&str], value: Value) {
    match parts {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [first, rest @ ..] => {
            let entry = target
                .entry((*first).to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(entry, Value::Map(_)) {
                *entry = Value::Map(BTreeMap::new());
            }
            if let Value::Map(child) = entry {
                set_nested(child, rest, value);
            }
        }
    }
}

fn lookup<'a>(props: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(v) = props.get(path) {
        return Some(v);
    }
    let mut parts = path.split(PROPERTY_SEPARATOR);
    let first = props.get(parts.next()?)?;
    let rest: Vec<&str> = parts.collect();
    first.get_path(&rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::map;
    use crate::id_map::RollbackAction;

    fn row() -> Row {
        let source = BTreeMap::from([
            ("tid".to_string(), Value::Int(1)),
            ("name".to_string(), Value::from("Tags")),
            (
                "settings".to_string(),
                map([("format", Value::from("above"))]),
            ),
        ]);
        Row::new(source, &IdSchema::new().integer("tid")).unwrap()
    }

    #[test]
    fn test_new_requires_id_fields() {
        let source = BTreeMap::from([("name".to_string(), Value::from("x"))]);
        assert!(Row::new(source, &IdSchema::new().integer("tid")).is_err());
    }

    #[test]
    fn test_source_is_frozen_after_prepare() {
        let mut r = row();
        r.set_source_property("extra", 1).unwrap();
        r.freeze();
        assert!(r.set_source_property("extra", 2).is_err());
        assert_eq!(r.source_property("extra"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_nested_source_and_destination_paths() {
        let mut r = row();
        assert_eq!(r.source_property("settings/format"), Some(&Value::from("above")));

        r.set_destination_property("options/label", "hidden");
        r.set_destination_property("options/weight", 3);
        assert_eq!(r.get("@options/label"), Some(&Value::from("hidden")));
        assert_eq!(r.remove_destination_property("options/weight"), Some(Value::Int(3)));
        assert!(!r.has_destination_property("options/weight"));
        assert!(r.has_destination_property("options"));
    }

    #[test]
    fn test_hash_tracks_source_changes() {
        let mut a = row();
        let mut b = row();
        assert_eq!(a.rehash().to_string(), b.rehash().to_string());
        b.set_source_property("name", "Other").unwrap();
        assert_ne!(a.hash().map(str::to_string), Some(b.rehash().to_string()));
    }

    #[test]
    fn test_unchanged_import_detection() {
        let mut r = row();
        let hash = r.rehash().to_string();
        let mut entry = MapEntry {
            source_ids_hash: "x".into(),
            source_ids: vec![Value::Int(1)],
            destination_ids: Some(vec![Value::Int(10)]),
            status: RowStatus::Imported,
            rollback_action: RollbackAction::Delete,
            hash: Some(hash),
            last_imported: 0,
        };
        r.set_id_map(Some(entry.clone()));
        assert!(r.is_unchanged_import());

        entry.status = RowStatus::NeedsUpdate;
        r.set_id_map(Some(entry));
        assert!(r.needs_update());
        assert!(!r.is_unchanged_import());
    }
}
