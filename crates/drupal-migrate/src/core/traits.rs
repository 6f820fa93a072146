//! Capability traits composed by the migration executor.
//!
//! - [`Source`]: produces rows from the legacy database (or configuration)
//! - [`Destination`]: writes processed rows to the target store and undoes them
//! - [`IdMap`]: persists the source-to-destination correlation
//! - [`BundleInfo`]: answers "which bundles does this entity type have?"
//!
//! Plugins receive their collaborators (database handles, target storage,
//! bundle info) at construction; nothing is resolved from global state.

use async_trait::async_trait;

use crate::db::Record;
use crate::error::{MigrateError, Result};
use crate::id_map::{IdMapCounts, Lookup, MapEntry, Message, MessageLevel, RollbackAction, RowStatus};
use crate::source::{CursorOptions, SelectQuery, SourceCursor};

use super::row::Row;
use super::schema::{FieldInfo, IdSchema};
use super::value::Value;

/// A page of raw source records to fetch.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Records to skip.
    pub offset: u64,
    /// Maximum records to return.
    pub limit: u64,
    /// Only return records whose property is greater than this mark.
    pub high_water: Option<HighWater>,
}

/// A high-water condition: `property > value`.
#[derive(Debug, Clone, PartialEq)]
pub struct HighWater {
    pub property: String,
    pub value: Value,
}

/// Produce rows for one logical kind of legacy record.
///
/// # Laziness
///
/// Sources never load the whole record set. [`SourceCursor`] pages through
/// [`Source::fetch`], so only one page (plus any fan-out rows) is held in
/// memory at a time.
#[async_trait]
pub trait Source: Send + Sync {
    /// Plugin id (e.g. `d6_node_type`).
    fn plugin_id(&self) -> &str;

    /// Available source fields and their descriptions.
    fn fields(&self) -> Vec<FieldInfo>;

    /// The ID fields that key the ID map.
    fn ids(&self) -> IdSchema;

    /// The legacy query, for SQL-backed sources.
    fn query(&self) -> Option<SelectQuery> {
        None
    }

    /// Tables that must exist before the source can be iterated.
    fn required_tables(&self) -> Vec<String> {
        Vec::new()
    }

    /// Fail fast when the legacy schema is missing something this source needs.
    async fn check_requirements(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch one page of raw records, ordered by the ID fields.
    async fn fetch(&self, request: &PageRequest) -> Result<Vec<Record>>;

    /// Denormalize one raw row.
    ///
    /// Returns zero rows to skip the record, one row normally, or several
    /// rows when one record fans out into multiple logical rows.
    async fn prepare_row(&self, row: Row) -> Result<Vec<Row>> {
        Ok(vec![row])
    }

    /// Number of rows iteration yields, fan-out included.
    ///
    /// The default iterates, which is always consistent with iteration.
    async fn count(&self) -> Result<u64> {
        let mut cursor = SourceCursor::new(self, CursorOptions::default());
        let mut total = 0;
        while cursor.next().await?.is_some() {
            total += 1;
        }
        Ok(total)
    }
}

/// How a destination undoes an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackKind {
    /// Delete the object identified by the destination ids.
    Delete,
    /// Unset the part of a shared object this migration wrote.
    Unset,
    /// Rollback is structurally impossible.
    Unsupported,
}

/// Outcome of a successful destination write.
#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    /// Destination id tuple, in [`Destination::ids`] order.
    pub ids: Vec<Value>,
    /// Whether rollback may remove the object.
    pub rollback_action: RollbackAction,
}

impl Imported {
    /// An object created by this import.
    pub fn created(ids: Vec<Value>) -> Self {
        Self {
            ids,
            rollback_action: RollbackAction::Delete,
        }
    }

    /// An object that existed before this import.
    pub fn preserved(ids: Vec<Value>) -> Self {
        Self {
            ids,
            rollback_action: RollbackAction::Preserve,
        }
    }
}

/// Persist processed rows to the target store.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Plugin id (e.g. `entity:taxonomy_term`).
    fn plugin_id(&self) -> &str;

    /// Writable destination properties and their descriptions.
    fn fields(&self) -> Vec<FieldInfo>;

    /// Destination key schema, used verbatim for the map's `destid*` columns.
    fn ids(&self) -> IdSchema;

    /// Create or update the object for a processed row.
    ///
    /// `old_destination_ids` is empty on first import and holds the
    /// previously recorded ids on re-import.
    async fn import(&self, row: &Row, old_destination_ids: &[Value]) -> Result<Imported>;

    /// Undo the import identified by `destination_ids`.
    ///
    /// Must be idempotent: rolling back an object that no longer exists
    /// succeeds without doing anything.
    async fn rollback(&self, destination_ids: &[Value]) -> Result<()>;

    /// How this destination undoes an import.
    fn rollback_kind(&self) -> RollbackKind {
        RollbackKind::Delete
    }

    /// Whether rollback is possible at all.
    fn supports_rollback(&self) -> bool {
        self.rollback_kind() != RollbackKind::Unsupported
    }
}

/// Durable source-to-destination correlation for one migration.
#[async_trait]
pub trait IdMap: Send + Sync {
    /// Migration this map belongs to.
    fn migration_id(&self) -> &str;

    /// Source key schema.
    fn source_id_schema(&self) -> &IdSchema;

    /// Destination key schema.
    fn destination_id_schema(&self) -> &IdSchema;

    /// Create the map and message storage if missing.
    async fn ensure_tables(&self) -> Result<()>;

    /// Insert or replace the entry for a row.
    async fn save_id_mapping(
        &self,
        row: &Row,
        destination_ids: Option<&[Value]>,
        status: RowStatus,
        rollback_action: RollbackAction,
    ) -> Result<()>;

    /// Resolve a source id tuple to destination ids.
    async fn lookup_destination_ids(&self, source_ids: &[Value]) -> Result<Lookup>;

    /// Resolve a destination id tuple back to its source ids.
    async fn lookup_source_ids(&self, destination_ids: &[Value]) -> Result<Option<Vec<Value>>>;

    /// The full entry for a source id tuple.
    async fn get_row_by_source(&self, source_ids: &[Value]) -> Result<Option<MapEntry>>;

    /// Record a message against a source row.
    async fn save_message(
        &self,
        source_ids: &[Value],
        level: MessageLevel,
        message: &str,
    ) -> Result<()>;

    /// Messages for one source row, or all messages.
    async fn messages(&self, source_ids: Option<&[Value]>) -> Result<Vec<Message>>;

    /// Delete every message.
    async fn clear_messages(&self) -> Result<()>;

    /// Mark every entry NEEDS_UPDATE.
    async fn prepare_update(&self) -> Result<()>;

    /// Mark one entry NEEDS_UPDATE.
    async fn set_update(&self, source_ids: &[Value]) -> Result<()>;

    /// Remove the entry for a source id tuple.
    async fn delete(&self, source_ids: &[Value], messages_too: bool) -> Result<()>;

    /// All entries, ordered by source ids.
    async fn entries(&self) -> Result<Vec<MapEntry>>;

    /// Entry counts by status.
    async fn counts(&self) -> Result<IdMapCounts>;

    /// Drop the map and message storage.
    async fn destroy(&self) -> Result<()>;
}

/// Bundle metadata of the target system, injected into sources that fan out
/// per bundle.
#[async_trait]
pub trait BundleInfo: Send + Sync {
    /// Bundle names for an entity type, sorted.
    async fn bundles(&self, entity_type: &str) -> Result<Vec<String>>;
}

/// Fixed bundle info, for configuration-driven runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticBundleInfo {
    bundles: std::collections::BTreeMap<String, Vec<String>>,
}

impl StaticBundleInfo {
    /// Create empty bundle info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the bundles of an entity type.
    pub fn with(mut self, entity_type: &str, bundles: &[&str]) -> Self {
        self.bundles.insert(
            entity_type.to_string(),
            bundles.iter().map(|b| b.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl BundleInfo for StaticBundleInfo {
    async fn bundles(&self, entity_type: &str) -> Result<Vec<String>> {
        let mut bundles = self.bundles.get(entity_type).cloned().unwrap_or_default();
        bundles.sort();
        Ok(bundles)
    }
}

/// Reject a destination-id tuple of the wrong arity.
pub fn check_destination_ids(plugin: &str, schema: &IdSchema, ids: &[Value]) -> Result<()> {
    if ids.len() != schema.len() {
        return Err(MigrateError::destination(
            plugin,
            format!("expected {} destination ids, got {}", schema.len(), ids.len()),
        ));
    }
    Ok(())
}
