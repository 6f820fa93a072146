//! Execute one migration: import its rows or roll them back.
//!
//! Rows are processed serially. Each row either reaches the destination and
//! is mapped IMPORTED, or leaves a FAILED / IGNORED map entry with a
//! message; a row-level problem never stops the run. Only source errors
//! (missing legacy tables, broken queries) and ID map failures are fatal.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::row::Row;
use crate::core::traits::{HighWater, Source};
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::id_map::{source_ids_hash, MessageLevel, RollbackAction, RowStatus};
use crate::migration::Migration;
use crate::process::ProcessSignal;
use crate::source::{CursorOptions, SourceCursor, DEFAULT_BATCH_SIZE};

/// Options for one import or rollback.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Stop after this many processed rows (unchanged rows do not count).
    pub limit: Option<u64>,

    /// Mark every mapped row NEEDS_UPDATE before importing.
    pub update: bool,

    /// Source records fetched per page.
    pub batch_size: u64,

    /// Highest high-water value already imported.
    pub high_water: Option<Value>,

    /// Checked between rows.
    pub cancel: CancellationToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            limit: None,
            update: false,
            batch_size: DEFAULT_BATCH_SIZE,
            high_water: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    /// Already imported (or ignored) with an unchanged source hash.
    Unchanged,
    Ignored,
    Failed,
}

/// Row counts for one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub ignored: u64,
    pub failed: u64,
}

impl ImportCounts {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created => self.created += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Unchanged => self.unchanged += 1,
            RowOutcome::Ignored => self.ignored += 1,
            RowOutcome::Failed => self.failed += 1,
        }
        if outcome != RowOutcome::Unchanged {
            self.processed += 1;
        }
    }

    /// Add another migration's counts.
    pub fn add(&mut self, other: &ImportCounts) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.ignored += other.ignored;
        self.failed += other.failed;
    }
}

/// Why an operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Every row was visited.
    Completed,
    /// The row limit was reached.
    Stopped,
    /// The cancellation token fired.
    Cancelled,
}

/// Result of importing one migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub completion: Completion,
    pub counts: ImportCounts,
    /// High-water value to persist for the next run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_water: Option<Value>,
}

/// Result of rolling back one migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Destination objects removed or unset.
    pub rolled_back: u64,
    /// Map entries dropped without touching the destination (preserved
    /// objects, ignored and failed rows).
    pub cleared: u64,
    /// Rows whose destination rollback failed; their map entries remain.
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub cancelled: bool,
}

/// Running totals of one import across its source passes.
struct Progress {
    counts: ImportCounts,
    highest: Option<Value>,
    visited: Option<BTreeSet<String>>,
}

/// Runs one migration.
pub struct MigrateExecutable<'a> {
    migration: &'a Migration,
    options: ExecuteOptions,
}

impl<'a> MigrateExecutable<'a> {
    pub fn new(migration: &'a Migration, options: ExecuteOptions) -> Self {
        Self { migration, options }
    }

    fn high_water_property(&self) -> Option<&str> {
        self.migration.definition().high_water_property.as_deref()
    }

    /// Import every row the source yields.
    ///
    /// Under a high-water mark only newer records are read, then a second
    /// pass over the whole source revisits rows the map holds as
    /// NEEDS_UPDATE or FAILED, since they may sit at or below the mark.
    pub async fn import(&self) -> Result<ImportReport> {
        let id = self.migration.id();
        let id_map = self.migration.id_map();
        info!("Importing {}", id);

        if self.options.update {
            id_map.prepare_update().await?;
            debug!("{}: marked all rows for update", id);
        }

        // Rows below the mark would never be visited, so updates read everything.
        let high_water = match (self.high_water_property(), &self.options.high_water) {
            (Some(property), Some(value)) if !self.options.update => Some(HighWater {
                property: property.to_string(),
                value: value.clone(),
            }),
            _ => None,
        };
        let pending: BTreeSet<String> = if high_water.is_some() {
            id_map
                .entries()
                .await?
                .into_iter()
                .filter(|entry| matches!(entry.status, RowStatus::NeedsUpdate | RowStatus::Failed))
                .map(|entry| entry.source_ids_hash)
                .collect()
        } else {
            BTreeSet::new()
        };

        let mut progress = Progress {
            counts: ImportCounts::default(),
            highest: self.options.high_water.clone(),
            // Only a second pass needs to know what the first one imported.
            visited: (!pending.is_empty()).then(BTreeSet::new),
        };

        let mut cursor = SourceCursor::new(
            self.migration.source(),
            CursorOptions {
                batch_size: self.options.batch_size,
                high_water,
            },
        );
        let mut completion = self.drain(&mut cursor, None, &mut progress).await?;

        if completion == Completion::Completed && !pending.is_empty() {
            debug!("{}: revisiting {} rows below the high-water mark", id, pending.len());
            let mut cursor = SourceCursor::new(
                self.migration.source(),
                CursorOptions {
                    batch_size: self.options.batch_size,
                    high_water: None,
                },
            );
            completion = self.drain(&mut cursor, Some(&pending), &mut progress).await?;
        }

        let counts = progress.counts;
        info!(
            "{} {:?}: {} created, {} updated, {} unchanged, {} ignored, {} failed",
            id,
            completion,
            counts.created,
            counts.updated,
            counts.unchanged,
            counts.ignored,
            counts.failed
        );
        Ok(ImportReport {
            completion,
            counts,
            high_water: progress.highest,
        })
    }

    /// Import rows from `cursor` until it is exhausted, the limit is hit or
    /// the run is cancelled. With `only`, rows whose source id hash is not in
    /// the set are passed over. Rows already visited in this run are never
    /// imported twice.
    async fn drain<S: Source + ?Sized>(
        &self,
        cursor: &mut SourceCursor<'_, S>,
        only: Option<&BTreeSet<String>>,
        progress: &mut Progress,
    ) -> Result<Completion> {
        loop {
            if self.options.cancel.is_cancelled() {
                return Ok(Completion::Cancelled);
            }
            if self
                .options
                .limit
                .is_some_and(|limit| progress.counts.processed >= limit)
            {
                return Ok(Completion::Stopped);
            }
            let Some(row) = cursor.next().await? else {
                return Ok(Completion::Completed);
            };

            if let Some(visited) = progress.visited.as_mut() {
                let key = source_ids_hash(&row.source_id_values());
                if only.is_some_and(|keys| !keys.contains(&key)) || !visited.insert(key) {
                    continue;
                }
            }

            let mark = self
                .high_water_property()
                .and_then(|p| row.source_property(p))
                .cloned();
            let outcome = self.import_row(row).await?;
            progress.counts.record(outcome);

            if let Some(mark) = mark.filter(|v| !v.is_null()) {
                if progress
                    .highest
                    .as_ref()
                    .map_or(true, |h| compare(&mark, h) == Ordering::Greater)
                {
                    progress.highest = Some(mark);
                }
            }
            let processed = progress.counts.processed;
            if processed > 0 && processed % self.options.batch_size.max(1) == 0 {
                debug!("{}: {} rows processed", self.migration.id(), processed);
            }
        }
    }

    /// Process one prepared row and record the result in the ID map.
    ///
    /// Fails only when the ID map itself cannot be written.
    pub async fn import_row(&self, mut row: Row) -> Result<RowOutcome> {
        let id_map = self.migration.id_map();
        let source_ids = row.source_id_values();
        row.set_id_map(id_map.get_row_by_source(&source_ids).await?);

        let settled = row.id_map().is_some_and(|entry| {
            matches!(entry.status, RowStatus::Imported | RowStatus::Ignored)
        }) && !row.changed();
        if settled {
            debug!("{}: {:?} unchanged", self.migration.id(), source_ids);
            return Ok(RowOutcome::Unchanged);
        }

        let old_ids = row
            .id_map()
            .and_then(|entry| entry.destination_ids.clone())
            .unwrap_or_default();
        let old_action = row
            .id_map()
            .map(|entry| entry.rollback_action)
            .unwrap_or_default();

        match self.migration.pipeline().process_row(&mut row).await {
            Ok(()) => {}
            Err(ProcessSignal::SkipRow(message)) => {
                id_map
                    .save_id_mapping(&row, None, RowStatus::Ignored, RollbackAction::Delete)
                    .await?;
                if !message.is_empty() {
                    id_map
                        .save_message(&source_ids, MessageLevel::Information, &message)
                        .await?;
                }
                debug!("{}: skipped {:?} {}", self.migration.id(), source_ids, message);
                return Ok(RowOutcome::Ignored);
            }
            Err(ProcessSignal::Failed(e)) => {
                return self.fail_row(&row, &old_ids, old_action, &e).await;
            }
            // Consumed per property by the pipeline.
            Err(ProcessSignal::SkipProcess) => {}
        }

        match self.migration.destination().import(&row, &old_ids).await {
            Ok(imported) => {
                id_map
                    .save_id_mapping(
                        &row,
                        Some(&imported.ids),
                        RowStatus::Imported,
                        imported.rollback_action,
                    )
                    .await?;
                debug!(
                    "{}: {:?} -> {:?}",
                    self.migration.id(),
                    source_ids,
                    imported.ids
                );
                Ok(if old_ids.is_empty() {
                    RowOutcome::Created
                } else {
                    RowOutcome::Updated
                })
            }
            Err(e) => self.fail_row(&row, &old_ids, old_action, &e).await,
        }
    }

    /// Map a row FAILED, keeping any destination ids from an earlier import
    /// so rollback can still reach the object.
    async fn fail_row(
        &self,
        row: &Row,
        old_ids: &[Value],
        action: RollbackAction,
        error: &MigrateError,
    ) -> Result<RowOutcome> {
        let id_map = self.migration.id_map();
        let source_ids = row.source_id_values();
        let kept = (!old_ids.is_empty()).then_some(old_ids);
        id_map
            .save_id_mapping(row, kept, RowStatus::Failed, action)
            .await?;
        id_map
            .save_message(&source_ids, MessageLevel::Error, &error.to_string())
            .await?;
        warn!("{}: row {:?} failed: {}", self.migration.id(), source_ids, error);
        Ok(RowOutcome::Failed)
    }

    /// Undo every mapped row.
    ///
    /// Each map entry is deleted as soon as its destination object has been
    /// rolled back, so a retry after a partial failure only revisits the
    /// rows that still need it.
    pub async fn rollback(&self) -> Result<RollbackReport> {
        let id = self.migration.id();
        let destination = self.migration.destination();
        if !destination.supports_rollback() {
            return Err(MigrateError::RollbackUnsupported(id.to_string()));
        }
        info!("Rolling back {}", id);

        let id_map = self.migration.id_map();
        let mut report = RollbackReport::default();

        for entry in id_map.entries().await? {
            if self.options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match (&entry.destination_ids, entry.rollback_action) {
                (Some(ids), RollbackAction::Delete) => match destination.rollback(ids).await {
                    Ok(()) => report.rolled_back += 1,
                    Err(e) => {
                        warn!("{}: rollback of {:?} failed: {}", id, ids, e);
                        report.failed += 1;
                        report.errors.push(format!("{:?}: {}", entry.source_ids, e));
                        continue;
                    }
                },
                _ => report.cleared += 1,
            }
            id_map.delete(&entry.source_ids, true).await?;
        }

        info!(
            "{} rolled back: {} removed, {} cleared, {} failed",
            id, report.rolled_back, report.cleared, report.failed
        );
        Ok(report)
    }
}

/// Order high-water values: numerically when both are numbers.
fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.to_key().cmp(&b.to_key()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::sqlite::SqlitePool;

    use crate::core::catalog::{PluginCatalog, Services};
    use crate::migration::{Migration, MigrationBuilder, MigrationDefinition};
    use crate::target::SqliteTarget;

    /// Build migrations from YAML definitions against one database that
    /// holds both the target store and the ID maps.
    pub async fn build(pool: &SqlitePool, definitions: &[String]) -> Vec<Migration> {
        let target = SqliteTarget::from_pool(pool.clone()).await.unwrap();
        let services = Services::new(None, target);
        let catalog = PluginCatalog::with_builtins();
        let definitions: Vec<MigrationDefinition> = definitions
            .iter()
            .map(|yaml| serde_yaml::from_str(yaml).unwrap())
            .collect();
        MigrationBuilder::new(&catalog, &services, pool.clone())
            .build(&definitions)
            .await
            .unwrap()
    }

    /// A vocabulary migration over inline rows (flow YAML list).
    pub fn vocabulary(rows: &str) -> String {
        format!(
            r#"
id: d6_taxonomy_vocabulary
source:
  plugin: embedded_data
  data_rows: {rows}
  ids:
    vid:
      type: integer
process:
  vid:
    - plugin: skip_on_empty
      method: row
      source: name
      message: vocabulary has no name
    - plugin: machine_name
  name: name
  weight: weight
destination:
  plugin: entity:taxonomy_vocabulary
"#
        )
    }
}
