//! Migration orchestrator - runs selected migrations in dependency order.

pub mod graph;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::catalog::{PluginCatalog, Services};
use crate::core::traits::{BundleInfo, StaticBundleInfo};
use crate::error::{MigrateError, Result};
use crate::executable::{
    Completion, ExecuteOptions, ImportCounts, MigrateExecutable, RollbackReport,
};
use crate::id_map::Message;
use crate::migration::{Migration, MigrationBuilder, MigrationDefinition};
use crate::source::LegacyDb;
use crate::state::{
    FileStateBackend, MemoryStateBackend, MigrationStatus, RunState, StateBackend,
};
use crate::target::SqliteTarget;

use graph::{dependency_order, with_required_dependencies};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    catalog: PluginCatalog,
    services: Services,
    map_pool: SqlitePool,
    state: Arc<dyn StateBackend>,
}

/// Which migrations an operation applies to.
///
/// No ids and no tag selects every configured migration.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub ids: Vec<String>,
    pub tag: Option<String>,
}

impl Selection {
    /// Every configured migration.
    pub fn all() -> Self {
        Self::default()
    }

    /// The named migrations.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            tag: None,
        }
    }

    /// Restrict to migrations carrying a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Selected definitions in execution order, optionally with their
    /// required dependencies.
    pub fn resolve<'a>(
        &self,
        config: &'a Config,
        with_dependencies: bool,
    ) -> Result<Vec<&'a MigrationDefinition>> {
        let all = &config.migrations;
        let mut picked: Vec<&MigrationDefinition> = if self.ids.is_empty() {
            all.iter().collect()
        } else {
            self.ids
                .iter()
                .map(|id| {
                    config
                        .migration(id)
                        .ok_or_else(|| MigrateError::Config(format!("Unknown migration: {}", id)))
                })
                .collect::<Result<_>>()?
        };
        if let Some(tag) = &self.tag {
            picked.retain(|def| def.migration_tags.iter().any(|t| t == tag));
        }
        if with_dependencies {
            picked = with_required_dependencies(&picked, all)?;
        }
        dependency_order(&picked)
    }
}

/// Options for an import or rollback run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop each migration after this many processed rows.
    pub limit: Option<u64>,

    /// Reprocess rows that were already imported.
    pub update: bool,

    /// Also run the required dependencies of the selected migrations.
    pub execute_dependencies: bool,

    /// Checked between rows and between migrations.
    pub cancel: CancellationToken,
}

/// Outcome of one migration within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub id: String,

    /// completed, completed_with_errors, stopped, skipped, failed or cancelled.
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Row counts of an import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<ImportCounts>,

    /// Row counts of a rollback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,
}

impl MigrationSummary {
    fn new(id: &str, status: &str) -> Self {
        Self {
            id: id.to_string(),
            status: status.to_string(),
            message: None,
            counts: None,
            rollback: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of an import or rollback run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// import or rollback.
    pub operation: String,

    /// completed, failed or cancelled.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// One entry per migration visited, in execution order.
    pub migrations: Vec<MigrationSummary>,

    /// Import counts summed over all migrations.
    pub totals: ImportCounts,
}

impl MigrationResult {
    fn finish(
        run_id: String,
        operation: &str,
        started_at: DateTime<Utc>,
        migrations: Vec<MigrationSummary>,
        cancelled: bool,
    ) -> Self {
        let completed_at = Utc::now();
        let status = if cancelled {
            "cancelled"
        } else if migrations
            .iter()
            .any(|m| m.status == "failed" || m.status == "skipped")
        {
            "failed"
        } else {
            "completed"
        };
        let mut totals = ImportCounts::default();
        for counts in migrations.iter().filter_map(|m| m.counts.as_ref()) {
            totals.add(counts);
        }
        Self {
            run_id,
            operation: operation.to_string(),
            status: status.to_string(),
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            started_at,
            completed_at,
            migrations,
            totals,
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Progress of one migration, as shown by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatusReport {
    pub id: String,
    pub label: String,
    pub status: MigrationStatus,

    /// Rows the source yields; absent when the source cannot be counted.
    pub total: Option<u64>,
    pub imported: u64,
    pub unprocessed: Option<u64>,
    pub needs_update: u64,
    pub failed: u64,
    pub ignored: u64,
    pub messages: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_imported: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Orchestrator {
    /// Connect to the target (and legacy, if configured) databases.
    ///
    /// ID maps live in the target database.
    pub async fn new(config: Config) -> Result<Self> {
        let target =
            SqliteTarget::connect(&config.target.url, config.target.max_connections).await?;
        let map_pool = target.pool().clone();

        let legacy = match &config.legacy {
            Some(db) => Some(LegacyDb::connect(&db.url, db.max_connections).await?),
            None => None,
        };

        let mut services = Services::new(legacy, target);
        if !config.bundles.is_empty() {
            services = services.with_bundle_info(Arc::new(static_bundle_info(&config.bundles)));
        }

        Ok(Self {
            config,
            catalog: PluginCatalog::with_builtins(),
            services,
            map_pool,
            state: Arc::new(MemoryStateBackend::new()),
        })
    }

    /// Keep run state in a signed JSON file.
    ///
    /// With `force`, state written for a different configuration is adopted
    /// instead of rejected.
    pub fn with_state_file(self, path: PathBuf, force: bool) -> Self {
        self.with_state_backend(Arc::new(FileStateBackend::new(path).with_force(force)))
    }

    /// Use a custom state backend.
    pub fn with_state_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        debug!("Using {} state backend", backend.backend_type());
        self.state = backend;
        self
    }

    /// Use a custom plugin catalog.
    pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the bundle info provider.
    pub fn with_bundle_info(mut self, bundle_info: Arc<dyn BundleInfo>) -> Self {
        self.services = self.services.with_bundle_info(bundle_info);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Selected definitions in execution order.
    pub fn definitions(&self, selection: &Selection) -> Result<Vec<&MigrationDefinition>> {
        selection.resolve(&self.config, false)
    }

    /// Instantiate every configured migration, so lookups and requirement
    /// checks can reach migrations outside the selection.
    async fn build(&self) -> Result<BTreeMap<String, Migration>> {
        let migrations = MigrationBuilder::new(&self.catalog, &self.services, self.map_pool.clone())
            .build(&self.config.migrations)
            .await?;
        Ok(migrations
            .into_iter()
            .map(|m| (m.id().to_string(), m))
            .collect())
    }

    async fn load_state(&self) -> Result<RunState> {
        let config_hash = self.config.hash();
        match self.state.load(&config_hash).await? {
            Some(state) => Ok(state),
            None => Ok(RunState::new(uuid::Uuid::new_v4().to_string(), config_hash)),
        }
    }

    fn check_idle(state: &RunState, selected: &[&MigrationDefinition]) -> Result<()> {
        for def in selected {
            let status = state.status(&def.id);
            if status != MigrationStatus::Idle {
                return Err(MigrateError::Busy {
                    migration: def.id.clone(),
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Required dependencies that have not processed every source row.
    async fn unmet_requirements(
        migration: &Migration,
        migrations: &BTreeMap<String, Migration>,
    ) -> Result<Option<String>> {
        let mut unmet = Vec::new();
        for dep_id in migration.required_dependencies() {
            let dep = migrations.get(dep_id).ok_or_else(|| {
                MigrateError::Config(format!(
                    "{} requires unknown migration {}",
                    migration.id(),
                    dep_id
                ))
            })?;
            let counts = dep.id_map().counts().await?;
            let total = dep.source().count().await?;
            if counts.processed < total || counts.update > 0 {
                unmet.push(dep_id.as_str());
            }
        }
        if unmet.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("requirements not met: {}", unmet.join(", "))))
        }
    }

    fn get<'m>(migrations: &'m BTreeMap<String, Migration>, id: &str) -> Result<&'m Migration> {
        migrations
            .get(id)
            .ok_or_else(|| MigrateError::Config(format!("Unknown migration: {}", id)))
    }

    /// Import the selected migrations, dependencies first.
    ///
    /// A failing migration is recorded and the run moves on; migrations
    /// that require it are then skipped by the requirements check.
    pub async fn import(&self, selection: &Selection, options: &RunOptions) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let mut state = self.load_state().await?;
        let selected = selection.resolve(&self.config, options.execute_dependencies)?;
        Self::check_idle(&state, &selected)?;

        info!(
            "Starting import run {}: {} migrations",
            state.run_id,
            selected.len()
        );
        let migrations = self.build().await?;

        let mut summaries = Vec::with_capacity(selected.len());
        for def in selected {
            if options.cancel.is_cancelled() {
                break;
            }
            let migration = Self::get(&migrations, &def.id)?;
            let id = migration.id();

            match Self::unmet_requirements(migration, &migrations).await {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    warn!("Skipping {}: {}", id, reason);
                    summaries.push(MigrationSummary::new(id, "skipped").with_message(reason));
                    continue;
                }
                Err(e) => {
                    error!("{}: requirements check failed: {}", id, e);
                    summaries.push(MigrationSummary::new(id, "failed").with_message(e.to_string()));
                    continue;
                }
            }

            state.begin(id, MigrationStatus::Importing)?;
            self.state.save(&state).await?;

            let executable = MigrateExecutable::new(
                migration,
                ExecuteOptions {
                    limit: options.limit,
                    update: options.update,
                    batch_size: self.config.run.batch_size,
                    high_water: state.high_water(id).cloned(),
                    cancel: options.cancel.clone(),
                },
            );
            let summary = match executable.import().await {
                Ok(report) => {
                    if let Some(high_water) = report.high_water.clone() {
                        state.set_high_water(id, high_water);
                    }
                    let status = match report.completion {
                        Completion::Completed => {
                            state.mark_imported(id);
                            if report.counts.failed > 0 {
                                "completed_with_errors"
                            } else {
                                "completed"
                            }
                        }
                        Completion::Stopped => "stopped",
                        Completion::Cancelled => "cancelled",
                    };
                    state.finish(id, None);
                    let mut summary = MigrationSummary::new(id, status);
                    summary.counts = Some(report.counts);
                    summary
                }
                Err(e) => {
                    error!("Import of {} failed: {}", id, e);
                    state.finish(id, Some(e.to_string()));
                    MigrationSummary::new(id, "failed").with_message(e.to_string())
                }
            };
            summaries.push(summary);
            self.state.save(&state).await?;
        }

        let result = MigrationResult::finish(
            state.run_id.clone(),
            "import",
            started_at,
            summaries,
            options.cancel.is_cancelled(),
        );
        info!(
            "Import run {} {}: {} processed, {} failed in {:.1}s",
            result.run_id,
            result.status,
            result.totals.processed,
            result.totals.failed,
            result.duration_seconds
        );
        Ok(result)
    }

    /// Roll back the selected migrations, dependents first.
    pub async fn rollback(
        &self,
        selection: &Selection,
        options: &RunOptions,
    ) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let mut state = self.load_state().await?;
        let mut selected = selection.resolve(&self.config, false)?;
        selected.reverse();
        Self::check_idle(&state, &selected)?;

        info!(
            "Starting rollback run {}: {} migrations",
            state.run_id,
            selected.len()
        );
        let migrations = self.build().await?;

        let mut summaries = Vec::with_capacity(selected.len());
        for def in selected {
            if options.cancel.is_cancelled() {
                break;
            }
            let migration = Self::get(&migrations, &def.id)?;
            let id = migration.id();

            state.begin(id, MigrationStatus::RollingBack)?;
            self.state.save(&state).await?;

            let executable = MigrateExecutable::new(
                migration,
                ExecuteOptions {
                    batch_size: self.config.run.batch_size,
                    cancel: options.cancel.clone(),
                    ..Default::default()
                },
            );
            let summary = match executable.rollback().await {
                Ok(report) => {
                    let status = if report.cancelled {
                        "cancelled"
                    } else if report.failed > 0 {
                        "completed_with_errors"
                    } else {
                        state.clear_high_water(id);
                        "completed"
                    };
                    state.finish(id, None);
                    let mut summary = MigrationSummary::new(id, status);
                    summary.rollback = Some(report);
                    summary
                }
                Err(e @ MigrateError::RollbackUnsupported(_)) => {
                    warn!("{}", e);
                    state.finish(id, None);
                    MigrationSummary::new(id, "skipped").with_message(e.to_string())
                }
                Err(e) => {
                    error!("Rollback of {} failed: {}", id, e);
                    state.finish(id, Some(e.to_string()));
                    MigrationSummary::new(id, "failed").with_message(e.to_string())
                }
            };
            summaries.push(summary);
            self.state.save(&state).await?;
        }

        let result = MigrationResult::finish(
            state.run_id.clone(),
            "rollback",
            started_at,
            summaries,
            options.cancel.is_cancelled(),
        );
        info!(
            "Rollback run {} {} in {:.1}s",
            result.run_id, result.status, result.duration_seconds
        );
        Ok(result)
    }

    /// Progress of the selected migrations.
    pub async fn status(&self, selection: &Selection) -> Result<Vec<MigrationStatusReport>> {
        let state = self.load_state().await?;
        let selected = selection.resolve(&self.config, false)?;
        let migrations = self.build().await?;

        let mut reports = Vec::with_capacity(selected.len());
        for def in selected {
            let migration = Self::get(&migrations, &def.id)?;
            let counts = migration.id_map().counts().await?;
            let total = match migration.source().count().await {
                Ok(total) => Some(total),
                Err(e) => {
                    warn!("{}: cannot count source rows: {}", def.id, e);
                    None
                }
            };
            let messages = migration.id_map().messages(None).await?.len() as u64;
            let saved = state.migration(&def.id);
            reports.push(MigrationStatusReport {
                id: def.id.clone(),
                label: def.label().to_string(),
                status: state.status(&def.id),
                total,
                imported: counts.imported,
                unprocessed: total.map(|t| t.saturating_sub(counts.processed)),
                needs_update: counts.update,
                failed: counts.error,
                ignored: counts.ignored,
                messages,
                last_imported: saved.and_then(|m| m.last_imported),
                last_error: saved.and_then(|m| m.last_error.clone()),
            });
        }
        Ok(reports)
    }

    /// Messages recorded for a migration's rows.
    pub async fn messages(&self, id: &str) -> Result<Vec<Message>> {
        let migrations = self.build().await?;
        Self::get(&migrations, id)?.id_map().messages(None).await
    }

    /// Force a migration back to idle after an interrupted operation.
    ///
    /// Returns the status it had.
    pub async fn reset_status(&self, id: &str) -> Result<MigrationStatus> {
        if self.config.migration(id).is_none() {
            return Err(MigrateError::Config(format!("Unknown migration: {}", id)));
        }
        let mut state = self.load_state().await?;
        let previous = state.reset_status(id);
        self.state.save(&state).await?;
        info!("Reset {} from {} to idle", id, previous);
        Ok(previous)
    }
}

fn static_bundle_info(bundles: &BTreeMap<String, Vec<String>>) -> StaticBundleInfo {
    bundles
        .iter()
        .fold(StaticBundleInfo::new(), |info, (entity_type, names)| {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            info.with(entity_type, &names)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executable::testing::vocabulary;
    use crate::id_map::MessageLevel;
    use crate::target::EntityStorage;

    const TERMS: &str = r#"
id: d6_taxonomy_term
migration_tags: [Drupal 6, Content]
source:
  plugin: embedded_data
  data_rows:
    - {tid: 10, vid: 1, name: Rust}
    - {tid: 11, vid: 2, name: General}
  ids:
    tid:
      type: integer
process:
  tid: tid
  name: name
  vid:
    plugin: migration_lookup
    migration: d6_taxonomy_vocabulary
    source: vid
destination:
  plugin: entity:taxonomy_term
migration_dependencies:
  required: [d6_taxonomy_vocabulary]
"#;

    fn indent(yaml: &str) -> String {
        yaml.trim()
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 0 {
                    format!("  - {}\n", line)
                } else {
                    format!("    {}\n", line)
                }
            })
            .collect()
    }

    /// Terms are declared before the vocabularies they depend on.
    fn config(vocabulary_rows: &str) -> Config {
        let yaml = format!(
            "target:\n  url: \"sqlite::memory:\"\nmigrations:\n{}{}",
            indent(TERMS),
            indent(&vocabulary(vocabulary_rows))
        );
        Config::from_yaml(&yaml).unwrap()
    }

    const VOCABULARIES: &str = "[{vid: 1, name: Tags, weight: 0}, {vid: 2, name: Forums, weight: 1}]";

    async fn orchestrator(vocabulary_rows: &str) -> Orchestrator {
        Orchestrator::new(config(vocabulary_rows)).await.unwrap()
    }

    fn ids(result: &MigrationResult) -> Vec<(&str, &str)> {
        result
            .migrations
            .iter()
            .map(|m| (m.id.as_str(), m.status.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_definitions_in_dependency_order() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        let ordered: Vec<&str> = orchestrator
            .definitions(&Selection::all())
            .unwrap()
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["d6_taxonomy_vocabulary", "d6_taxonomy_term"]);

        let tagged = orchestrator
            .definitions(&Selection::all().with_tag("Content"))
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert!(orchestrator.definitions(&Selection::ids(["d6_user"])).is_err());
    }

    #[tokio::test]
    async fn test_import_runs_dependencies_first() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        let result = orchestrator
            .import(&Selection::all(), &RunOptions::default())
            .await
            .unwrap();

        assert_eq!(result.status, "completed");
        assert_eq!(
            ids(&result),
            vec![
                ("d6_taxonomy_vocabulary", "completed"),
                ("d6_taxonomy_term", "completed")
            ]
        );
        assert_eq!(result.totals.created, 4);

        let terms = orchestrator
            .services
            .entities
            .list("taxonomy_term")
            .await
            .unwrap();
        let vids: Vec<Option<&str>> = terms
            .iter()
            .map(|t| t.get("vid").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(vids, vec![Some("tags"), Some("forums")]);

        let json = result.to_json().unwrap();
        assert!(json.contains("\"operation\": \"import\""));
    }

    #[tokio::test]
    async fn test_unmet_requirements_skip_dependent() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        let limited = RunOptions {
            limit: Some(1),
            ..Default::default()
        };
        let result = orchestrator
            .import(&Selection::all(), &limited)
            .await
            .unwrap();

        assert_eq!(result.status, "failed");
        assert_eq!(
            ids(&result),
            vec![
                ("d6_taxonomy_vocabulary", "stopped"),
                ("d6_taxonomy_term", "skipped")
            ]
        );
        assert_eq!(
            result.migrations[1].message.as_deref(),
            Some("requirements not met: d6_taxonomy_vocabulary")
        );

        // Finishing the vocabularies unblocks the terms.
        let result = orchestrator
            .import(&Selection::all(), &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, "completed");
        assert_eq!(result.migrations[1].counts.map(|c| c.created), Some(2));
    }

    #[tokio::test]
    async fn test_execute_dependencies_pulls_in_required() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        let terms_only = Selection::ids(["d6_taxonomy_term"]);

        let result = orchestrator
            .import(&terms_only, &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&result), vec![("d6_taxonomy_term", "skipped")]);

        let options = RunOptions {
            execute_dependencies: true,
            ..Default::default()
        };
        let result = orchestrator.import(&terms_only, &options).await.unwrap();
        assert_eq!(result.migrations.len(), 2);
        assert_eq!(result.status, "completed");
    }

    #[tokio::test]
    async fn test_status_and_messages() {
        let orchestrator =
            orchestrator("[{vid: 1, name: Tags, weight: 0}, {vid: 2, name: '', weight: 1}]").await;
        orchestrator
            .import(&Selection::ids(["d6_taxonomy_vocabulary"]), &RunOptions::default())
            .await
            .unwrap();

        let reports = orchestrator.status(&Selection::all()).await.unwrap();
        let vocabulary = &reports[0];
        assert_eq!(vocabulary.id, "d6_taxonomy_vocabulary");
        assert_eq!(vocabulary.status, MigrationStatus::Idle);
        assert_eq!(vocabulary.total, Some(2));
        assert_eq!(vocabulary.imported, 1);
        assert_eq!(vocabulary.ignored, 1);
        assert_eq!(vocabulary.unprocessed, Some(0));
        assert_eq!(vocabulary.messages, 1);
        assert!(vocabulary.last_imported.is_some());

        let terms = &reports[1];
        assert_eq!(terms.imported, 0);
        assert_eq!(terms.unprocessed, Some(2));

        let messages = orchestrator.messages("d6_taxonomy_vocabulary").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, MessageLevel::Information);
        assert_eq!(messages[0].message, "vocabulary has no name");
    }

    #[tokio::test]
    async fn test_rollback_runs_dependents_first() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        orchestrator
            .import(&Selection::all(), &RunOptions::default())
            .await
            .unwrap();

        let result = orchestrator
            .rollback(&Selection::all(), &RunOptions::default())
            .await
            .unwrap();
        assert_eq!(
            ids(&result),
            vec![
                ("d6_taxonomy_term", "completed"),
                ("d6_taxonomy_vocabulary", "completed")
            ]
        );
        assert_eq!(result.migrations[0].rollback.as_ref().map(|r| r.rolled_back), Some(2));
        assert!(orchestrator
            .services
            .entities
            .list("taxonomy_vocabulary")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_busy_migration_blocks_run_until_reset() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        let mut state = orchestrator.load_state().await.unwrap();
        state
            .begin("d6_taxonomy_vocabulary", MigrationStatus::Importing)
            .unwrap();
        orchestrator.state.save(&state).await.unwrap();

        let err = orchestrator
            .import(&Selection::all(), &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Busy { .. }));

        let previous = orchestrator
            .reset_status("d6_taxonomy_vocabulary")
            .await
            .unwrap();
        assert_eq!(previous, MigrationStatus::Importing);
        assert!(orchestrator
            .import(&Selection::all(), &RunOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_next_migration() {
        let orchestrator = orchestrator(VOCABULARIES).await;
        let options = RunOptions::default();
        options.cancel.cancel();

        let result = orchestrator.import(&Selection::all(), &options).await.unwrap();
        assert_eq!(result.status, "cancelled");
        assert!(result.migrations.is_empty());
    }

    #[tokio::test]
    async fn test_static_bundle_info_from_config() {
        let bundles = BTreeMap::from([(
            "node".to_string(),
            vec!["page".to_string(), "article".to_string()],
        )]);
        let info = static_bundle_info(&bundles);
        assert_eq!(info.bundles("node").await.unwrap(), vec!["article", "page"]);
    }
}
