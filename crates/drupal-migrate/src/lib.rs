//! # drupal-migrate
//!
//! Migration engine for moving a Drupal 6/7 site into a Drupal 8 style
//! target store.
//!
//! Each migration declared in YAML wires three plugins together:
//!
//! - a **source** that reads rows from the legacy database (or inline data)
//! - a **process pipeline** that maps source properties to destination
//!   properties, one ordered chain of steps per property
//! - a **destination** that writes entities, config objects, displays or
//!   authmap entries
//!
//! An **ID map** per migration records where every source row went. It makes
//! re-runs idempotent, lets later migrations resolve references with
//! `migration_lookup`, and drives rollback.
//!
//! ## Example
//!
//! ```rust,no_run
//! use drupal_migrate::{Config, Orchestrator, RunOptions, Selection};
//!
//! #[tokio::main]
//! async fn main() -> drupal_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator
//!         .import(&Selection::all(), &RunOptions::default())
//!         .await?;
//!     println!("Processed {} rows", result.totals.processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod destination;
pub mod error;
pub mod executable;
pub mod id_map;
pub mod migration;
pub mod orchestrator;
pub mod process;
pub mod source;
pub mod state;
pub mod target;

// Re-exports for convenient access
pub use crate::core::{PluginCatalog, PluginConfig, Row, Value};
pub use config::{Config, DatabaseConfig, RunConfig};
pub use error::{MigrateError, Result};
pub use executable::{ExecuteOptions, ImportCounts, ImportReport, MigrateExecutable, RollbackReport};
pub use id_map::{Message, MessageLevel, RowStatus};
pub use migration::{Migration, MigrationBuilder, MigrationDefinition};
pub use orchestrator::{
    MigrationResult, MigrationStatusReport, MigrationSummary, Orchestrator, RunOptions, Selection,
};
pub use state::{MigrationStatus, RunState};
