//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, unknown plugin, bad dependency graph, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The legacy database is missing a table or column a source plugin needs.
    #[error("Source requirements not met for {plugin}: {message}")]
    SourceRequirements { plugin: String, message: String },

    /// Legacy or target database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A process step failed for a specific row
    #[error("Process failed for {property}: {message}")]
    Process { property: String, message: String },

    /// Destination write failed
    #[error("Destination {plugin} failed: {message}")]
    Destination { plugin: String, message: String },

    /// Destination delete failed during rollback
    #[error("Rollback failed for {migration}: {message}")]
    Rollback { migration: String, message: String },

    /// The destination cannot be rolled back
    #[error("Migration {0} does not support rollback")]
    RollbackUnsupported(String),

    /// ID map storage error
    #[error("ID map error for {migration}: {message}")]
    IdMap { migration: String, message: String },

    /// Run state error
    #[error("State error: {0}")]
    State(String),

    /// Config hash mismatch on resume
    #[error("Config has changed since the state file was written. Use a fresh state file or --force.")]
    ConfigChanged,

    /// Another operation is already running on the migration
    #[error("Migration {migration} is busy with another operation ({status})")]
    Busy { migration: String, status: String },

    /// Legacy serialized value could not be decoded
    #[error("Unserialize error at byte {offset}: {message}")]
    Codec { offset: usize, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for legacy database / source errors.
pub const EXIT_SOURCE_ERROR: u8 = 2;
/// Exit code for row-level process or destination errors surfaced to the caller.
pub const EXIT_IMPORT_ERROR: u8 = 3;
/// Exit code for rollback errors.
pub const EXIT_ROLLBACK_ERROR: u8 = 4;
/// Exit code for run state / ID map errors.
pub const EXIT_STATE_ERROR: u8 = 5;
/// Exit code for cancelled runs.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for IO errors.
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a SourceRequirements error.
    pub fn requirements(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SourceRequirements {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a Process error
    pub fn process(property: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Process {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Create a Destination error
    pub fn destination(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Destination {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create an IdMap error
    pub fn id_map(migration: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::IdMap {
            migration: migration.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::ConfigChanged => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::SourceRequirements { .. }
            | MigrateError::Database(_)
            | MigrateError::Codec { .. } => EXIT_SOURCE_ERROR,
            MigrateError::Process { .. } | MigrateError::Destination { .. } => EXIT_IMPORT_ERROR,
            MigrateError::Rollback { .. } | MigrateError::RollbackUnsupported(_) => {
                EXIT_ROLLBACK_ERROR
            }
            MigrateError::IdMap { .. }
            | MigrateError::State(_)
            | MigrateError::Busy { .. }
            | MigrateError::Json(_) => EXIT_STATE_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::requirements("d6_node_type", "missing node_type").exit_code(),
            EXIT_SOURCE_ERROR
        );
        assert_eq!(
            MigrateError::RollbackUnsupported("d6_variables".into()).exit_code(),
            EXIT_ROLLBACK_ERROR
        );
        assert_eq!(MigrateError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(MigrateError::Io(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml");
        let detailed = MigrateError::Io(io).format_detailed();
        assert!(detailed.starts_with("Error: IO error: config.yaml"));
    }
}
