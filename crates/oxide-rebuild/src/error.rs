//! Error types for the migration system.

use std::path::PathBuf;

use crate::migration::Direction;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Stored table definition does not have the generated shape.
    #[error("Cannot parse definition of table '{table}': {message}")]
    ParseShape {
        /// Table whose definition was read.
        table: String,
        /// What was wrong with it.
        message: String,
    },

    /// A dependent object's name does not follow the naming convention,
    /// so it cannot be renamed automatically.
    #[error(
        "{object} on table '{table}' does not follow the naming convention ({reason}); \
         drop it and recreate it manually before running this migration"
    )]
    NamingConvention {
        /// Name of the index or trigger.
        object: String,
        /// Table the object belongs to.
        table: String,
        /// Which part of the convention is violated.
        reason: String,
    },

    /// More than one column definition matches a foreign key removal.
    #[error("Foreign key '{constraint}' matches {matches} definitions in table '{table}'")]
    AmbiguousForeignKeyRemoval {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
        /// Number of matches found.
        matches: usize,
    },

    /// Foreign key requested for removal does not exist.
    #[error("Foreign key '{constraint}' not found in table '{table}'")]
    ForeignKeyNotFound {
        /// Table name.
        table: String,
        /// Constraint name.
        constraint: String,
    },

    /// Two loaded migrations share a version number.
    #[error("Duplicate migration version {0}")]
    DuplicateVersion(i64),

    /// Migration versions must be positive.
    #[error("Invalid migration version {0}")]
    InvalidVersion(i64),

    /// A step's action failed; its transaction was rolled back.
    #[error("Migration {version} '{name}' failed while running {direction}: {source}")]
    StepFailed {
        /// Version of the failing step.
        version: i64,
        /// Name of the failing step.
        name: String,
        /// Which action was running.
        direction: Direction,
        /// The underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// Schema is inconsistent after a step was applied.
    #[error("Schema inconsistent after migration {version}:\n{}", .violations.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n"))]
    PostApplyConsistency {
        /// Version that produced the inconsistency.
        version: i64,
        /// Individual findings.
        violations: Vec<String>,
    },

    /// Table does not exist.
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// Column does not exist.
    #[error("Column '{column}' does not exist in table '{table}'")]
    ColumnNotFound {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Column already exists.
    #[error("Column '{column}' already exists in table '{table}'")]
    ColumnExists {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// An index or trigger still uses a column that is being removed.
    #[error(
        "Column '{column}' of table '{table}' is used by {object}; \
         drop it before removing the column"
    )]
    ColumnInUse {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The index or trigger using the column.
        object: String,
    },

    /// A migration is not reversible.
    #[error("Migration '{0}' is not reversible")]
    NotReversible(String),

    /// Operation cannot be expressed by this crate.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Database error during migration execution.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be loaded.
    #[error("Invalid configuration file '{path}': {source}")]
    Config {
        /// Path of the configuration file.
        path: PathBuf,
        /// Deserialization failure.
        #[source]
        source: serde_json::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    pub(crate) fn parse_shape(table: &str, message: impl Into<String>) -> Self {
        Self::ParseShape {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
