//! Migrator configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Default name of the applied-version marker table.
pub const DEFAULT_HISTORY_TABLE: &str = "oxide_schema_versions";

/// Default suffix of the temporary table a rebuild creates.
pub const DEFAULT_TEMP_SUFFIX: &str = "_temp";

/// Options controlling how migrations run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Table recording applied versions.
    pub history_table: String,
    /// Suffix appended to a table name while it is being rebuilt.
    pub temp_suffix: String,
    /// Log mutating statements instead of executing them.
    pub dry_run: bool,
    /// Check foreign keys and dependent object names after each step.
    pub verify_after_apply: bool,
    /// Use `ALTER TABLE … RENAME COLUMN` instead of a rebuild when possible.
    pub native_rename_column: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            temp_suffix: DEFAULT_TEMP_SUFFIX.to_string(),
            dry_run: false,
            verify_after_apply: false,
            native_rename_column: false,
        }
    }
}

impl MigratorConfig {
    /// Loads a configuration from a JSON file; missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| MigrateError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Sets the history table name.
    #[must_use]
    pub fn history_table(mut self, name: impl Into<String>) -> Self {
        self.history_table = name.into();
        self
    }

    /// Sets the temporary table suffix.
    #[must_use]
    pub fn temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Enables post-apply verification.
    #[must_use]
    pub fn verify_after_apply(mut self, enabled: bool) -> Self {
        self.verify_after_apply = enabled;
        self
    }

    /// Enables native column renames.
    #[must_use]
    pub fn native_rename_column(mut self, enabled: bool) -> Self {
        self.native_rename_column = enabled;
        self
    }

    /// Name of the temporary table used while rebuilding `table`.
    #[must_use]
    pub fn temp_table(&self, table: &str) -> String {
        format!("{table}{}", self.temp_suffix)
    }
}
