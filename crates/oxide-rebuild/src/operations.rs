//! Migration operations.
//!
//! This module defines the schema changes a migration can declare, along
//! with their reversal. [`SchemaTx::apply`](crate::provider::SchemaTx::apply)
//! turns each operation into native statements or a table rebuild.

use serde::{Deserialize, Serialize};

use crate::naming::ConventionalName;
use crate::schema::{ColumnSchema, ForeignKeySchema};

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MigrationOperation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        name: String,
        /// Column definitions.
        columns: Vec<ColumnSchema>,
        /// Primary key column(s).
        primary_key: Vec<String>,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        name: String,
    },

    /// Rename a table.
    RenameTable {
        /// Old table name.
        old_name: String,
        /// New table name.
        new_name: String,
    },

    /// Add a column to a table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnSchema,
    },

    /// Drop a column from a table.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column_name: String,
    },

    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old column name.
        old_name: String,
        /// New column name.
        new_name: String,
    },

    /// Replace a column's definition.
    AlterColumn {
        /// Table name.
        table: String,
        /// New column definition.
        column: ColumnSchema,
        /// Original column definition (for reversal).
        original: Option<ColumnSchema>,
    },

    /// Create an index named `IN_<table>_<columns>`.
    CreateIndex {
        /// Table name.
        table: String,
        /// Columns to index.
        columns: Vec<String>,
        /// Whether this is a unique index.
        unique: bool,
        /// Partial index condition.
        condition: Option<String>,
    },

    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKeySchema,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// Foreign key as it was added.
        foreign_key: ForeignKeySchema,
    },

    /// Create a row trigger named `TR_<table>_<suffix>`.
    CreateTrigger {
        /// Table the trigger fires on.
        table: String,
        /// Name suffix.
        suffix: String,
        /// Timing and event, e.g. `AFTER INSERT`.
        event: String,
        /// Statements between `BEGIN` and `END`.
        body: String,
    },

    /// Drop a trigger.
    DropTrigger {
        /// Trigger name.
        name: String,
    },

    /// Run raw SQL (for custom migrations).
    RunSql {
        /// Forward SQL statement.
        forward: String,
        /// Backward SQL statement for rollback.
        backward: Option<String>,
    },
}

impl MigrationOperation {
    // Convenience constructors

    /// Creates a CreateTable operation.
    #[must_use]
    pub fn create_table(
        name: impl Into<String>,
        columns: Vec<ColumnSchema>,
        primary_key: Vec<String>,
    ) -> Self {
        Self::CreateTable {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Creates a DropTable operation.
    #[must_use]
    pub fn drop_table(name: impl Into<String>) -> Self {
        Self::DropTable { name: name.into() }
    }

    /// Creates a RenameTable operation.
    #[must_use]
    pub fn rename_table(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self::RenameTable {
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates an AddColumn operation.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: ColumnSchema) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a DropColumn operation.
    #[must_use]
    pub fn drop_column(table: impl Into<String>, column_name: impl Into<String>) -> Self {
        Self::DropColumn {
            table: table.into(),
            column_name: column_name.into(),
        }
    }

    /// Creates a RenameColumn operation.
    #[must_use]
    pub fn rename_column(
        table: impl Into<String>,
        old_name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        Self::RenameColumn {
            table: table.into(),
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    /// Creates an AlterColumn operation; pass the original definition to
    /// make it reversible.
    #[must_use]
    pub fn alter_column(
        table: impl Into<String>,
        column: ColumnSchema,
        original: Option<ColumnSchema>,
    ) -> Self {
        Self::AlterColumn {
            table: table.into(),
            column,
            original,
        }
    }

    /// Creates a CreateIndex operation.
    #[must_use]
    pub fn create_index(table: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        Self::CreateIndex {
            table: table.into(),
            columns,
            unique,
            condition: None,
        }
    }

    /// Creates a DropIndex operation.
    #[must_use]
    pub fn drop_index(name: impl Into<String>) -> Self {
        Self::DropIndex { name: name.into() }
    }

    /// Creates an AddForeignKey operation.
    #[must_use]
    pub fn add_foreign_key(table: impl Into<String>, foreign_key: ForeignKeySchema) -> Self {
        Self::AddForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates a DropForeignKey operation.
    #[must_use]
    pub fn drop_foreign_key(table: impl Into<String>, foreign_key: ForeignKeySchema) -> Self {
        Self::DropForeignKey {
            table: table.into(),
            foreign_key,
        }
    }

    /// Creates a CreateTrigger operation.
    #[must_use]
    pub fn create_trigger(
        table: impl Into<String>,
        suffix: impl Into<String>,
        event: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::CreateTrigger {
            table: table.into(),
            suffix: suffix.into(),
            event: event.into(),
            body: body.into(),
        }
    }

    /// Creates a DropTrigger operation.
    #[must_use]
    pub fn drop_trigger(name: impl Into<String>) -> Self {
        Self::DropTrigger { name: name.into() }
    }

    /// Creates a RunSql operation.
    #[must_use]
    pub fn run_sql(forward: impl Into<String>, backward: Option<String>) -> Self {
        Self::RunSql {
            forward: forward.into(),
            backward,
        }
    }

    /// Returns the reverse operation for rollback.
    ///
    /// Returns `None` if the operation is not reversible.
    #[must_use]
    pub fn reverse(&self) -> Option<Self> {
        match self {
            Self::CreateTable { name, .. } => Some(Self::drop_table(name.clone())),

            Self::DropTable { .. } => {
                // Cannot reverse without knowing the original table definition
                None
            }

            Self::RenameTable { old_name, new_name } => {
                Some(Self::rename_table(new_name.clone(), old_name.clone()))
            }

            Self::AddColumn { table, column } => {
                Some(Self::drop_column(table.clone(), column.name.clone()))
            }

            Self::DropColumn { .. } => None,

            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => Some(Self::rename_column(
                table.clone(),
                new_name.clone(),
                old_name.clone(),
            )),

            Self::AlterColumn {
                table,
                column,
                original,
            } => original.as_ref().map(|orig| Self::AlterColumn {
                table: table.clone(),
                column: orig.clone(),
                original: Some(column.clone()),
            }),

            Self::CreateIndex { table, columns, .. } => Some(Self::drop_index(
                ConventionalName::index(table, columns).to_string(),
            )),

            Self::DropIndex { .. } => None,

            Self::AddForeignKey { table, foreign_key } => {
                Some(Self::drop_foreign_key(table.clone(), foreign_key.clone()))
            }

            Self::DropForeignKey { table, foreign_key } => {
                Some(Self::add_foreign_key(table.clone(), foreign_key.clone()))
            }

            Self::CreateTrigger { table, suffix, .. } => Some(Self::drop_trigger(
                ConventionalName::trigger(table, suffix).to_string(),
            )),

            Self::DropTrigger { .. } => None,

            Self::RunSql { backward, forward } => backward.as_ref().map(|bwd| Self::RunSql {
                forward: bwd.clone(),
                backward: Some(forward.clone()),
            }),
        }
    }

    /// Returns true if this operation can be reversed.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        match self {
            Self::DropTable { .. }
            | Self::DropColumn { .. }
            | Self::DropIndex { .. }
            | Self::DropTrigger { .. } => false,
            Self::AlterColumn { original, .. } => original.is_some(),
            Self::RunSql { backward, .. } => backward.is_some(),
            _ => true,
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { name, .. } => format!("Create table '{name}'"),
            Self::DropTable { name } => format!("Drop table '{name}'"),
            Self::RenameTable { old_name, new_name } => {
                format!("Rename table '{old_name}' to '{new_name}'")
            }
            Self::AddColumn { table, column } => {
                format!("Add column '{}' to table '{table}'", column.name)
            }
            Self::DropColumn { table, column_name } => {
                format!("Drop column '{column_name}' from table '{table}'")
            }
            Self::RenameColumn {
                table,
                old_name,
                new_name,
            } => format!("Rename column '{old_name}' to '{new_name}' in table '{table}'"),
            Self::AlterColumn { table, column, .. } => {
                format!("Alter column '{}' in table '{table}'", column.name)
            }
            Self::CreateIndex { table, columns, .. } => format!(
                "Create index '{}' on table '{table}'",
                ConventionalName::index(table, columns)
            ),
            Self::DropIndex { name } => format!("Drop index '{name}'"),
            Self::AddForeignKey { table, foreign_key } => format!(
                "Add foreign key '{}' to table '{table}'",
                foreign_key.name
            ),
            Self::DropForeignKey { table, foreign_key } => format!(
                "Drop foreign key '{}' from table '{table}'",
                foreign_key.name
            ),
            Self::CreateTrigger { table, suffix, .. } => format!(
                "Create trigger '{}'",
                ConventionalName::trigger(table, suffix)
            ),
            Self::DropTrigger { name } => format!("Drop trigger '{name}'"),
            Self::RunSql { .. } => "Run custom SQL".to_string(),
        }
    }
}

/// Reverses a list of operations for rollback, last operation first.
///
/// Returns `None` if any operation is not reversible.
#[must_use]
pub fn reverse_all(operations: &[MigrationOperation]) -> Option<Vec<MigrationOperation>> {
    operations.iter().rev().map(MigrationOperation::reverse).collect()
}
