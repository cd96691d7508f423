//! Versioned SQLite schema migrations with table rebuilds.
//!
//! SQLite can only add columns and rename tables in place. `oxide-rebuild`
//! performs every other column change by rebuilding the table: it parses the
//! stored `CREATE TABLE` text, rewrites the definition, copies the rows into a
//! temporary table and swaps it in, carrying the table's indexes and triggers
//! (and triggers on other tables that mention it) across the swap.
//!
//! # Architecture
//!
//! - **Lexer / Parser** - Tokenizes SQL and splits a table definition into
//!   columns, key clause, constraints and options
//! - **Naming** - Conventional names for indexes (`IN_`) and triggers (`TR_`)
//! - **Dependents** - Reads, rewrites and recreates indexes and triggers
//! - **Rebuild** - The rebuild procedure for a single column change
//! - **Provider** - [`SchemaTx`](provider::SchemaTx), the schema operations
//!   available to a migration step inside its transaction
//! - **Executor** - Plans and runs steps between versions, one transaction each
//! - **History** - The applied-version marker table
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_rebuild::prelude::*;
//!
//! pub struct AddOrders;
//!
//! impl DeclarativeMigration for AddOrders {
//!     const VERSION: i64 = 1;
//!     const NAME: &'static str = "add_orders";
//!
//!     fn operations() -> Vec<MigrationOperation> {
//!         vec![
//!             MigrationOperation::create_table(
//!                 "orders",
//!                 vec![
//!                     ColumnSchema::new("id", SqlType::Integer).primary_key(),
//!                     ColumnSchema::new("customer_id", SqlType::Integer).not_null(),
//!                 ],
//!                 vec!["id".to_string()],
//!             ),
//!             MigrationOperation::create_index("orders", vec!["customer_id".into()], false),
//!         ]
//!     }
//! }
//!
//! let set = MigrationSet::new(vec![Box::new(AddOrders::to_migration())])?;
//! let migrator = Migrator::connect("sqlite:app.db", MigratorConfig::default()).await?;
//! migrator.migrate_latest(&set).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show applied, pending and missing versions
//! oxide-rebuild status
//!
//! # Apply everything
//! oxide-rebuild migrate
//!
//! # Revert down to version 2, logging statements only
//! oxide-rebuild migrate --target 2 --dry-run
//! ```

pub mod cli;
pub mod config;
pub mod dependents;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod history;
pub mod lexer;
pub mod migration;
pub mod naming;
pub mod operations;
pub mod parser;
pub mod progress;
pub mod provider;
pub mod rebuild;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::MigratorConfig;
    pub use crate::dependents::{ColumnRename, DependentObject, DependentsPlan};
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{
        MigrationPlan, MigrationReport, MigrationStatus, Migrator, StepOutcome,
    };
    pub use crate::history::{AppliedVersion, MigrationHistory};
    pub use crate::migration::{
        DeclarativeMigration, Direction, InitHook, Migration, MigrationSet, OperationMigration,
    };
    pub use crate::naming::{ConventionalName, ObjectKind};
    pub use crate::operations::MigrationOperation;
    pub use crate::parser::{ColumnDefinition, TableDefinition};
    pub use crate::provider::SchemaTx;
    pub use crate::rebuild::RebuildOp;
    pub use crate::schema::{ColumnSchema, DefaultValue, ForeignKeyAction, ForeignKeySchema, SqlType};
}
