//! Transaction-scoped schema operations.
//!
//! A [`SchemaTx`] wraps the single transaction a migration step runs in.
//! Every statement a step issues, including the ones the table rebuilder
//! and the dependent object migrator synthesize, goes through it. Dropping
//! a `SchemaTx` without calling [`SchemaTx::commit`] rolls the step back.

use std::sync::{Arc, Mutex};

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};

use crate::config::MigratorConfig;
use crate::dependents::{self, ColumnRename};
use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::history::MigrationHistory;
use crate::naming::{self, ConventionalName, ObjectKind};
use crate::operations::MigrationOperation;
use crate::parser::TableDefinition;
use crate::progress::Progress;
use crate::rebuild::{self, RebuildOp};
use crate::schema::{ColumnSchema, ForeignKeySchema};

/// Schema operations over one open transaction.
pub struct SchemaTx {
    tx: Transaction<'static, Sqlite>,
    dialect: Arc<dyn MigrationDialect>,
    config: Arc<MigratorConfig>,
    progress: Option<Arc<Mutex<Progress>>>,
}

impl SchemaTx {
    /// Opens a transaction on `pool`.
    pub async fn begin(
        pool: &SqlitePool,
        dialect: Arc<dyn MigrationDialect>,
        config: Arc<MigratorConfig>,
    ) -> Result<Self> {
        Ok(Self {
            tx: pool.begin().await?,
            dialect,
            config,
            progress: None,
        })
    }

    pub(crate) fn with_progress(mut self, progress: Option<Arc<Mutex<Progress>>>) -> Self {
        self.progress = progress;
        self
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &dyn MigrationDialect {
        self.dialect.as_ref()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Returns true if mutating statements are suppressed.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Raw connection of the transaction, for reads.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Executes a statement that changes the database.
    ///
    /// In dry-run mode the statement is logged instead.
    pub async fn execute(&mut self, sql: &str) -> Result<()> {
        if self.config.dry_run {
            info!(sql = %sql, "Dry run, statement suppressed");
            return Ok(());
        }
        debug!(sql = %sql, "Executing SQL");
        sqlx::query(sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    /// Runs a query and returns its rows. Queries run in dry-run mode too.
    pub async fn query(&mut self, sql: &str) -> Result<Vec<SqliteRow>> {
        debug!(sql = %sql, "Running query");
        Ok(sqlx::query(sql).fetch_all(&mut *self.tx).await?)
    }

    /// Returns whether a table exists.
    pub async fn table_exists(&mut self, name: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.is_some())
    }

    /// Returns whether a column exists.
    pub async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM pragma_table_info(?) WHERE name = ? COLLATE NOCASE",
        )
        .bind(table)
        .bind(column)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.is_some())
    }

    /// Reads and parses the stored definition of a table.
    ///
    /// Returns `None` if the table does not exist.
    pub async fn table_definition(&mut self, name: &str) -> Result<Option<TableDefinition>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|(sql,)| TableDefinition::parse(&sql)).transpose()
    }

    /// Creates a table from column schemas.
    pub async fn add_table(
        &mut self,
        name: &str,
        columns: &[ColumnSchema],
        primary_key: &[String],
    ) -> Result<()> {
        let column_list = self.dialect.column_list_sql(columns, primary_key);
        self.add_table_sql(name, &column_list).await
    }

    /// Creates a table from a prepared column list.
    pub async fn add_table_sql(&mut self, name: &str, column_list_sql: &str) -> Result<()> {
        let sql = self.dialect.create_table_sql(name, column_list_sql, false);
        self.execute(&sql).await
    }

    /// Drops a table.
    pub async fn remove_table(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect.drop_table_sql(name);
        self.execute(&sql).await
    }

    /// Renames a table. Dependent object names are left as they are.
    pub async fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let sql = self.dialect.rename_table_sql(old_name, new_name);
        self.execute(&sql).await
    }

    /// Creates an index named after its table and columns.
    pub async fn add_index<S: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[S],
        unique: bool,
        condition: Option<&str>,
    ) -> Result<ConventionalName> {
        let name = ConventionalName::index(table, columns);
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let sql = self
            .dialect
            .create_index_sql(&name.to_string(), table, &columns, unique, condition);
        self.execute(&sql).await?;
        Ok(name)
    }

    /// Drops an index.
    pub async fn remove_index(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect.drop_object_sql(ObjectKind::Index, name);
        self.execute(&sql).await
    }

    /// Creates a row trigger named `TR_<table>_<suffix>`.
    pub async fn add_trigger(
        &mut self,
        table: &str,
        suffix: &str,
        event: &str,
        body: &str,
    ) -> Result<ConventionalName> {
        let name = ConventionalName::trigger(table, suffix);
        let sql = self
            .dialect
            .create_trigger_sql(&name.to_string(), table, event, body);
        self.execute(&sql).await?;
        Ok(name)
    }

    /// Drops a trigger.
    pub async fn remove_trigger(&mut self, name: &str) -> Result<()> {
        let sql = self.dialect.drop_object_sql(ObjectKind::Trigger, name);
        self.execute(&sql).await
    }

    /// Moves the indexes and triggers of `orig` onto `new`.
    pub async fn migrate_dependents(
        &mut self,
        orig: &str,
        new: &str,
        rename: Option<&ColumnRename>,
    ) -> Result<()> {
        dependents::migrate(self, orig, new, rename).await
    }

    /// Adds a column, natively when SQLite accepts it, by rebuild otherwise.
    pub async fn add_column(&mut self, table: &str, column: &ColumnSchema) -> Result<()> {
        if !self.dialect.can_add_column(column) {
            return rebuild::rebuild(self, table, &RebuildOp::AddColumn(column.clone())).await;
        }
        if !self.table_exists(table).await? {
            warn!(table = %table, column = %column.name, "Table does not exist, skipping");
            return Ok(());
        }
        if self.column_exists(table, &column.name).await? {
            return Err(MigrateError::ColumnExists {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
        let sql = self.dialect.add_column_sql(table, column);
        self.execute(&sql).await
    }

    /// Removes a column by rebuilding the table.
    pub async fn remove_column(&mut self, table: &str, column: &str) -> Result<()> {
        rebuild::rebuild(self, table, &RebuildOp::RemoveColumn(column.to_string())).await
    }

    /// Renames a column.
    ///
    /// Uses `ALTER TABLE … RENAME COLUMN` when configured and supported;
    /// dependent object names are updated either way.
    pub async fn rename_column(&mut self, table: &str, from: &str, to: &str) -> Result<()> {
        let rename = ColumnRename::new(from, to);
        if !(self.config.native_rename_column && self.dialect.supports_rename_column()) {
            return rebuild::rebuild(self, table, &RebuildOp::RenameColumn(rename)).await;
        }

        if !self.column_exists(table, from).await? {
            return Err(MigrateError::ColumnNotFound {
                table: table.to_string(),
                column: from.to_string(),
            });
        }
        let plan = dependents::prepare(self, table, table, Some(&rename)).await?;
        let sql = self.dialect.rename_column_sql(table, from, to);
        self.execute(&sql).await?;
        plan.apply(self).await
    }

    /// Replaces a column's definition, keeping its named constraints.
    pub async fn change_column(&mut self, table: &str, column: &ColumnSchema) -> Result<()> {
        rebuild::rebuild(self, table, &RebuildOp::ChangeColumn(column.clone())).await
    }

    /// Adds a foreign key constraint to its column.
    pub async fn add_foreign_key(&mut self, table: &str, foreign_key: &ForeignKeySchema) -> Result<()> {
        rebuild::rebuild(self, table, &RebuildOp::AddForeignKey(foreign_key.clone())).await
    }

    /// Removes a foreign key constraint.
    ///
    /// With `strict` unset, a constraint that is not found is skipped.
    pub async fn remove_foreign_key(
        &mut self,
        table: &str,
        foreign_key: &ForeignKeySchema,
        strict: bool,
    ) -> Result<()> {
        let op = RebuildOp::RemoveForeignKey {
            foreign_key: foreign_key.clone(),
            strict,
        };
        rebuild::rebuild(self, table, &op).await
    }

    /// Applies one declarative operation.
    pub async fn apply(&mut self, operation: &MigrationOperation) -> Result<()> {
        debug!(operation = %operation.description(), "Applying operation");
        match operation {
            MigrationOperation::CreateTable {
                name,
                columns,
                primary_key,
            } => self.add_table(name, columns, primary_key).await,
            MigrationOperation::DropTable { name } => self.remove_table(name).await,
            MigrationOperation::RenameTable { old_name, new_name } => {
                self.rename_table(old_name, new_name).await?;
                dependents::rebind_names(self, old_name, new_name).await
            }
            MigrationOperation::AddColumn { table, column } => self.add_column(table, column).await,
            MigrationOperation::DropColumn { table, column_name } => {
                self.remove_column(table, column_name).await
            }
            MigrationOperation::RenameColumn {
                table,
                old_name,
                new_name,
            } => self.rename_column(table, old_name, new_name).await,
            MigrationOperation::AlterColumn { table, column, .. } => {
                self.change_column(table, column).await
            }
            MigrationOperation::CreateIndex {
                table,
                columns,
                unique,
                condition,
            } => self
                .add_index(table, columns, *unique, condition.as_deref())
                .await
                .map(|_| ()),
            MigrationOperation::DropIndex { name } => self.remove_index(name).await,
            MigrationOperation::AddForeignKey { table, foreign_key } => {
                self.add_foreign_key(table, foreign_key).await
            }
            MigrationOperation::DropForeignKey { table, foreign_key } => {
                self.remove_foreign_key(table, foreign_key, true).await
            }
            MigrationOperation::CreateTrigger {
                table,
                suffix,
                event,
                body,
            } => self
                .add_trigger(table, suffix, event, body)
                .await
                .map(|_| ()),
            MigrationOperation::DropTrigger { name } => self.remove_trigger(name).await,
            MigrationOperation::RunSql { forward, .. } => self.execute(forward).await,
        }
    }

    /// Reports how far the running step has come (0 to 100).
    pub fn report_progress(&self, percentage: u8) {
        if let Some(ref progress) = self.progress {
            if let Ok(mut progress) = progress.lock() {
                progress.step(percentage);
            }
        }
    }

    /// Checks foreign keys and dependent object names.
    ///
    /// Returns one message per finding.
    pub async fn verify(&mut self) -> Result<Vec<String>> {
        let mut violations = Vec::new();

        let fk_rows: Vec<(String, Option<i64>, String, i64)> =
            sqlx::query_as("PRAGMA foreign_key_check")
                .fetch_all(&mut *self.tx)
                .await?;
        for (table, rowid, parent, _) in fk_rows {
            let row = rowid.map_or_else(|| "?".to_string(), |r| r.to_string());
            violations.push(format!(
                "row {row} of table '{table}' references a missing row in '{parent}'"
            ));
        }

        let objects: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT type, name, tbl_name FROM sqlite_master WHERE type IN ('index', 'trigger')",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        for (kind, name, table) in objects {
            let Some(kind) = ObjectKind::from_master_type(&kind) else {
                continue;
            };
            if naming::is_internal(&name) {
                continue;
            }
            if let Err(err) = ConventionalName::parse(kind, &table, &name) {
                violations.push(err.to_string());
            }
        }

        Ok(violations)
    }

    pub(crate) async fn record_applied(
        &mut self,
        history: &MigrationHistory,
        version: i64,
        name: &str,
    ) -> Result<()> {
        if self.config.dry_run {
            return Ok(());
        }
        history.record_applied(&mut *self.tx, version, name).await
    }

    pub(crate) async fn record_unapplied(
        &mut self,
        history: &MigrationHistory,
        version: i64,
    ) -> Result<()> {
        if self.config.dry_run {
            return Ok(());
        }
        if !history.record_unapplied(&mut *self.tx, version).await? {
            warn!(version, "No marker recorded for version");
        }
        Ok(())
    }

    /// Commits the transaction. In dry-run mode it is rolled back instead.
    pub async fn commit(self) -> Result<()> {
        if self.config.dry_run {
            self.tx.rollback().await?;
        } else {
            self.tx.commit().await?;
        }
        Ok(())
    }

    /// Rolls the transaction back.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::schema::SqlType;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn begin(pool: &SqlitePool, config: MigratorConfig) -> SchemaTx {
        SchemaTx::begin(pool, Arc::new(SqliteDialect::new()), Arc::new(config))
            .await
            .unwrap()
    }

    fn orders_columns() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("id", SqlType::Integer).primary_key(),
            ColumnSchema::new("customer_id", SqlType::Integer).not_null(),
        ]
    }

    #[tokio::test]
    async fn test_add_table_and_inspect() {
        let pool = create_test_pool().await;
        let mut tx = begin(&pool, MigratorConfig::default()).await;

        tx.add_table("orders", &orders_columns(), &[]).await.unwrap();
        assert!(tx.table_exists("orders").await.unwrap());
        assert!(tx.table_exists("ORDERS").await.unwrap());
        assert!(tx.column_exists("orders", "customer_id").await.unwrap());
        assert!(!tx.column_exists("orders", "total").await.unwrap());

        let def = tx.table_definition("orders").await.unwrap().unwrap();
        assert_eq!(def.column_names(), vec!["id", "customer_id"]);
        assert!(tx.table_definition("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncommitted_scope_rolls_back() {
        let pool = create_test_pool().await;
        {
            let mut tx = begin(&pool, MigratorConfig::default()).await;
            tx.add_table("orders", &orders_columns(), &[]).await.unwrap();
        }

        let mut tx = begin(&pool, MigratorConfig::default()).await;
        assert!(!tx.table_exists("orders").await.unwrap());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_suppresses_mutations() {
        let pool = create_test_pool().await;
        let mut tx = begin(&pool, MigratorConfig::default().dry_run(true)).await;
        tx.add_table("orders", &orders_columns(), &[]).await.unwrap();
        assert!(!tx.table_exists("orders").await.unwrap());

        let rows = tx.query("SELECT 1 AS one").await.unwrap();
        assert_eq!(rows[0].get::<i64, _>("one"), 1);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_conventional_index_and_trigger() {
        let pool = create_test_pool().await;
        let mut tx = begin(&pool, MigratorConfig::default()).await;
        tx.add_table("orders", &orders_columns(), &[]).await.unwrap();
        tx.execute("CREATE TABLE audit (ref INTEGER)").await.unwrap();

        let index = tx
            .add_index("orders", &["customer_id"], false, None)
            .await
            .unwrap();
        assert_eq!(index.to_string(), "IN_orders_customer_id");

        let trigger = tx
            .add_trigger(
                "orders",
                "audit",
                "AFTER INSERT",
                "INSERT INTO audit (ref) VALUES (NEW.id);",
            )
            .await
            .unwrap();
        assert_eq!(trigger.to_string(), "TR_orders_audit");

        tx.execute("INSERT INTO orders (id, customer_id) VALUES (1, 5)")
            .await
            .unwrap();
        let rows = tx.query("SELECT ref FROM audit").await.unwrap();
        assert_eq!(rows.len(), 1);

        assert!(tx.verify().await.unwrap().is_empty());
        tx.remove_trigger("TR_orders_audit").await.unwrap();
        tx.remove_index("IN_orders_customer_id").await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_native_add_column() {
        let pool = create_test_pool().await;
        let mut tx = begin(&pool, MigratorConfig::default()).await;
        tx.add_table("orders", &orders_columns(), &[]).await.unwrap();

        let note = ColumnSchema::new("note", SqlType::Text);
        tx.add_column("orders", &note).await.unwrap();
        assert!(tx.column_exists("orders", "note").await.unwrap());

        let err = tx.add_column("orders", &note).await.unwrap_err();
        assert!(matches!(err, MigrateError::ColumnExists { .. }));

        // additive on an absent table is a no-op
        tx.add_column("missing", &note).await.unwrap();
    }

    #[tokio::test]
    async fn test_native_rename_column_renames_index() {
        let pool = create_test_pool().await;
        let config = MigratorConfig::default().native_rename_column(true);
        let mut tx = begin(&pool, config).await;
        tx.add_table("orders", &orders_columns(), &[]).await.unwrap();
        tx.add_index("orders", &["customer_id"], false, None)
            .await
            .unwrap();

        tx.rename_column("orders", "customer_id", "client_id")
            .await
            .unwrap();

        assert!(tx.column_exists("orders", "client_id").await.unwrap());
        let names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'index'")
                .fetch_all(tx.connection())
                .await
                .unwrap();
        assert_eq!(names, vec![("IN_orders_client_id".to_string(),)]);
    }

    #[tokio::test]
    async fn test_verify_reports_unconventional_names() {
        let pool = create_test_pool().await;
        let mut tx = begin(&pool, MigratorConfig::default()).await;
        tx.add_table("orders", &orders_columns(), &[]).await.unwrap();
        tx.execute("CREATE INDEX idx1 ON orders (customer_id)")
            .await
            .unwrap();

        let violations = tx.verify().await.unwrap();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("idx1"));
    }
}
