//! Table rebuilder.
//!
//! SQLite cannot drop a constrained column, retype a column or add a
//! foreign key in place. The rebuilder synthesizes those changes:
//!
//! 1. read and parse the stored definition
//! 2. transform the column list
//! 3. create `<table>_temp` with the new list
//! 4. copy every row across
//! 5. move indexes and triggers onto the temporary table
//! 6. drop the original table
//! 7. rename the temporary table back
//! 8. recreate the table's own triggers
//!
//! Everything runs inside the caller's [`SchemaTx`], so a failure at any
//! point is undone by the step's rollback. Dependent objects are read and
//! validated before the first mutating statement.

use tracing::{info, warn};

use crate::dependents::{self, ColumnRename};
use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::lexer::{self, Occurrences};
use crate::parser::{ColumnDefinition, TableDefinition};
use crate::provider::SchemaTx;
use crate::schema::{ColumnSchema, ForeignKeySchema};

/// A structural change applied by reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildOp {
    /// Append a column.
    AddColumn(ColumnSchema),
    /// Drop a column.
    RemoveColumn(String),
    /// Rename a column.
    RenameColumn(ColumnRename),
    /// Replace a column's definition, keeping its named constraints.
    ChangeColumn(ColumnSchema),
    /// Attach a foreign key to its column.
    AddForeignKey(ForeignKeySchema),
    /// Strip a foreign key from its column.
    RemoveForeignKey {
        /// Foreign key as it was added.
        foreign_key: ForeignKeySchema,
        /// Fail instead of skipping when it is not found.
        strict: bool,
    },
}

impl RebuildOp {
    /// Additive operations are skipped when the table does not exist.
    #[must_use]
    pub fn is_additive(&self) -> bool {
        matches!(self, Self::AddColumn(_) | Self::AddForeignKey(_))
    }

    /// The column rename this operation performs, if any.
    #[must_use]
    pub fn column_rename(&self) -> Option<&ColumnRename> {
        match self {
            Self::RenameColumn(rename) => Some(rename),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::AddColumn(column) => format!("add column '{}'", column.name),
            Self::RemoveColumn(name) => format!("remove column '{name}'"),
            Self::RenameColumn(rename) => {
                format!("rename column '{}' to '{}'", rename.from, rename.to)
            }
            Self::ChangeColumn(column) => format!("change column '{}'", column.name),
            Self::AddForeignKey(fk) => format!("add foreign key '{}'", fk.name),
            Self::RemoveForeignKey { foreign_key, .. } => {
                format!("remove foreign key '{}'", foreign_key.name)
            }
        }
    }
}

/// Result of transforming a table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// The new definition.
    pub definition: TableDefinition,
    /// `(source, target)` column pairs copied from the old table.
    pub copy: Vec<(String, String)>,
}

/// Applies `op` to a parsed definition.
///
/// Returns `Ok(None)` when there is nothing to do (a non-strict foreign key
/// removal that found no match).
pub fn transform(
    current: &TableDefinition,
    op: &RebuildOp,
    dialect: &dyn MigrationDialect,
) -> Result<Option<Transformed>> {
    let table = current.name.as_str();
    let mut definition = current.clone();
    let mut copy: Vec<(String, String)> = current
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.name.clone()))
        .collect();

    match op {
        RebuildOp::AddColumn(column) => {
            if current.column(&column.name).is_some() {
                return Err(MigrateError::ColumnExists {
                    table: table.to_string(),
                    column: column.name.clone(),
                });
            }
            definition
                .columns
                .push(generated(table, &dialect.column_definition(column))?);
        }

        RebuildOp::RemoveColumn(name) => {
            let index = find(current, name)?;
            if current.columns.len() == 1 {
                return Err(MigrateError::Unsupported(format!(
                    "cannot remove '{name}', the only column of table '{table}'"
                )));
            }
            if current
                .primary_key
                .as_deref()
                .is_some_and(|pk| lexer::mentions_identifier(pk, name))
            {
                return Err(MigrateError::Unsupported(format!(
                    "cannot remove '{name}', part of the primary key of table '{table}'"
                )));
            }
            definition.columns.remove(index);
            copy.remove(index);
        }

        RebuildOp::RenameColumn(rename) => {
            let index = find(current, &rename.from)?;
            if current.column_index(&rename.to).is_some_and(|other| other != index) {
                return Err(MigrateError::ColumnExists {
                    table: table.to_string(),
                    column: rename.to.clone(),
                });
            }
            let rewrite =
                |sql: &str| lexer::replace_identifier(sql, &rename.from, &rename.to, Occurrences::All);
            definition.columns = current
                .columns
                .iter()
                .map(|c| generated(table, &rewrite(&c.sql)))
                .collect::<Result<_>>()?;
            definition.primary_key = current.primary_key.as_deref().map(rewrite);
            definition.constraints = current.constraints.iter().map(|c| rewrite(c)).collect();
            copy[index].1 = definition.columns[index].name.clone();
        }

        RebuildOp::ChangeColumn(column) => {
            let index = find(current, &column.name)?;
            let mut sql = dialect.column_definition(column);
            if let Some(suffix) = current.columns[index].constraint_suffix() {
                sql.push(' ');
                sql.push_str(suffix);
            }
            definition.columns[index] = generated(table, &sql)?;
        }

        RebuildOp::AddForeignKey(fk) => {
            let index = find(current, &fk.column)?;
            let sql = format!(
                "{}{}",
                current.columns[index].sql,
                dialect.foreign_key_clause(fk)
            );
            definition.columns[index] = generated(table, &sql)?;
        }

        RebuildOp::RemoveForeignKey {
            foreign_key,
            strict,
        } => {
            let suffix = dialect.foreign_key_clause(foreign_key);
            let matches: usize = current
                .columns
                .iter()
                .map(|c| c.sql.matches(suffix.as_str()).count())
                .sum();
            match matches {
                0 if *strict => {
                    return Err(MigrateError::ForeignKeyNotFound {
                        table: table.to_string(),
                        constraint: foreign_key.name.clone(),
                    });
                }
                0 => {
                    warn!(
                        table = %table,
                        constraint = %foreign_key.name,
                        "Foreign key not found, nothing to remove"
                    );
                    return Ok(None);
                }
                1 => {
                    for column in &mut definition.columns {
                        if column.sql.contains(suffix.as_str()) {
                            *column = generated(table, &column.sql.replacen(suffix.as_str(), "", 1))?;
                        }
                    }
                }
                matches => {
                    return Err(MigrateError::AmbiguousForeignKeyRemoval {
                        table: table.to_string(),
                        constraint: foreign_key.name.clone(),
                        matches,
                    });
                }
            }
        }
    }

    Ok(Some(Transformed { definition, copy }))
}

fn find(definition: &TableDefinition, column: &str) -> Result<usize> {
    definition
        .column_index(column)
        .ok_or_else(|| MigrateError::ColumnNotFound {
            table: definition.name.clone(),
            column: column.to_string(),
        })
}

fn generated(table: &str, sql: &str) -> Result<ColumnDefinition> {
    ColumnDefinition::parse(sql).ok_or_else(|| {
        MigrateError::parse_shape(table, format!("cannot read generated column '{sql}'"))
    })
}

/// Builds the statement copying rows from `table` into `temp`.
#[must_use]
pub fn copy_sql(
    dialect: &dyn MigrationDialect,
    table: &str,
    temp: &str,
    copy: &[(String, String)],
) -> String {
    let targets: Vec<String> = copy.iter().map(|(_, t)| dialect.quote_identifier(t)).collect();
    let sources: Vec<String> = copy
        .iter()
        .map(|(s, t)| {
            if s == t {
                dialect.quote_identifier(s)
            } else {
                format!("{} AS {}", dialect.quote_identifier(s), dialect.quote_identifier(t))
            }
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        dialect.quote_identifier(temp),
        targets.join(", "),
        sources.join(", "),
        dialect.quote_identifier(table)
    )
}

/// Applies `op` to `table` by reconstruction.
pub async fn rebuild(tx: &mut SchemaTx, table: &str, op: &RebuildOp) -> Result<()> {
    let Some(current) = tx.table_definition(table).await? else {
        if op.is_additive() || tx.is_dry_run() {
            warn!(table = %table, operation = %op.describe(), "Table does not exist, skipping");
            return Ok(());
        }
        return Err(MigrateError::TableNotFound(table.to_string()));
    };

    let Some(transformed) = transform(&current, op, tx.dialect())? else {
        return Ok(());
    };

    let table = current.name.as_str();
    let temp = tx.config().temp_table(table);
    info!(table = %table, operation = %op.describe(), "Rebuilding table");

    if let RebuildOp::RemoveColumn(column) = op {
        dependents::ensure_unused(tx, table, column).await?;
    }
    let plan = dependents::prepare(tx, table, &temp, op.column_rename()).await?;

    if tx.table_exists(&temp).await? {
        warn!(table = %temp, "Temporary table already exists, reusing it");
    } else {
        tx.add_table_sql(&temp, &transformed.definition.column_list_sql())
            .await?;
    }

    let copy = copy_sql(tx.dialect(), table, &temp, &transformed.copy);
    tx.execute(&copy).await?;

    plan.detach(tx).await?;
    tx.remove_table(table).await?;
    tx.rename_table(&temp, table).await?;
    plan.reattach(tx).await?;

    info!(
        table = %table,
        dependents = plan.rewrites().len(),
        "Table rebuilt"
    );
    Ok(())
}
