//! Dependent object migrator.
//!
//! Moves the indexes and triggers owned by a table onto another table
//! (normally the temporary copy a rebuild creates), renaming them when a
//! column rename is in progress. Triggers on other tables that mention the
//! table by name are rewritten as well, so they stay valid across the swap.
//!
//! Work is split in two phases: [`prepare`] reads the schema and computes
//! every rewrite, failing on a naming convention violation before anything
//! has been mutated; [`DependentsPlan::apply`] then drops and recreates.
//!
//! A table rebuild applies the plan around the swap instead:
//! [`DependentsPlan::detach`] runs before the original table is dropped and
//! only drops the table's own triggers, and [`DependentsPlan::reattach`]
//! recreates them once the rebuilt table has its name back. A trigger whose
//! body mentions its own table cannot live on the temporary table through
//! the rename, because SQLite checks every trigger body when a table is
//! renamed.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::lexer::{self, Occurrences};
use crate::naming::{ConventionalName, ObjectKind};
use crate::provider::SchemaTx;

const OWNED_SQL: &str = "SELECT type, name, tbl_name, sql FROM sqlite_master \
     WHERE type IN ('index', 'trigger') AND tbl_name = ? COLLATE NOCASE AND sql IS NOT NULL \
     ORDER BY type, name";

const FOREIGN_TRIGGERS_SQL: &str = "SELECT type, name, tbl_name, sql FROM sqlite_master \
     WHERE type = 'trigger' AND tbl_name <> ? COLLATE NOCASE AND sql IS NOT NULL \
     ORDER BY name";

/// An index or trigger as stored in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentObject {
    /// Index or trigger.
    pub kind: ObjectKind,
    /// Object name.
    pub name: String,
    /// Table the object is attached to.
    pub table: String,
    /// Full `CREATE` statement.
    pub sql: String,
}

impl DependentObject {
    fn from_row((kind, name, table, sql): (String, String, String, String)) -> Option<Self> {
        Some(Self {
            kind: ObjectKind::from_master_type(&kind)?,
            name,
            table,
            sql,
        })
    }
}

/// A column rename in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRename {
    /// Current column name.
    pub from: String,
    /// New column name.
    pub to: String,
}

impl ColumnRename {
    /// Creates a column rename.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Drop-and-recreate of one dependent object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Index or trigger.
    pub kind: ObjectKind,
    /// Name of the object to drop.
    pub drop_name: String,
    /// Name the recreated object will have.
    pub name: String,
    /// Statement recreating it.
    pub create_sql: String,
    /// For a trigger owned by the moved table: the statement recreating it
    /// on the original table name, used by [`DependentsPlan::reattach`].
    pub reattach_sql: Option<String>,
}

impl Rewrite {
    /// Plans the move of an object owned by `orig` onto `new`.
    ///
    /// Triggers only get their first mention of `orig` replaced (the table
    /// they fire on). Their SQL before that replacement is kept as
    /// `reattach_sql` for a rebuild, which recreates them after the swap.
    pub fn owned(
        object: &DependentObject,
        orig: &str,
        new: &str,
        rename: Option<&ColumnRename>,
    ) -> Result<Self> {
        let mut sql = object.sql.clone();
        let mut name = object.name.clone();

        if let Some(rename) = rename {
            if lexer::mentions_identifier(&sql, &rename.from) {
                let renamed = ConventionalName::parse(object.kind, orig, &object.name)?
                    .with_column_renamed(&rename.from, &rename.to)?
                    .to_string();
                sql = lexer::replace_identifier(&sql, &object.name, &renamed, Occurrences::All);
                sql = lexer::replace_identifier(&sql, &rename.from, &rename.to, Occurrences::All);
                name = renamed;
            }
        }

        let occurrences = match object.kind {
            ObjectKind::Index => Occurrences::All,
            ObjectKind::Trigger => Occurrences::First,
        };
        let create_sql = if orig == new {
            sql.clone()
        } else {
            lexer::replace_identifier(&sql, orig, new, occurrences)
        };
        let reattach_sql = (object.kind == ObjectKind::Trigger && orig != new).then_some(sql);

        Ok(Self {
            kind: object.kind,
            drop_name: object.name.clone(),
            name,
            create_sql,
            reattach_sql,
        })
    }

    /// Plans the rewrite of a trigger on another table that mentions `orig`.
    ///
    /// Every mention of `orig` is replaced. When a column rename is in
    /// progress, mentions of the column that belong to `orig` are renamed
    /// too; `NEW.`/`OLD.` references to the trigger's own row are kept.
    #[must_use]
    pub fn referencing(
        object: &DependentObject,
        orig: &str,
        new: &str,
        rename: Option<&ColumnRename>,
    ) -> Self {
        let sql = match rename {
            Some(rename) => lexer::replace_column(&object.sql, orig, &rename.from, &rename.to),
            None => object.sql.clone(),
        };
        Self {
            kind: object.kind,
            drop_name: object.name.clone(),
            name: object.name.clone(),
            create_sql: lexer::replace_identifier(&sql, orig, new, Occurrences::All),
            reattach_sql: None,
        }
    }
}

/// Every rewrite needed to relocate a table's dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependentsPlan {
    rewrites: Vec<Rewrite>,
}

impl DependentsPlan {
    /// Planned rewrites, owned objects first.
    #[must_use]
    pub fn rewrites(&self) -> &[Rewrite] {
        &self.rewrites
    }

    /// Returns true if there is nothing to rewrite.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }

    /// Drops and recreates every planned object.
    pub async fn apply(&self, tx: &mut SchemaTx) -> Result<()> {
        for rewrite in &self.rewrites {
            debug!(
                kind = %rewrite.kind,
                from = %rewrite.drop_name,
                to = %rewrite.name,
                "Recreating dependent object"
            );
            let drop_sql = tx.dialect().drop_object_sql(rewrite.kind, &rewrite.drop_name);
            tx.execute(&drop_sql).await?;
            tx.execute(&rewrite.create_sql).await?;
        }
        Ok(())
    }

    /// Drops every planned object and recreates all but the triggers owned
    /// by the moved table, which wait for [`DependentsPlan::reattach`].
    pub async fn detach(&self, tx: &mut SchemaTx) -> Result<()> {
        for rewrite in &self.rewrites {
            let drop_sql = tx.dialect().drop_object_sql(rewrite.kind, &rewrite.drop_name);
            tx.execute(&drop_sql).await?;
            if rewrite.reattach_sql.is_none() {
                debug!(
                    kind = %rewrite.kind,
                    from = %rewrite.drop_name,
                    to = %rewrite.name,
                    "Recreating dependent object"
                );
                tx.execute(&rewrite.create_sql).await?;
            }
        }
        Ok(())
    }

    /// Recreates the owned triggers dropped by [`DependentsPlan::detach`].
    pub async fn reattach(&self, tx: &mut SchemaTx) -> Result<()> {
        for rewrite in &self.rewrites {
            if let Some(sql) = &rewrite.reattach_sql {
                debug!(trigger = %rewrite.name, "Reattaching trigger");
                tx.execute(sql).await?;
            }
        }
        Ok(())
    }
}

/// Lists the indexes and triggers attached to `table`.
///
/// Indexes SQLite creates for inline constraints have no stored SQL and are
/// left out; they follow the table definition.
pub async fn owned_objects(tx: &mut SchemaTx, table: &str) -> Result<Vec<DependentObject>> {
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(OWNED_SQL)
        .bind(table)
        .fetch_all(tx.connection())
        .await?;
    Ok(rows.into_iter().filter_map(DependentObject::from_row).collect())
}

/// Lists triggers on other tables whose SQL mentions `table`.
pub async fn referencing_triggers(
    tx: &mut SchemaTx,
    table: &str,
) -> Result<Vec<DependentObject>> {
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(FOREIGN_TRIGGERS_SQL)
        .bind(table)
        .fetch_all(tx.connection())
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(DependentObject::from_row)
        .filter(|object| lexer::mentions_identifier(&object.sql, table))
        .collect())
}

/// Reads and validates everything needed to move `orig`'s dependents to `new`.
pub async fn prepare(
    tx: &mut SchemaTx,
    orig: &str,
    new: &str,
    rename: Option<&ColumnRename>,
) -> Result<DependentsPlan> {
    let mut rewrites = Vec::new();
    for object in owned_objects(tx, orig).await? {
        rewrites.push(Rewrite::owned(&object, orig, new, rename)?);
    }
    if !orig.eq_ignore_ascii_case(new) {
        for object in referencing_triggers(tx, orig).await? {
            rewrites.push(Rewrite::referencing(&object, orig, new, rename));
        }
    }
    Ok(DependentsPlan { rewrites })
}

/// Fails if an index or trigger of `table` mentions `column`.
///
/// Checked before a column is removed, since the object could not be
/// recreated on the rebuilt table.
pub async fn ensure_unused(tx: &mut SchemaTx, table: &str, column: &str) -> Result<()> {
    let used_by = owned_objects(tx, table)
        .await?
        .into_iter()
        .find(|object| lexer::mentions_identifier(&object.sql, column));
    match used_by {
        Some(object) => Err(MigrateError::ColumnInUse {
            table: table.to_string(),
            column: column.to_string(),
            object: format!("{} '{}'", object.kind, object.name),
        }),
        None => Ok(()),
    }
}

/// Moves `orig`'s dependents to `new` in one go.
pub async fn migrate(
    tx: &mut SchemaTx,
    orig: &str,
    new: &str,
    rename: Option<&ColumnRename>,
) -> Result<()> {
    let plan = prepare(tx, orig, new, rename).await?;
    plan.apply(tx).await
}

/// Renames conventional dependents of a table that was renamed from
/// `old_table` to `new_table`, so their names keep embedding the owner.
///
/// Objects whose names do not follow the convention keep their names.
pub async fn rebind_names(tx: &mut SchemaTx, old_table: &str, new_table: &str) -> Result<()> {
    let mut rewrites = Vec::new();
    for object in owned_objects(tx, new_table).await? {
        let Ok(current) = ConventionalName::parse(object.kind, old_table, &object.name) else {
            warn!(
                kind = %object.kind,
                name = %object.name,
                table = %new_table,
                "Name does not follow the naming convention, keeping it"
            );
            continue;
        };
        let name = current.with_table(new_table).to_string();
        rewrites.push(Rewrite {
            kind: object.kind,
            drop_name: object.name.clone(),
            create_sql: lexer::replace_identifier(&object.sql, &object.name, &name, Occurrences::All),
            name,
            reattach_sql: None,
        });
    }
    DependentsPlan { rewrites }.apply(tx).await
}
