//! Database dialect implementations.
//!
//! A dialect maps column properties to SQL text, resolves type names read
//! back from the live schema, and says which ALTER statements the engine
//! can run natively. Anything it cannot run natively is synthesized by the
//! [table rebuilder](crate::rebuild).

mod sqlite;

pub use sqlite::SqliteDialect;

use crate::naming::ObjectKind;
use crate::schema::{ColumnSchema, ForeignKeySchema, SqlType};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Resolves a type token read from a stored definition.
    fn resolve_type(&self, type_name: &str) -> Option<SqlType>;

    /// Returns whether this dialect supports `ALTER TABLE … RENAME COLUMN`.
    fn supports_rename_column(&self) -> bool;

    /// Returns whether `ALTER TABLE … ADD COLUMN` accepts this column.
    fn can_add_column(&self, column: &ColumnSchema) -> bool;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnSchema) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }

        if let Some(ref check) = column.check {
            parts.push(format!("CHECK ({check})"));
        }

        parts.join(" ")
    }

    /// Generates the parenthesized column list of a `CREATE TABLE`.
    ///
    /// A primary key over more than one column is emitted as a trailing
    /// `PRIMARY KEY (…)` clause instead of inline.
    fn column_list_sql(&self, columns: &[ColumnSchema], primary_key: &[String]) -> String {
        let composite = primary_key.len() > 1
            || primary_key
                .iter()
                .any(|pk| !columns.iter().any(|c| &c.name == pk && c.primary_key));

        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| {
                if composite && c.primary_key {
                    let mut inline = c.clone();
                    inline.primary_key = false;
                    inline.auto_increment = false;
                    self.column_definition(&inline)
                } else {
                    self.column_definition(c)
                }
            })
            .collect();

        if composite && !primary_key.is_empty() {
            let quoted: Vec<String> = primary_key
                .iter()
                .map(|c| self.quote_identifier(c))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }

        format!("(\n  {}\n)", defs.join(",\n  "))
    }

    /// Generates `CREATE TABLE` from a prepared column list.
    fn create_table_sql(&self, name: &str, column_list_sql: &str, if_not_exists: bool) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(name));
        sql.push(' ');
        sql.push_str(column_list_sql);
        sql
    }

    /// Generates SQL for dropping a table.
    fn drop_table_sql(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(name))
    }

    /// Generates SQL for renaming a table.
    fn rename_table_sql(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for adding a column natively.
    fn add_column_sql(&self, table: &str, column: &ColumnSchema) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        )
    }

    /// Generates SQL for renaming a column natively.
    fn rename_column_sql(&self, table: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(
        &self,
        name: &str,
        table: &str,
        columns: &[String],
        unique: bool,
        condition: Option<&str>,
    ) -> String {
        let mut sql = String::from("CREATE ");
        if unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        sql.push_str(&quoted.join(", "));
        sql.push(')');

        if let Some(cond) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(cond);
        }

        sql
    }

    /// Generates SQL for creating a trigger; `event` is e.g. `AFTER INSERT`.
    fn create_trigger_sql(&self, name: &str, table: &str, event: &str, body: &str) -> String {
        format!(
            "CREATE TRIGGER {} {} ON {} FOR EACH ROW BEGIN {} END",
            self.quote_identifier(name),
            event,
            self.quote_identifier(table),
            body.trim()
        )
    }

    /// Generates SQL for dropping an index or trigger.
    fn drop_object_sql(&self, kind: ObjectKind, name: &str) -> String {
        format!("DROP {} {}", kind.keyword(), self.quote_identifier(name))
    }

    /// Generates the constraint suffix a foreign key adds to its column.
    ///
    /// Removal matches this exact text, so both sides must build it here.
    fn foreign_key_clause(&self, fk: &ForeignKeySchema) -> String {
        format!(
            " CONSTRAINT {} REFERENCES {}({}) ON UPDATE {} ON DELETE {}",
            self.quote_identifier(&fk.name),
            self.quote_identifier(&fk.references_table),
            self.quote_identifier(&fk.references_column),
            fk.on_update,
            fk.on_delete
        )
    }
}
