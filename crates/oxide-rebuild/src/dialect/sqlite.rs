//! SQLite dialect for migrations.
//!
//! SQLite cannot alter a column's type or constraints, drop a column that
//! carries constraints, or add a foreign key after creation. Those
//! operations go through the table rebuilder; this dialect only describes
//! what SQLite can do natively.

use crate::schema::{ColumnSchema, DefaultValue, SqlType};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Splits `VARCHAR(255)` into `("VARCHAR", ["255"])`.
fn split_type(type_name: &str) -> (String, Vec<usize>) {
    let upper = type_name.trim().to_ascii_uppercase();
    match upper.split_once('(') {
        Some((base, rest)) => {
            let args = rest
                .trim_end_matches(')')
                .split(',')
                .filter_map(|a| a.trim().parse().ok())
                .collect();
            (base.trim().to_string(), args)
        }
        None => (upper, Vec::new()),
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        sql_type.affinity().keyword().to_string()
    }

    fn resolve_type(&self, type_name: &str) -> Option<SqlType> {
        let (base, args) = split_type(type_name);
        let arg = |i: usize| args.get(i).copied();

        let resolved = match base.as_str() {
            "INTEGER" | "INT" | "MEDIUMINT" => SqlType::Integer,
            "BIGINT" | "INT8" => SqlType::BigInt,
            "SMALLINT" | "TINYINT" | "INT2" => SqlType::SmallInt,
            "TEXT" | "CLOB" => SqlType::Text,
            "VARCHAR" | "NVARCHAR" => SqlType::Varchar(arg(0)?),
            "CHAR" | "NCHAR" => SqlType::Char(arg(0)?),
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "DATETIME" => SqlType::DateTime,
            "DATE" => SqlType::Date,
            "TIME" => SqlType::Time,
            "TIMESTAMP" => SqlType::Timestamp,
            "REAL" | "FLOAT" => SqlType::Real,
            "DOUBLE" | "DOUBLE PRECISION" => SqlType::Double,
            "DECIMAL" | "NUMERIC" => match (arg(0), arg(1)) {
                (Some(p), s) => SqlType::Decimal(
                    u8::try_from(p).ok()?,
                    u8::try_from(s.unwrap_or(0)).ok()?,
                ),
                (None, _) => SqlType::Numeric,
            },
            "BLOB" => SqlType::Blob,
            "JSON" => SqlType::Json,
            "UUID" => SqlType::Uuid,
            _ => return None,
        };
        Some(resolved)
    }

    fn supports_rename_column(&self) -> bool {
        // SQLite 3.25.0+
        true
    }

    fn can_add_column(&self, column: &ColumnSchema) -> bool {
        !column.primary_key
            && !column.unique
            && column.default.as_ref().map_or(true, DefaultValue::is_constant)
            && (column.nullable || column.fills_existing_rows())
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }
}
