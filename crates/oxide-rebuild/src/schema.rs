//! Column and foreign key descriptions.
//!
//! Migrations state what a column should look like with [`ColumnSchema`];
//! the dialect renders it into the definition text that ends up in
//! `sqlite_master`, and the parser reads that text back when a table is
//! rebuilt. Only what SQLite can store in a column definition is modelled.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a column.
///
/// SQLite stores every value under one of five affinities; the richer
/// variants only survive as the type name written into the definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// `INTEGER`, the rowid alias when used as a single-column key.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// `TEXT`.
    Text,
    /// Length-limited string; SQLite does not enforce the limit.
    Varchar(usize),
    /// Fixed-length string; SQLite does not pad.
    Char(usize),
    /// Stored as 0 or 1.
    Boolean,
    /// ISO-8601 date and time, stored as text.
    DateTime,
    /// ISO-8601 date, stored as text.
    Date,
    /// ISO-8601 time, stored as text.
    Time,
    /// ISO-8601 timestamp, stored as text.
    Timestamp,
    /// 8-byte float.
    Real,
    /// 8-byte float.
    Double,
    /// Precision and scale, kept for documentation only.
    Decimal(u8, u8),
    /// Numeric affinity without declared precision.
    Numeric,
    /// Raw bytes.
    Blob,
    /// JSON document, stored as text.
    Json,
    /// UUID in its textual form.
    Uuid,
}

impl SqlType {
    /// Storage affinity SQLite assigns to this type.
    #[must_use]
    pub const fn affinity(&self) -> Affinity {
        match self {
            Self::Integer | Self::BigInt | Self::SmallInt | Self::Boolean => Affinity::Integer,
            Self::Text
            | Self::Varchar(_)
            | Self::Char(_)
            | Self::DateTime
            | Self::Date
            | Self::Time
            | Self::Timestamp
            | Self::Json
            | Self::Uuid => Affinity::Text,
            Self::Real | Self::Double => Affinity::Real,
            Self::Decimal(_, _) | Self::Numeric => Affinity::Numeric,
            Self::Blob => Affinity::Blob,
        }
    }
}

/// SQLite column affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affinity {
    /// `INTEGER`
    Integer,
    /// `TEXT`
    Text,
    /// `REAL`
    Real,
    /// `NUMERIC`
    Numeric,
    /// `BLOB`
    Blob,
}

impl Affinity {
    /// Type name written into generated definitions.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Real => "REAL",
            Self::Numeric => "NUMERIC",
            Self::Blob => "BLOB",
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A column's `DEFAULT` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// `DEFAULT NULL`
    Null,
    /// Stored as 0 or 1.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal, quoted on output.
    String(String),
    /// Expression such as `CURRENT_TIMESTAMP`, parenthesized on output.
    Expression(String),
}

impl DefaultValue {
    /// Text following `DEFAULT`.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => u8::from(*b).to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => format!("({expr})"),
        }
    }

    /// Returns true for literals. `ALTER TABLE … ADD COLUMN` rejects
    /// expression defaults.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        !matches!(self, Self::Expression(_))
    }
}

/// `ON DELETE` / `ON UPDATE` action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForeignKeyAction {
    /// Checked when the statement ends.
    #[default]
    NoAction,
    /// Checked immediately.
    Restrict,
    /// Referencing rows follow the referenced row.
    Cascade,
    /// Referencing column becomes NULL.
    SetNull,
    /// Referencing column takes its default.
    SetDefault,
}

impl ForeignKeyAction {
    /// Keyword written into the constraint clause.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Desired shape of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub sql_type: SqlType,
    /// False renders `NOT NULL`.
    pub nullable: bool,
    /// `DEFAULT` clause, if any.
    pub default: Option<DefaultValue>,
    /// Inline `PRIMARY KEY`; part of a composite key when the table lists
    /// more than one key column.
    pub primary_key: bool,
    /// `AUTOINCREMENT`, only honored on an inline integer key.
    pub auto_increment: bool,
    /// Inline `UNIQUE`.
    pub unique: bool,
    /// `CHECK` expression.
    pub check: Option<String>,
}

impl ColumnSchema {
    /// A nullable column without constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            check: None,
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the column as (part of) the primary key, which implies NOT NULL.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    /// Returns true if existing rows get a non-NULL value when the column
    /// is added, which `NOT NULL` requires.
    #[must_use]
    pub fn fills_existing_rows(&self) -> bool {
        self.default
            .as_ref()
            .is_some_and(|d| *d != DefaultValue::Null)
    }
}

/// A named foreign key on a single column.
///
/// It is rendered as a constraint suffix on the referencing column's
/// definition, and removed again by matching that exact suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    /// Constraint name.
    pub name: String,
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub references_table: String,
    /// Referenced column.
    pub references_column: String,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKeySchema {
    /// Creates a foreign key from `column` to `references_table(references_column)`
    /// with `NO ACTION` on both events.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_implies_not_null() {
        let col = ColumnSchema::new("id", SqlType::BigInt)
            .primary_key()
            .auto_increment();

        assert!(col.primary_key);
        assert!(col.auto_increment);
        assert!(!col.nullable);
    }

    #[test]
    fn test_affinity() {
        assert_eq!(SqlType::Boolean.affinity(), Affinity::Integer);
        assert_eq!(SqlType::Varchar(40).affinity(), Affinity::Text);
        assert_eq!(SqlType::Timestamp.affinity(), Affinity::Text);
        assert_eq!(SqlType::Double.affinity(), Affinity::Real);
        assert_eq!(SqlType::Decimal(10, 2).affinity(), Affinity::Numeric);
        assert_eq!(SqlType::Blob.affinity().to_string(), "BLOB");
    }

    #[test]
    fn test_default_value_to_sql() {
        assert_eq!(DefaultValue::Null.to_sql(), "NULL");
        assert_eq!(DefaultValue::Bool(true).to_sql(), "1");
        assert_eq!(DefaultValue::Integer(42).to_sql(), "42");
        assert_eq!(DefaultValue::String("it's".to_string()).to_sql(), "'it''s'");
        assert_eq!(
            DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()).to_sql(),
            "(CURRENT_TIMESTAMP)"
        );
        assert!(!DefaultValue::Expression("CURRENT_TIMESTAMP".to_string()).is_constant());
    }

    #[test]
    fn test_fills_existing_rows() {
        let qty = ColumnSchema::new("qty", SqlType::Integer).not_null();
        assert!(!qty.fills_existing_rows());
        assert!(!qty.clone().default(DefaultValue::Null).fills_existing_rows());
        assert!(qty.default(DefaultValue::Integer(0)).fills_existing_rows());
    }

    #[test]
    fn test_foreign_key_defaults_to_no_action() {
        let fk = ForeignKeySchema::new("fk_orders_customer", "customer_id", "customers", "id")
            .on_delete(ForeignKeyAction::Cascade);

        assert_eq!(fk.on_delete.to_string(), "CASCADE");
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
    }
}
