//! Schema text parser.
//!
//! Reads a `CREATE TABLE` statement this crate generated earlier (as
//! stored in `sqlite_master`) back into an ordered list of column
//! definitions plus an optional composite primary key clause. Each
//! definition keeps its original text so a rebuild can carry constraints
//! over verbatim.
//!
//! The column list is split on top-level commas only, so types such as
//! `DECIMAL(10, 2)` and `CHECK (a IN (1, 2))` stay in one definition.

use serde::Serialize;

use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};
use crate::lexer::{self, Token, TokenKind};
use crate::schema::SqlType;

/// Keywords that end the type part of a column definition.
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "REFERENCES",
    "COLLATE",
    "GENERATED",
    "AS",
];

/// Keywords that start a table-level constraint instead of a column.
const TABLE_CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "UNIQUE", "CHECK", "FOREIGN"];

/// One column definition of a stored `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    /// Column name, unquoted.
    pub name: String,
    /// Raw type token(s), e.g. `INTEGER` or `DECIMAL(10, 2)`.
    pub type_name: String,
    /// False when the definition says `NOT NULL` or `PRIMARY KEY`.
    pub nullable: bool,
    /// True when a standalone `UNIQUE` keyword is present.
    pub unique: bool,
    /// True when the column is an inline primary key.
    pub primary_key: bool,
    /// Full definition text.
    pub sql: String,
}

impl ColumnDefinition {
    /// Parses a single column definition fragment.
    ///
    /// Returns `None` if the fragment does not start with an identifier.
    #[must_use]
    pub fn parse(fragment: &str) -> Option<Self> {
        let fragment = fragment.trim();
        let tokens = lexer::tokenize(fragment);
        let name = tokens.first()?.identifier()?.into_owned();

        let type_name = type_span(&tokens)
            .map(|(start, end)| fragment[start..end].to_string())
            .unwrap_or_default();

        let mut not_null = false;
        let mut primary_key = false;
        let mut unique = false;
        for (i, token) in top_level(&tokens) {
            let next = tokens.get(i + 1);
            if token.is_keyword("NOT") && next.is_some_and(|t| t.is_keyword("NULL")) {
                not_null = true;
            } else if token.is_keyword("PRIMARY") && next.is_some_and(|t| t.is_keyword("KEY")) {
                primary_key = true;
            } else if token.is_keyword("UNIQUE") {
                unique = true;
            }
        }

        Some(Self {
            name,
            type_name,
            nullable: !(not_null || primary_key),
            unique,
            primary_key,
            sql: fragment.to_string(),
        })
    }

    /// Text from the first `CONSTRAINT` keyword to the end, if any.
    ///
    /// This is what a type change carries over into the regenerated definition.
    #[must_use]
    pub fn constraint_suffix(&self) -> Option<&str> {
        let tokens = lexer::tokenize(&self.sql);
        let start = top_level(&tokens)
            .skip(1)
            .find(|(_, t)| t.is_keyword("CONSTRAINT"))
            .map(|(_, t)| t.span.start);
        start.map(|start| &self.sql[start..])
    }

    /// Resolves the type token through the dialect's type resolver.
    #[must_use]
    pub fn sql_type(&self, dialect: &dyn MigrationDialect) -> Option<SqlType> {
        dialect.resolve_type(&self.type_name)
    }
}

/// A stored `CREATE TABLE` statement, decomposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    /// Table name, unquoted.
    pub name: String,
    /// Column definitions in declaration order.
    pub columns: Vec<ColumnDefinition>,
    /// Composite `PRIMARY KEY (…)` clause, if present.
    pub primary_key: Option<String>,
    /// Other table-level constraints, verbatim.
    pub constraints: Vec<String>,
    /// Text after the closing parenthesis (e.g. `WITHOUT ROWID`).
    pub options: String,
}

impl TableDefinition {
    /// Parses stored `CREATE TABLE` text.
    pub fn parse(sql: &str) -> Result<Self> {
        let normalized = sql.replace(['\r', '\n'], " ");
        let tokens = lexer::tokenize(&normalized);

        let open = tokens
            .iter()
            .position(|t| t.kind == TokenKind::LeftParen)
            .ok_or_else(|| MigrateError::parse_shape("?", "missing opening parenthesis"))?;
        let name = open
            .checked_sub(1)
            .and_then(|i| tokens[i].identifier())
            .map(|ident| ident.into_owned())
            .ok_or_else(|| MigrateError::parse_shape("?", "missing table name"))?;
        let close = tokens
            .iter()
            .rposition(|t| t.kind == TokenKind::RightParen)
            .filter(|&close| close > open)
            .ok_or_else(|| MigrateError::parse_shape(&name, "missing closing parenthesis"))?;

        let body = &tokens[open + 1..close];
        let fragments = split_top_level(&normalized, body);
        if fragments.is_empty() {
            return Err(MigrateError::parse_shape(&name, "empty column list"));
        }

        let mut columns = Vec::new();
        let mut primary_key = None;
        let mut constraints = Vec::new();
        for fragment in fragments {
            let head = lexer::tokenize(fragment);
            let first = head.first();
            if first.is_some_and(|t| t.is_keyword("PRIMARY"))
                && head.get(1).is_some_and(|t| t.is_keyword("KEY"))
                && primary_key.is_none()
            {
                primary_key = Some(fragment.to_string());
            } else if first.is_some_and(|t| {
                TABLE_CONSTRAINT_KEYWORDS.iter().any(|k| t.is_keyword(k))
                    || t.is_keyword("PRIMARY")
            }) {
                constraints.push(fragment.to_string());
            } else {
                let column = ColumnDefinition::parse(fragment).ok_or_else(|| {
                    MigrateError::parse_shape(&name, format!("cannot read column '{fragment}'"))
                })?;
                columns.push(column);
            }
        }

        if columns.is_empty() {
            return Err(MigrateError::parse_shape(&name, "no column definitions"));
        }

        Ok(Self {
            name,
            columns,
            primary_key,
            constraints,
            options: normalized[tokens[close].span.end..].trim().to_string(),
        })
    }

    /// Gets a column by name (case-insensitive).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Position of a column by name (case-insensitive).
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Reassembles the parenthesized column list, including table-level
    /// clauses and trailing options.
    #[must_use]
    pub fn column_list_sql(&self) -> String {
        let mut parts: Vec<&str> = self.columns.iter().map(|c| c.sql.as_str()).collect();
        if let Some(ref pk) = self.primary_key {
            parts.push(pk);
        }
        parts.extend(self.constraints.iter().map(String::as_str));

        let mut sql = format!("({})", parts.join(", "));
        if !self.options.is_empty() {
            sql.push(' ');
            sql.push_str(&self.options);
        }
        sql
    }
}

/// Extracts the leading name token of a column definition, unquoted.
#[must_use]
pub fn column_name(fragment: &str) -> Option<String> {
    lexer::leading_identifier(fragment.trim())
}

/// Extracts the raw type token(s) of a column definition.
#[must_use]
pub fn column_type(fragment: &str) -> String {
    let fragment = fragment.trim();
    let tokens = lexer::tokenize(fragment);
    type_span(&tokens)
        .map(|(start, end)| fragment[start..end].to_string())
        .unwrap_or_default()
}

/// Byte range of the type part: everything after the name up to the
/// first constraint keyword outside parentheses.
fn type_span(tokens: &[Token<'_>]) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut end = None;
    for token in tokens.iter().skip(1) {
        match token.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && CONSTRAINT_KEYWORDS.iter().any(|k| token.is_keyword(k)) => break,
            _ => {}
        }
        end = Some(token.span.end);
    }
    Some((tokens.get(1)?.span.start, end?))
}

/// Tokens outside any parentheses, with their indexes.
fn top_level<'t, 'a>(tokens: &'t [Token<'a>]) -> impl Iterator<Item = (usize, &'t Token<'a>)> {
    let mut depth = 0usize;
    tokens.iter().enumerate().filter(move |(_, t)| match t.kind {
        TokenKind::LeftParen => {
            depth += 1;
            false
        }
        TokenKind::RightParen => {
            depth = depth.saturating_sub(1);
            false
        }
        _ => depth == 0,
    })
}

/// Splits the tokens of a column list body on top-level commas.
fn split_top_level<'s>(source: &'s str, body: &[Token<'_>]) -> Vec<&'s str> {
    let mut fragments = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut end = 0;

    for token in body {
        match token.kind {
            TokenKind::Comma if depth == 0 => {
                if let Some(s) = start.take() {
                    fragments.push(source[s..end].trim());
                }
                continue;
            }
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        start.get_or_insert(token.span.start);
        end = token.span.end;
    }
    if let Some(s) = start {
        fragments.push(source[s..end].trim());
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::schema::{ColumnSchema, ForeignKeySchema};

    fn generated_table() -> String {
        let d = SqliteDialect::new();
        let columns = vec![
            ColumnSchema::new("order_id", SqlType::Integer),
            ColumnSchema::new("line_no", SqlType::Integer),
            ColumnSchema::new("sku", SqlType::Varchar(64)).not_null().unique(),
            ColumnSchema::new("note", SqlType::Text),
            ColumnSchema::new("product_id", SqlType::BigInt).not_null(),
        ];
        let mut list = d.column_list_sql(
            &columns,
            &["order_id".to_string(), "line_no".to_string()],
        );
        let fk = ForeignKeySchema::new("fk_lines_product", "product_id", "products", "id");
        let product = d.column_definition(&columns[4]);
        list = list.replace(&product, &format!("{product}{}", d.foreign_key_clause(&fk)));
        d.create_table_sql("order_lines", &list, false)
    }

    #[test]
    fn test_parse_generated_table() {
        let sql = generated_table();
        let def = TableDefinition::parse(&sql).unwrap();

        assert_eq!(def.name, "order_lines");
        assert_eq!(
            def.column_names(),
            vec!["order_id", "line_no", "sku", "note", "product_id"]
        );
        assert_eq!(
            def.primary_key.as_deref(),
            Some("PRIMARY KEY (\"order_id\", \"line_no\")")
        );

        let sku = def.column("sku").unwrap();
        assert_eq!(sku.type_name, "TEXT");
        assert!(!sku.nullable);
        assert!(sku.unique);

        let note = def.column("note").unwrap();
        assert!(note.nullable);
        assert!(!note.unique);

        let product = def.column("product_id").unwrap();
        assert_eq!(product.type_name, "INTEGER");
        assert!(!product.nullable);
        assert_eq!(
            product.constraint_suffix(),
            Some(
                "CONSTRAINT \"fk_lines_product\" REFERENCES \"products\"(\"id\") \
                 ON UPDATE NO ACTION ON DELETE NO ACTION"
            )
        );
    }

    #[test]
    fn test_parse_nested_parentheses() {
        let def = TableDefinition::parse(
            "CREATE TABLE prices (amount DECIMAL(10, 2) NOT NULL, \
             kind TEXT CHECK (kind IN ('a', 'b')), id INTEGER PRIMARY KEY)",
        )
        .unwrap();

        assert_eq!(def.column_names(), vec!["amount", "kind", "id"]);
        assert_eq!(def.columns[0].type_name, "DECIMAL(10, 2)");
        let dialect = SqliteDialect::new();
        assert_eq!(
            def.columns[0].sql_type(&dialect),
            Some(SqlType::Decimal(10, 2))
        );
        assert!(def.columns[2].primary_key);
        assert!(!def.columns[2].nullable);
        assert!(def.primary_key.is_none());
    }

    #[test]
    fn test_unique_must_be_a_whole_word() {
        let column = ColumnDefinition::parse("ref UNIQUEIDENTIFIER NOT NULL").unwrap();
        assert_eq!(column.type_name, "UNIQUEIDENTIFIER");
        assert!(!column.unique);
    }

    #[test]
    fn test_table_constraints_and_options() {
        let def = TableDefinition::parse(
            "CREATE TABLE t (a INTEGER, b INTEGER, UNIQUE (a, b)) WITHOUT ROWID",
        )
        .unwrap();
        assert_eq!(def.constraints, vec!["UNIQUE (a, b)"]);
        assert_eq!(def.options, "WITHOUT ROWID");
        assert_eq!(
            def.column_list_sql(),
            "(a INTEGER, b INTEGER, UNIQUE (a, b)) WITHOUT ROWID"
        );
    }

    #[test]
    fn test_reassemble_with_composite_key() {
        let def = TableDefinition::parse(&generated_table()).unwrap();
        let list = def.column_list_sql();
        assert!(list.starts_with("(\"order_id\" INTEGER NOT NULL, \"line_no\" INTEGER NOT NULL, "));
        assert!(list.ends_with("PRIMARY KEY (\"order_id\", \"line_no\"))"));
    }

    #[test]
    fn test_companion_functions() {
        assert_eq!(column_name("\"qty\" INTEGER NOT NULL").as_deref(), Some("qty"));
        assert_eq!(column_type("\"qty\" INTEGER NOT NULL"), "INTEGER");
        assert_eq!(column_type("label DOUBLE PRECISION"), "DOUBLE PRECISION");
        assert_eq!(column_type("untyped"), "");
    }

    #[test]
    fn test_malformed_definitions() {
        assert!(matches!(
            TableDefinition::parse(""),
            Err(MigrateError::ParseShape { .. })
        ));
        assert!(matches!(
            TableDefinition::parse("CREATE TABLE t ()"),
            Err(MigrateError::ParseShape { .. })
        ));
        assert!(matches!(
            TableDefinition::parse("CREATE TABLE t (a INTEGER"),
            Err(MigrateError::ParseShape { .. })
        ));
    }
}
