//! Applied-version history.
//!
//! This module manages the marker table recording which migration versions
//! have been applied. Markers are written through the same connection as
//! the step itself, so a marker commits or rolls back together with the
//! schema change it records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::Result;

/// A record of an applied version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVersion {
    /// Version number.
    pub version: i64,
    /// Migration name at the time it was applied.
    pub name: String,
    /// When the version was applied.
    pub applied_at: DateTime<Utc>,
}

/// Manages the applied-version marker table.
#[derive(Debug, Clone)]
pub struct MigrationHistory {
    table: String,
}

impl MigrationHistory {
    /// Creates a history manager over the given table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Marker table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn quoted(&self) -> String {
        format!("\"{}\"", self.table.replace('"', "\"\""))
    }

    /// SQL creating the marker table.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
             version INTEGER PRIMARY KEY,\n    \
             name TEXT NOT NULL,\n    \
             applied_at TEXT NOT NULL DEFAULT (datetime('now'))\n)",
            self.quoted()
        )
    }

    /// Ensures the marker table exists.
    pub async fn ensure_table(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(&self.create_table_sql()).execute(conn).await?;
        Ok(())
    }

    /// Returns whether the marker table exists yet.
    pub async fn exists(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_optional(conn)
                .await?;
        Ok(row.is_some())
    }

    /// Records a version as applied.
    pub async fn record_applied(
        &self,
        conn: &mut SqliteConnection,
        version: i64,
        name: &str,
    ) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {} (version, name) VALUES (?, ?)",
            self.quoted()
        ))
        .bind(version)
        .bind(name)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Removes a version marker. Returns whether a marker was removed.
    pub async fn record_unapplied(&self, conn: &mut SqliteConnection, version: i64) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE version = ?", self.quoted()))
            .bind(version)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Gets the set of applied versions; empty if the table does not exist.
    pub async fn applied_versions(&self, conn: &mut SqliteConnection) -> Result<BTreeSet<i64>> {
        if !self.exists(&mut *conn).await? {
            return Ok(BTreeSet::new());
        }
        let rows: Vec<(i64,)> =
            sqlx::query_as(&format!("SELECT version FROM {}", self.quoted()))
                .fetch_all(conn)
                .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Gets all applied versions in ascending order.
    pub async fn applied(&self, conn: &mut SqliteConnection) -> Result<Vec<AppliedVersion>> {
        if !self.exists(&mut *conn).await? {
            return Ok(Vec::new());
        }
        let rows: Vec<(i64, String, String)> = sqlx::query_as(&format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            self.quoted()
        ))
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(version, name, applied_at)| AppliedVersion {
                version,
                name,
                applied_at: parse_timestamp(&applied_at),
            })
            .collect())
    }
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}
