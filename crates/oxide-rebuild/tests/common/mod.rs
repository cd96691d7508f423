#![allow(dead_code)]

use oxide_rebuild::prelude::*;
use sqlx::SqlitePool;

pub async fn migrator(config: MigratorConfig) -> Migrator {
    Migrator::connect("sqlite::memory:", config)
        .await
        .unwrap_or_else(|e| panic!("Failed to open in-memory database: {e:?}"))
}

pub fn set(migrations: Vec<OperationMigration>) -> MigrationSet {
    MigrationSet::new(
        migrations
            .into_iter()
            .map(|m| Box::new(m) as Box<dyn Migration>)
            .collect(),
    )
    .unwrap_or_else(|e| panic!("Invalid migration set: {e:?}"))
}

pub fn orders_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", SqlType::Integer).primary_key(),
        ColumnSchema::new("customer_id", SqlType::Integer).not_null(),
        ColumnSchema::new("total", SqlType::Real),
        ColumnSchema::new("note", SqlType::Text),
    ]
}

pub fn seed_orders() -> MigrationOperation {
    MigrationOperation::run_sql(
        "INSERT INTO orders (id, customer_id, total, note) VALUES \
         (1, 10, 9.5, 'first'), (2, 10, 20.0, NULL), (3, 11, 3.25, 'third')",
        Some("DELETE FROM orders".to_string()),
    )
}

pub async fn object_sql(pool: &SqlitePool, name: &str) -> Option<String> {
    sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to read schema: {e:?}"))
}

pub async fn object_names(pool: &SqlitePool, kind: &str) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = ? AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .bind(kind)
    .fetch_all(pool)
    .await
    .unwrap_or_else(|e| panic!("Failed to read schema: {e:?}"))
}

pub async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
    sqlx::query_scalar("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to read columns: {e:?}"))
}

pub async fn orders_rows(pool: &SqlitePool) -> Vec<(i64, i64, Option<f64>)> {
    sqlx::query_as("SELECT id, customer_id, total FROM orders ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to read orders: {e:?}"))
}
