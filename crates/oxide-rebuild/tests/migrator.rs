//! Runs of the migrator against database files.

mod common;
use common::*;

use oxide_rebuild::prelude::*;

fn orders_set() -> MigrationSet {
    set(vec![
        OperationMigration::new(1, "create_orders").operations(vec![
            MigrationOperation::create_table("orders", orders_columns(), vec!["id".to_string()]),
            seed_orders(),
        ]),
        OperationMigration::new(2, "drop_note")
            .operation(MigrationOperation::drop_column("orders", "note")),
    ])
}

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite:{}", dir.path().join("orders.db").display())
}

#[tokio::test]
async fn applied_versions_survive_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);
    let set = orders_set();

    let migrator = Migrator::connect(&url, MigratorConfig::default()).await.unwrap();
    let report = migrator.migrate_latest(&set).await.unwrap();
    assert_eq!(
        report.outcomes,
        vec![StepOutcome::Applied(1), StepOutcome::Applied(2)]
    );
    migrator.pool().close().await;

    let migrator = Migrator::connect(&url, MigratorConfig::default()).await.unwrap();
    let status = migrator.status(&set).await.unwrap();
    assert_eq!(status.current, 2);
    assert!(status.pending.is_empty());
    assert_eq!(
        status.applied.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        vec!["create_orders", "drop_note"]
    );
    assert_eq!(
        columns(migrator.pool(), "orders").await,
        vec!["id", "customer_id", "total"]
    );
    assert_eq!(orders_rows(migrator.pool()).await.len(), 3);
}

#[tokio::test]
async fn custom_history_table_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("migrator.json");
    std::fs::write(&config_path, r#"{ "history_table": "app_versions" }"#).unwrap();
    let config = MigratorConfig::from_json_file(&config_path).unwrap();

    let migrator = Migrator::connect(&database_url(&dir), config).await.unwrap();
    migrator.migrate_to(&orders_set(), 1).await.unwrap();

    assert!(object_sql(migrator.pool(), "app_versions").await.is_some());
    assert!(object_sql(migrator.pool(), "oxide_schema_versions").await.is_none());
    assert_eq!(migrator.current_version().await.unwrap(), 1);
}

#[tokio::test]
async fn dry_run_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);

    let migrator = Migrator::connect(&url, MigratorConfig::default().dry_run(true))
        .await
        .unwrap();
    let report = migrator.migrate_latest(&orders_set()).await.unwrap();
    assert_eq!(report.executed(), 2);

    assert!(object_names(migrator.pool(), "table").await.is_empty());
}

#[tokio::test]
async fn verification_reports_orphaned_rows() {
    let migrator = migrator(MigratorConfig::default().verify_after_apply(true)).await;
    let set = set(vec![
        OperationMigration::new(1, "create_customers").operation(MigrationOperation::create_table(
            "customers",
            vec![ColumnSchema::new("id", SqlType::Integer).primary_key()],
            vec!["id".to_string()],
        )),
        OperationMigration::new(2, "create_orders").operations(vec![
            MigrationOperation::create_table("orders", orders_columns(), vec!["id".to_string()]),
            MigrationOperation::add_foreign_key(
                "orders",
                ForeignKeySchema::new("fk_orders_customer", "customer_id", "customers", "id"),
            ),
            seed_orders(),
        ]),
    ]);

    let err = migrator.migrate_latest(&set).await.unwrap_err();
    match err {
        MigrateError::StepFailed {
            version, source, ..
        } => {
            assert_eq!(version, 2);
            match *source {
                MigrateError::PostApplyConsistency { violations, .. } => {
                    assert_eq!(violations.len(), 3);
                    assert!(violations[0].contains("orders"));
                }
                other => panic!("Expected PostApplyConsistency, got {other:?}"),
            }
        }
        other => panic!("Expected StepFailed, got {other:?}"),
    }

    assert_eq!(migrator.current_version().await.unwrap(), 1);
    assert!(object_sql(migrator.pool(), "orders").await.is_none());
}
