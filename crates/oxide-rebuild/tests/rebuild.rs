//! Table rebuilds against a live SQLite database.

mod common;
use common::*;

use oxide_rebuild::prelude::*;

fn create_orders() -> MigrationOperation {
    MigrationOperation::create_table("orders", orders_columns(), vec!["id".to_string()])
}

#[tokio::test]
async fn rename_column_renames_conventional_index() {
    let migrator = migrator(MigratorConfig::default()).await;
    let set = set(vec![
        OperationMigration::new(1, "create_orders").operations(vec![
            create_orders(),
            MigrationOperation::create_index("orders", vec!["customer_id".to_string()], false),
            seed_orders(),
        ]),
        OperationMigration::new(2, "rename_customer").operation(MigrationOperation::rename_column(
            "orders",
            "customer_id",
            "client_id",
        )),
    ]);

    migrator.migrate_latest(&set).await.unwrap();

    let pool = migrator.pool();
    assert_eq!(columns(pool, "orders").await, vec!["id", "client_id", "total", "note"]);
    assert_eq!(object_names(pool, "index").await, vec!["IN_orders_client_id"]);
    let index_sql = object_sql(pool, "IN_orders_client_id").await.unwrap();
    assert!(index_sql.contains("\"client_id\""));
    assert!(!index_sql.contains("customer_id"));

    let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT id, client_id FROM orders ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap();
    assert_eq!(rows, vec![(1, 10), (2, 10), (3, 11)]);
    assert!(object_sql(pool, "orders_temp").await.is_none());

    migrator.migrate_to(&set, 1).await.unwrap();
    assert_eq!(columns(pool, "orders").await, vec!["id", "customer_id", "total", "note"]);
    assert_eq!(object_names(pool, "index").await, vec!["IN_orders_customer_id"]);
    assert_eq!(orders_rows(pool).await.len(), 3);
}

#[tokio::test]
async fn rename_column_with_unconventional_index_leaves_table_unchanged() {
    let migrator = migrator(MigratorConfig::default()).await;
    let set = set(vec![
        OperationMigration::new(1, "create_orders").operations(vec![
            create_orders(),
            MigrationOperation::run_sql(
                "CREATE INDEX idx1 ON orders (customer_id)",
                Some("DROP INDEX idx1".to_string()),
            ),
            seed_orders(),
        ]),
        OperationMigration::new(2, "rename_customer").operation(MigrationOperation::rename_column(
            "orders",
            "customer_id",
            "client_id",
        )),
    ]);

    let err = migrator.migrate_latest(&set).await.unwrap_err();
    match err {
        MigrateError::StepFailed {
            version, source, ..
        } => {
            assert_eq!(version, 2);
            assert!(
                matches!(*source, MigrateError::NamingConvention { ref object, .. } if object == "idx1")
            );
        }
        other => panic!("Expected StepFailed, got {other:?}"),
    }

    let pool = migrator.pool();
    assert_eq!(migrator.current_version().await.unwrap(), 1);
    assert_eq!(columns(pool, "orders").await, vec!["id", "customer_id", "total", "note"]);
    assert_eq!(object_names(pool, "index").await, vec!["idx1"]);
    assert!(object_sql(pool, "orders_temp").await.is_none());
    assert_eq!(
        orders_rows(pool).await,
        vec![(1, 10, Some(9.5)), (2, 10, Some(20.0)), (3, 11, Some(3.25))]
    );
}

#[tokio::test]
async fn noop_rebuild_preserves_rows_and_dependents() {
    let migrator = migrator(MigratorConfig::default()).await;

    let mut tx = migrator.begin().await.unwrap();
    tx.add_table("orders", &orders_columns(), &["id".to_string()])
        .await
        .unwrap();
    tx.add_table(
        "audit",
        &[ColumnSchema::new("order_id", SqlType::Integer)],
        &[],
    )
    .await
    .unwrap();
    tx.add_index("orders", &["customer_id"], false, None)
        .await
        .unwrap();
    tx.add_trigger(
        "orders",
        "audit",
        "AFTER INSERT",
        "INSERT INTO audit (order_id) VALUES (NEW.id);",
    )
    .await
    .unwrap();
    tx.execute("INSERT INTO orders (id, customer_id, total) VALUES (1, 10, 9.5), (2, 11, NULL)")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let pool = migrator.pool();
    let rows_before = orders_rows(pool).await;
    let index_before = object_sql(pool, "IN_orders_customer_id").await.unwrap();
    let trigger_before = object_sql(pool, "TR_orders_audit").await.unwrap();

    let mut tx = migrator.begin().await.unwrap();
    tx.change_column("orders", &ColumnSchema::new("total", SqlType::Real))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(orders_rows(pool).await, rows_before);
    assert_eq!(
        object_sql(pool, "IN_orders_customer_id").await.unwrap(),
        index_before
    );
    assert_eq!(
        object_sql(pool, "TR_orders_audit").await.unwrap(),
        trigger_before
    );

    sqlx::query("INSERT INTO orders (id, customer_id) VALUES (3, 12)")
        .execute(pool)
        .await
        .unwrap();
    let audited: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(audited, 3);
}

#[tokio::test]
async fn rebuild_keeps_triggers_on_other_tables_valid() {
    let migrator = migrator(MigratorConfig::default()).await;

    let mut tx = migrator.begin().await.unwrap();
    tx.add_table("orders", &orders_columns(), &["id".to_string()])
        .await
        .unwrap();
    tx.add_table(
        "customers",
        &[ColumnSchema::new("id", SqlType::Integer).primary_key()],
        &["id".to_string()],
    )
    .await
    .unwrap();
    tx.add_trigger(
        "customers",
        "cascade",
        "AFTER DELETE",
        "DELETE FROM orders WHERE customer_id = OLD.id;",
    )
    .await
    .unwrap();
    tx.execute("INSERT INTO customers (id) VALUES (10), (11)")
        .await
        .unwrap();
    tx.execute(
        "INSERT INTO orders (id, customer_id, total, note) VALUES \
         (1, 10, 9.5, 'a'), (2, 10, 20.0, 'b'), (3, 11, 3.25, 'c')",
    )
    .await
    .unwrap();

    tx.remove_column("orders", "note").await.unwrap();
    tx.commit().await.unwrap();

    let pool = migrator.pool();
    assert_eq!(columns(pool, "orders").await, vec!["id", "customer_id", "total"]);

    let trigger_sql = object_sql(pool, "TR_customers_cascade").await.unwrap();
    assert!(trigger_sql.contains("orders"));
    assert!(!trigger_sql.contains("orders_temp"));

    sqlx::query("DELETE FROM customers WHERE id = 10")
        .execute(pool)
        .await
        .unwrap();
    assert_eq!(orders_rows(pool).await, vec![(3, 11, Some(3.25))]);
}

#[tokio::test]
async fn rebuild_keeps_self_referencing_trigger() {
    let migrator = migrator(MigratorConfig::default()).await;

    let mut tx = migrator.begin().await.unwrap();
    tx.add_table("orders", &orders_columns(), &["id".to_string()])
        .await
        .unwrap();
    tx.add_trigger(
        "orders",
        "touch",
        "AFTER INSERT",
        "UPDATE orders SET note = 'changed' WHERE id = NEW.id;",
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let pool = migrator.pool();
    let trigger_before = object_sql(pool, "TR_orders_touch").await.unwrap();

    let mut tx = migrator.begin().await.unwrap();
    tx.change_column("orders", &ColumnSchema::new("total", SqlType::Real))
        .await
        .unwrap();
    tx.rename_column("orders", "customer_id", "client_id")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        columns(pool, "orders").await,
        vec!["id", "client_id", "total", "note"]
    );
    assert_eq!(object_names(pool, "trigger").await, vec!["TR_orders_touch"]);
    assert_eq!(
        object_sql(pool, "TR_orders_touch").await.unwrap(),
        trigger_before
    );
    assert!(object_sql(pool, "orders_temp").await.is_none());

    sqlx::query("INSERT INTO orders (id, client_id) VALUES (1, 10)")
        .execute(pool)
        .await
        .unwrap();
    let note: Option<String> = sqlx::query_scalar("SELECT note FROM orders WHERE id = 1")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(note.as_deref(), Some("changed"));
}

#[tokio::test]
async fn rename_column_rewrites_triggers_on_other_tables() {
    let migrator = migrator(MigratorConfig::default()).await;

    let mut tx = migrator.begin().await.unwrap();
    tx.add_table("orders", &orders_columns(), &["id".to_string()])
        .await
        .unwrap();
    tx.add_table(
        "customers",
        &[ColumnSchema::new("id", SqlType::Integer).primary_key()],
        &["id".to_string()],
    )
    .await
    .unwrap();
    tx.add_trigger(
        "customers",
        "cascade",
        "AFTER DELETE",
        "DELETE FROM orders WHERE customer_id = OLD.id;",
    )
    .await
    .unwrap();
    tx.execute("INSERT INTO customers (id) VALUES (10), (11)")
        .await
        .unwrap();
    tx.execute("INSERT INTO orders (id, customer_id) VALUES (1, 10), (2, 11)")
        .await
        .unwrap();

    tx.rename_column("orders", "customer_id", "client_id")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let pool = migrator.pool();
    let trigger_sql = object_sql(pool, "TR_customers_cascade").await.unwrap();
    assert!(trigger_sql.contains("client_id"));
    assert!(!trigger_sql.contains("customer_id"));
    assert!(!trigger_sql.contains("orders_temp"));

    sqlx::query("DELETE FROM customers WHERE id = 10")
        .execute(pool)
        .await
        .unwrap();
    let remaining: Vec<(i64, i64)> = sqlx::query_as("SELECT id, client_id FROM orders")
        .fetch_all(pool)
        .await
        .unwrap();
    assert_eq!(remaining, vec![(2, 11)]);
}

#[tokio::test]
async fn ambiguous_foreign_key_removal_changes_nothing() {
    let migrator = migrator(MigratorConfig::default()).await;
    let fk = ForeignKeySchema::new("fk_orders_customer", "customer_id", "customers", "id");

    let mut tx = migrator.begin().await.unwrap();
    tx.add_table(
        "customers",
        &[ColumnSchema::new("id", SqlType::Integer).primary_key()],
        &["id".to_string()],
    )
    .await
    .unwrap();
    tx.add_table("orders", &orders_columns(), &["id".to_string()])
        .await
        .unwrap();
    tx.add_foreign_key("orders", &fk).await.unwrap();
    tx.add_foreign_key("orders", &fk).await.unwrap();
    tx.execute("INSERT INTO orders (id, customer_id) VALUES (1, 10)")
        .await
        .unwrap();

    let before = tx.table_definition("orders").await.unwrap().unwrap();
    let err = tx.remove_foreign_key("orders", &fk, true).await.unwrap_err();
    assert!(matches!(
        err,
        MigrateError::AmbiguousForeignKeyRemoval { matches: 2, .. }
    ));

    assert_eq!(tx.table_definition("orders").await.unwrap().unwrap(), before);
    assert!(!tx.table_exists("orders_temp").await.unwrap());
    assert_eq!(tx.query("SELECT id FROM orders").await.unwrap().len(), 1);
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn parsed_definition_matches_generated_table() {
    let migrator = migrator(MigratorConfig::default()).await;

    let mut tx = migrator.begin().await.unwrap();
    tx.add_table(
        "order_lines",
        &[
            ColumnSchema::new("order_id", SqlType::Integer).primary_key(),
            ColumnSchema::new("line_no", SqlType::Integer).primary_key(),
            ColumnSchema::new("product_id", SqlType::Integer),
            ColumnSchema::new("sku", SqlType::Text).not_null().unique(),
            ColumnSchema::new("memo", SqlType::Text),
        ],
        &["order_id".to_string(), "line_no".to_string()],
    )
    .await
    .unwrap();
    tx.add_foreign_key(
        "order_lines",
        &ForeignKeySchema::new("fk_lines_product", "product_id", "products", "id")
            .on_delete(ForeignKeyAction::Cascade),
    )
    .await
    .unwrap();

    let def = tx.table_definition("order_lines").await.unwrap().unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(def.name, "order_lines");
    assert_eq!(
        def.column_names(),
        vec!["order_id", "line_no", "product_id", "sku", "memo"]
    );
    let key = def.primary_key.as_deref().unwrap();
    assert!(key.contains("\"order_id\"") && key.contains("\"line_no\""));

    let order_id = def.column("order_id").unwrap();
    assert_eq!(order_id.type_name, "INTEGER");
    assert!(!order_id.nullable);
    assert!(!order_id.primary_key);

    let sku = def.column("sku").unwrap();
    assert_eq!(sku.type_name, "TEXT");
    assert!(sku.unique);
    assert!(!sku.nullable);

    let product = def.column("product_id").unwrap();
    assert!(product.nullable);
    assert!(!product.unique);
    assert!(product
        .constraint_suffix()
        .unwrap()
        .starts_with("CONSTRAINT \"fk_lines_product\""));

    assert!(def.column("memo").unwrap().nullable);
}
