//! Example: Order Management Migrations
//!
//! This example walks an order database through a few versions, including
//! column changes SQLite cannot run with a plain ALTER TABLE, then reverts
//! part of the way.
//!
//! Run with: cargo run --example orders_migrations -p oxide-rebuild

use futures::future::BoxFuture;
use oxide_rebuild::prelude::*;

// =============================================================================
// Migration Definitions
// =============================================================================

/// Initial migration: customers and orders
struct Migration0001;

impl DeclarativeMigration for Migration0001 {
    const VERSION: i64 = 1;
    const NAME: &'static str = "create_orders";

    fn operations() -> Vec<MigrationOperation> {
        vec![
            MigrationOperation::create_table(
                "customers",
                vec![
                    ColumnSchema::new("id", SqlType::Integer)
                        .primary_key()
                        .auto_increment(),
                    ColumnSchema::new("email", SqlType::Text).not_null().unique(),
                ],
                vec!["id".to_string()],
            ),
            MigrationOperation::create_table(
                "orders",
                vec![
                    ColumnSchema::new("id", SqlType::Integer)
                        .primary_key()
                        .auto_increment(),
                    ColumnSchema::new("customer_id", SqlType::Integer).not_null(),
                    ColumnSchema::new("total", SqlType::Real)
                        .not_null()
                        .default(DefaultValue::Float(0.0)),
                    ColumnSchema::new("note", SqlType::Text),
                ],
                vec!["id".to_string()],
            ),
            MigrationOperation::create_index("orders", vec!["customer_id".to_string()], false),
        ]
    }
}

/// Second migration: foreign key and audit trigger
struct Migration0002;

impl DeclarativeMigration for Migration0002 {
    const VERSION: i64 = 2;
    const NAME: &'static str = "link_customers";

    fn operations() -> Vec<MigrationOperation> {
        vec![
            MigrationOperation::add_foreign_key(
                "orders",
                ForeignKeySchema::new("fk_orders_customer", "customer_id", "customers", "id")
                    .on_delete(ForeignKeyAction::Cascade),
            ),
            MigrationOperation::create_table(
                "order_audit",
                vec![
                    ColumnSchema::new("order_id", SqlType::Integer).not_null(),
                    ColumnSchema::new("changed_at", SqlType::Text)
                        .not_null()
                        .default(DefaultValue::Expression("CURRENT_TIMESTAMP".to_string())),
                ],
                vec![],
            ),
            MigrationOperation::create_trigger(
                "orders",
                "audit",
                "AFTER UPDATE",
                "INSERT INTO order_audit (order_id) VALUES (NEW.id);",
            ),
        ]
    }
}

/// Third migration: rename a column, which renames its index too
struct Migration0003;

impl DeclarativeMigration for Migration0003 {
    const VERSION: i64 = 3;
    const NAME: &'static str = "rename_customer";

    fn operations() -> Vec<MigrationOperation> {
        vec![MigrationOperation::rename_column(
            "orders",
            "customer_id",
            "client_id",
        )]
    }
}

/// Fourth migration, written by hand: drops the note column after
/// folding it into a new one.
struct Migration0004;

impl Migration for Migration0004 {
    fn version(&self) -> i64 {
        4
    }

    fn name(&self) -> &str {
        "fold_notes"
    }

    fn up<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tx.add_column("orders", &ColumnSchema::new("remarks", SqlType::Text))
                .await?;
            tx.execute("UPDATE orders SET remarks = note").await?;
            tx.report_progress(50);
            tx.remove_column("orders", "note").await
        })
    }

    fn down<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tx.rename_column("orders", "remarks", "note").await
        })
    }
}

/// Creates the metadata table before the first step of a run.
struct PrepareMetadata;

impl InitHook for PrepareMetadata {
    fn run<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tx.execute("CREATE TABLE IF NOT EXISTS app_meta (key TEXT PRIMARY KEY, value TEXT)")
                .await
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" OXIDE-REBUILD: Order Management Example");
    println!("{}", "=".repeat(70));
    println!();

    let set = MigrationSet::new(vec![
        Box::new(Migration0001::to_migration()) as Box<dyn Migration>,
        Box::new(Migration0002::to_migration()),
        Box::new(Migration0003::to_migration()),
        Box::new(Migration0004),
    ])?
    .with_init_hook(PrepareMetadata);

    let migrator = Migrator::connect("sqlite::memory:", MigratorConfig::default())
        .await?
        .on_progress(|pct| println!("    progress: {pct}%"));

    println!("[1] Planning...");
    let plan = migrator.plan(&set, 4).await?;
    println!("    {} steps to version {}\n", plan.versions.len(), plan.target);

    println!("[2] Migrating to latest...");
    let report = migrator.migrate_latest(&set).await?;
    println!("    {} steps applied\n", report.executed());

    println!("[3] Orders table after rebuilds:");
    let mut tx = migrator.begin().await?;
    if let Some(definition) = tx.table_definition("orders").await? {
        for column in &definition.columns {
            println!("    {}", column.sql);
        }
    }
    for object in oxide_rebuild::dependents::owned_objects(&mut tx, "orders").await? {
        println!("    {} {}", object.kind, object.name);
    }
    tx.rollback().await?;
    println!();

    println!("[4] Reverting to version 2...");
    let report = migrator.migrate_to(&set, 2).await?;
    for outcome in &report.outcomes {
        println!("    {outcome:?}");
    }
    println!();

    println!("[5] Status:");
    let status = migrator.status(&set).await?;
    for applied in &status.applied {
        println!("    [X] {} {}", applied.version, applied.name);
    }
    for (version, name) in &status.pending {
        println!("    [ ] {version} {name}");
    }

    Ok(())
}
