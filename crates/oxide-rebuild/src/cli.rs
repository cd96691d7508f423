//! Command-line front end.
//!
//! A project links its [`MigrationSet`] into a small binary and hands it to
//! [`run`]:
//!
//! ```rust,ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     oxide_rebuild::cli::run(my_app::migrations()?).await
//! }
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::MigratorConfig;
use crate::dependents;
use crate::executor::{Migrator, StepOutcome};
use crate::migration::MigrationSet;

/// Versioned SQLite schema migrations with table rebuilds.
#[derive(Debug, Parser)]
#[command(name = "oxide-rebuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    pub database: String,

    /// JSON file with migrator settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize the migrations system (create history table).
    Init,

    /// Show applied, pending and missing versions.
    Status,

    /// Move the database to a version (latest if not specified).
    Migrate {
        /// Target version; 0 reverts everything.
        #[arg(short, long)]
        target: Option<i64>,

        /// Log statements without executing them.
        #[arg(long)]
        dry_run: bool,

        /// Check foreign keys and dependent names after each applied version.
        #[arg(long)]
        verify: bool,

        /// Log overall progress.
        #[arg(long)]
        progress: bool,
    },

    /// Print the parsed definition of a table as JSON.
    Inspect {
        /// Table name.
        table: String,
    },

    /// List the indexes and triggers that depend on a table.
    Dependents {
        /// Table name.
        table: String,
    },
}

/// Parses the command line, sets up logging and runs the command.
pub async fn run(set: MigrationSet) -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    execute(cli, &set).await
}

/// Runs a parsed command against `set`.
pub async fn execute(cli: Cli, set: &MigrationSet) -> anyhow::Result<()> {
    let mut config = match cli.config {
        Some(ref path) => MigratorConfig::from_json_file(path)?,
        None => MigratorConfig::default(),
    };
    if let Commands::Migrate {
        dry_run, verify, ..
    } = cli.command
    {
        config.dry_run |= dry_run;
        config.verify_after_apply |= verify;
    }

    let mut migrator = Migrator::connect(&cli.database, config).await?;

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations system...");
            migrator.init().await?;
            info!(table = %migrator.history().table(), "History table ready");
        }

        Commands::Status => {
            let status = migrator.status(set).await?;
            println!("\nCurrent version: {}", status.current);
            println!("{:-<60}", "");
            for applied in &status.applied {
                let marker = if status.missing.contains(&applied.version) {
                    "?"
                } else {
                    "X"
                };
                println!(
                    " [{marker}] {} {} ({})",
                    applied.version,
                    applied.name,
                    applied.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            for (version, name) in &status.pending {
                println!(" [ ] {version} {name}");
            }
            println!();
        }

        Commands::Migrate {
            target, progress, ..
        } => {
            if migrator.config().dry_run {
                info!("Dry run mode - statements will be logged but not executed.");
            }
            if progress {
                migrator = migrator.on_progress(|pct| info!(progress = pct, "Migration progress"));
            }

            let report = match target {
                Some(target) => migrator.migrate_to(set, target).await?,
                None => migrator.migrate_latest(set).await?,
            };
            for outcome in &report.outcomes {
                match outcome {
                    StepOutcome::Applied(v) => println!(" [+] {v}"),
                    StepOutcome::Reverted(v) => println!(" [-] {v}"),
                    StepOutcome::Missing(v) => println!(" [?] {v} (no migration loaded)"),
                }
            }
            info!(from = report.from, to = report.to, "Done");
        }

        Commands::Inspect { table } => {
            let mut tx = migrator.begin().await?;
            let definition = tx.table_definition(&table).await?;
            tx.rollback().await?;
            match definition {
                Some(definition) => println!("{}", serde_json::to_string_pretty(&definition)?),
                None => anyhow::bail!("table not found: {table}"),
            }
        }

        Commands::Dependents { table } => {
            let mut tx = migrator.begin().await?;
            let owned = dependents::owned_objects(&mut tx, &table).await?;
            let referencing = dependents::referencing_triggers(&mut tx, &table).await?;
            tx.rollback().await?;

            println!("\nOwned by {table}:");
            for object in &owned {
                println!(" {} {}", object.kind, object.name);
            }
            println!("\nReferencing {table}:");
            for object in &referencing {
                println!(" {} {} (on {})", object.kind, object.name, object.table);
            }
            println!();
        }
    }

    Ok(())
}
