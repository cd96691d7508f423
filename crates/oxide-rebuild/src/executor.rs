//! Migration executor.
//!
//! The executor moves the database between versions. Given the applied
//! versions and a target it computes a [`MigrationPlan`], then runs each
//! step's Up or Down action in its own transaction. A failing step is
//! rolled back and aborts the run; steps committed earlier in the same
//! run stay applied.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{error, info, warn};

use crate::config::MigratorConfig;
use crate::dialect::{MigrationDialect, SqliteDialect};
use crate::error::{MigrateError, Result};
use crate::history::{AppliedVersion, MigrationHistory};
use crate::migration::{Direction, Migration, MigrationSet};
use crate::progress::{Progress, ProgressCallback};
use crate::provider::SchemaTx;

/// Ordered steps needed to reach a target version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Highest applied version, 0 if none.
    pub current: i64,
    /// Requested version, 0 to revert everything.
    pub target: i64,
    /// `None` when the database is already at the target.
    pub direction: Option<Direction>,
    /// Versions to visit, in execution order.
    pub versions: Vec<i64>,
    /// Applied versions without a loaded migration.
    pub missing: Vec<i64>,
}

impl MigrationPlan {
    /// Computes the plan from loaded and applied versions.
    #[must_use]
    pub fn compute(loaded: &BTreeSet<i64>, applied: &BTreeSet<i64>, target: i64) -> Self {
        let current = applied.iter().next_back().copied().unwrap_or(0);
        let target = target.max(0);
        let (direction, versions) = if target > current {
            let versions = loaded.range(current + 1..=target).copied().collect();
            (Some(Direction::Up), versions)
        } else if target < current {
            let versions = applied.range(target + 1..=current).rev().copied().collect();
            (Some(Direction::Down), versions)
        } else {
            (None, Vec::new())
        };

        Self {
            current,
            target,
            direction,
            versions,
            missing: applied.difference(loaded).copied().collect(),
        }
    }

    /// Returns true if no step has to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// What happened to one visited version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Up action ran and the version was recorded.
    Applied(i64),
    /// Down action ran and the marker was removed.
    Reverted(i64),
    /// No migration is loaded for the version; it was skipped.
    Missing(i64),
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version before the run.
    pub from: i64,
    /// Version requested.
    pub to: i64,
    /// One entry per visited version, in order.
    pub outcomes: Vec<StepOutcome>,
}

impl MigrationReport {
    /// Number of steps whose action ran.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, StepOutcome::Missing(_)))
            .count()
    }
}

/// Applied, pending and missing versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Highest applied version, 0 if none.
    pub current: i64,
    /// Applied versions with their timestamps.
    pub applied: Vec<AppliedVersion>,
    /// Loaded versions not yet applied, with their names.
    pub pending: Vec<(i64, String)>,
    /// Applied versions without a loaded migration.
    pub missing: Vec<i64>,
}

/// Runs migration sets against a database.
pub struct Migrator {
    pool: SqlitePool,
    dialect: Arc<dyn MigrationDialect>,
    config: Arc<MigratorConfig>,
    history: MigrationHistory,
    progress: Option<ProgressCallback>,
}

impl Migrator {
    /// Creates a migrator over an existing pool.
    ///
    /// The pool should hold a single connection; see [`Migrator::connect`].
    pub fn new(pool: SqlitePool, config: MigratorConfig) -> Self {
        let history = MigrationHistory::new(config.history_table.clone());
        Self {
            pool,
            dialect: Arc::new(SqliteDialect::new()),
            config: Arc::new(config),
            history,
            progress: None,
        }
    }

    /// Opens a single-connection pool to `url` and creates a migrator.
    ///
    /// Foreign key enforcement is switched off on the connection, since a
    /// rebuild drops and recreates tables other tables point at.
    pub async fn connect(url: &str, config: MigratorConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool, config))
    }

    /// Replaces the dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: impl MigrationDialect + 'static) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    /// Registers a listener for overall run percentages.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Returns the pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Returns the migration history.
    #[must_use]
    pub fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Opens a schema transaction outside of any run.
    pub async fn begin(&self) -> Result<SchemaTx> {
        SchemaTx::begin(&self.pool, Arc::clone(&self.dialect), Arc::clone(&self.config)).await
    }

    /// Ensures the history table exists.
    pub async fn init(&self) -> Result<()> {
        if !self.config.dry_run {
            let mut conn = self.pool.acquire().await?;
            self.history.ensure_table(&mut conn).await?;
        }
        Ok(())
    }

    /// Gets the set of applied versions.
    pub async fn applied_versions(&self) -> Result<BTreeSet<i64>> {
        let mut conn = self.pool.acquire().await?;
        self.history.applied_versions(&mut conn).await
    }

    /// Highest applied version, 0 if none.
    pub async fn current_version(&self) -> Result<i64> {
        Ok(self
            .applied_versions()
            .await?
            .into_iter()
            .next_back()
            .unwrap_or(0))
    }

    /// Reports applied, pending and missing versions.
    pub async fn status(&self, set: &MigrationSet) -> Result<MigrationStatus> {
        let applied = {
            let mut conn = self.pool.acquire().await?;
            self.history.applied(&mut conn).await?
        };
        let applied_versions: BTreeSet<i64> = applied.iter().map(|a| a.version).collect();
        let loaded = set.versions();

        Ok(MigrationStatus {
            current: applied_versions.iter().next_back().copied().unwrap_or(0),
            pending: loaded
                .difference(&applied_versions)
                .filter_map(|&v| set.get(v).map(|m| (v, m.name().to_string())))
                .collect(),
            missing: applied_versions.difference(&loaded).copied().collect(),
            applied,
        })
    }

    /// Computes the plan for reaching `target`.
    pub async fn plan(&self, set: &MigrationSet, target: i64) -> Result<MigrationPlan> {
        let applied = self.applied_versions().await?;
        Ok(MigrationPlan::compute(&set.versions(), &applied, target))
    }

    /// Counts the steps a run to `target` would execute by running it with
    /// every mutating statement suppressed.
    pub async fn count_steps(&self, set: &MigrationSet, target: i64) -> Result<usize> {
        let plan = self.plan(set, target).await?;
        self.dry_count(set, &plan).await
    }

    async fn dry_count(&self, set: &MigrationSet, plan: &MigrationPlan) -> Result<usize> {
        let Some(direction) = plan.direction else {
            return Ok(0);
        };
        let config = Arc::new(MigratorConfig {
            dry_run: true,
            ..(*self.config).clone()
        });

        let mut count = 0;
        for &version in &plan.versions {
            let Some(migration) = set.get(version) else {
                continue;
            };
            let mut tx = SchemaTx::begin(&self.pool, Arc::clone(&self.dialect), Arc::clone(&config))
                .await?;
            let result = self
                .run_in(&mut tx, set, migration, direction, count == 0)
                .await;
            tx.rollback().await?;
            if let Err(err) = result {
                warn!(version, error = %err, "Step fails under dry run, counting it anyway");
            }
            count += 1;
        }
        Ok(count)
    }

    /// Applies every loaded migration above the current version.
    pub async fn migrate_latest(&self, set: &MigrationSet) -> Result<MigrationReport> {
        let current = self.current_version().await?;
        let target = set.latest().unwrap_or(0).max(current);
        self.migrate_to(set, target).await
    }

    /// Moves the database to `target`, applying or reverting steps.
    pub async fn migrate_to(&self, set: &MigrationSet, target: i64) -> Result<MigrationReport> {
        self.init().await?;
        let plan = self.plan(set, target).await?;

        for version in plan.missing.iter().filter(|v| !plan.versions.contains(v)) {
            warn!(version, "No migration loaded for applied version, keeping its marker");
        }

        let mut report = MigrationReport {
            from: plan.current,
            to: plan.target,
            outcomes: Vec::new(),
        };
        let Some(direction) = plan.direction else {
            info!(version = plan.current, "Database is up to date");
            return Ok(report);
        };

        let progress = match self.progress {
            Some(ref callback) => {
                let total = self.dry_count(set, &plan).await?;
                let mut progress = Progress::new(total, Some(Arc::clone(callback)));
                progress.start();
                Some(Arc::new(Mutex::new(progress)))
            }
            None => None,
        };

        info!(
            from = plan.current,
            to = plan.target,
            direction = %direction,
            steps = plan.versions.len(),
            "Migration run started"
        );

        let mut first = true;
        for &version in &plan.versions {
            let Some(migration) = set.get(version) else {
                warn!(version, "No migration loaded for version, skipping");
                report.outcomes.push(StepOutcome::Missing(version));
                continue;
            };

            self.execute_step(set, migration, direction, first, progress.as_ref())
                .await?;
            first = false;

            if let Some(ref progress) = progress {
                if let Ok(mut progress) = progress.lock() {
                    progress.complete_step();
                }
            }
            report.outcomes.push(match direction {
                Direction::Up => StepOutcome::Applied(version),
                Direction::Down => StepOutcome::Reverted(version),
            });
        }

        info!(
            version = plan.target,
            executed = report.executed(),
            "Migration run finished"
        );
        Ok(report)
    }

    async fn execute_step(
        &self,
        set: &MigrationSet,
        migration: &dyn Migration,
        direction: Direction,
        run_hook: bool,
        progress: Option<&Arc<Mutex<Progress>>>,
    ) -> Result<()> {
        let version = migration.version();
        info!(version, name = %migration.name(), direction = %direction, "Running migration");

        let mut tx = self.begin().await?.with_progress(progress.cloned());
        let outcome = match self.run_in(&mut tx, set, migration, direction, run_hook).await {
            Ok(()) => tx.commit().await,
            Err(err) => {
                error!(version, name = %migration.name(), error = %err, "Migration step failed");
                error!(version, "Rolling back migration step");
                if let Err(rollback) = tx.rollback().await {
                    error!(version, error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        };

        outcome.map_err(|source| MigrateError::StepFailed {
            version,
            name: migration.name().to_string(),
            direction,
            source: Box::new(source),
        })
    }

    async fn run_in(
        &self,
        tx: &mut SchemaTx,
        set: &MigrationSet,
        migration: &dyn Migration,
        direction: Direction,
        run_hook: bool,
    ) -> Result<()> {
        let version = migration.version();
        if run_hook {
            if let Some(hook) = set.init_hook() {
                info!("Running initialization hook");
                hook.run(tx).await?;
            }
        }

        match direction {
            Direction::Up => {
                migration.up(tx).await?;
                tx.record_applied(&self.history, version, migration.name())
                    .await?;
            }
            Direction::Down => {
                migration.down(tx).await?;
                tx.record_unapplied(&self.history, version).await?;
            }
        }

        if direction == Direction::Up && tx.config().verify_after_apply && !tx.is_dry_run() {
            let violations = tx.verify().await?;
            if !violations.is_empty() {
                return Err(MigrateError::PostApplyConsistency {
                    version,
                    violations,
                });
            }
        }
        Ok(())
    }
}
