//! Migration steps.
//!
//! A step is a positive version number with an Up and a Down action. Both
//! actions receive the step's [`SchemaTx`] and issue all of their work
//! through it. Steps are either written by hand against [`Migration`] or
//! declared as a list of [`MigrationOperation`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use futures::future::BoxFuture;

use crate::error::{MigrateError, Result};
use crate::operations::{self, MigrationOperation};
use crate::provider::SchemaTx;

/// Direction a step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Apply (Up action).
    Up,
    /// Revert (Down action).
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// A versioned, reversible schema change.
pub trait Migration: Send + Sync {
    /// Version number; must be positive and unique within a set.
    fn version(&self) -> i64;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Applies the change.
    fn up<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>>;

    /// Reverts the change.
    fn down<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>>;
}

/// Runs once, before the first step a run actually executes.
pub trait InitHook: Send + Sync {
    /// Performs the initialization inside the first step's transaction.
    fn run<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>>;
}

/// A migration declared as a list of operations.
///
/// Down runs the reversed operations, last first.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMigration {
    version: i64,
    name: String,
    operations: Vec<MigrationOperation>,
}

impl OperationMigration {
    /// Creates an empty declarative migration.
    #[must_use]
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            operations: Vec::new(),
        }
    }

    /// Adds an operation to this migration.
    #[must_use]
    pub fn operation(mut self, op: MigrationOperation) -> Self {
        self.operations.push(op);
        self
    }

    /// Adds operations to this migration.
    #[must_use]
    pub fn operations(mut self, ops: Vec<MigrationOperation>) -> Self {
        self.operations.extend(ops);
        self
    }

    /// Returns the declared operations.
    #[must_use]
    pub fn declared(&self) -> &[MigrationOperation] {
        &self.operations
    }

    /// Returns whether this migration is reversible.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.operations.iter().all(MigrationOperation::is_reversible)
    }

    async fn run(&self, tx: &mut SchemaTx, operations: &[MigrationOperation]) -> Result<()> {
        let total = operations.len().max(1);
        for (i, op) in operations.iter().enumerate() {
            tx.apply(op).await?;
            let done = (i + 1) * 100 / total;
            tx.report_progress(u8::try_from(done).unwrap_or(100));
        }
        Ok(())
    }
}

impl Migration for OperationMigration {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn up<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(tx, &self.operations))
    }

    fn down<'a>(&'a self, tx: &'a mut SchemaTx) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let reversed = operations::reverse_all(&self.operations).ok_or_else(|| {
                MigrateError::NotReversible(format!("{} {}", self.version, self.name))
            })?;
            self.run(tx, &reversed).await
        })
    }
}

/// Trait for migrations defined as one struct per version.
pub trait DeclarativeMigration {
    /// Version number.
    const VERSION: i64;

    /// Migration name (e.g., "add_orders").
    const NAME: &'static str;

    /// Returns the migration operations.
    fn operations() -> Vec<MigrationOperation>;

    /// Converts to a runnable migration.
    fn to_migration() -> OperationMigration {
        OperationMigration::new(Self::VERSION, Self::NAME).operations(Self::operations())
    }
}

/// The loaded migrations, keyed by version.
pub struct MigrationSet {
    steps: BTreeMap<i64, Box<dyn Migration>>,
    init_hook: Option<Box<dyn InitHook>>,
}

impl fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSet")
            .field("versions", &self.steps.keys().collect::<Vec<_>>())
            .field("init_hook", &self.init_hook.is_some())
            .finish()
    }
}

impl MigrationSet {
    /// Builds a set, refusing duplicate or non-positive versions.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
        let mut steps = BTreeMap::new();
        for migration in migrations {
            let version = migration.version();
            if version <= 0 {
                return Err(MigrateError::InvalidVersion(version));
            }
            if steps.insert(version, migration).is_some() {
                return Err(MigrateError::DuplicateVersion(version));
            }
        }
        Ok(Self {
            steps,
            init_hook: None,
        })
    }

    /// Installs a hook run before the first executed step of a run.
    #[must_use]
    pub fn with_init_hook(mut self, hook: impl InitHook + 'static) -> Self {
        self.init_hook = Some(Box::new(hook));
        self
    }

    /// Gets the step for a version.
    #[must_use]
    pub fn get(&self, version: i64) -> Option<&dyn Migration> {
        self.steps.get(&version).map(|m| &**m)
    }

    /// Loaded versions in ascending order.
    #[must_use]
    pub fn versions(&self) -> BTreeSet<i64> {
        self.steps.keys().copied().collect()
    }

    /// Highest loaded version.
    #[must_use]
    pub fn latest(&self) -> Option<i64> {
        self.steps.keys().next_back().copied()
    }

    /// Number of loaded steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn init_hook(&self) -> Option<&dyn InitHook> {
        self.init_hook.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, SqlType};

    struct AddOrders;

    impl DeclarativeMigration for AddOrders {
        const VERSION: i64 = 1;
        const NAME: &'static str = "add_orders";

        fn operations() -> Vec<MigrationOperation> {
            vec![MigrationOperation::create_table(
                "orders",
                vec![ColumnSchema::new("id", SqlType::Integer).primary_key()],
                vec!["id".to_string()],
            )]
        }
    }

    fn boxed(version: i64) -> Box<dyn Migration> {
        Box::new(OperationMigration::new(version, format!("m{version}")))
    }

    #[test]
    fn test_declarative_migration() {
        let migration = AddOrders::to_migration();
        assert_eq!(migration.version(), 1);
        assert_eq!(migration.name(), "add_orders");
        assert_eq!(migration.declared().len(), 1);
        assert!(migration.is_reversible());
    }

    #[test]
    fn test_set_orders_versions() {
        let set = MigrationSet::new(vec![boxed(3), boxed(1), boxed(2)]).unwrap();
        assert_eq!(set.versions().into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(set.latest(), Some(3));
        assert_eq!(set.get(2).map(|m| m.name()), Some("m2"));
        assert!(set.get(4).is_none());
    }

    #[test]
    fn test_set_rejects_duplicate_version() {
        let err = MigrationSet::new(vec![boxed(1), boxed(2), boxed(2)]).unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateVersion(2)));
    }

    #[test]
    fn test_set_rejects_non_positive_version() {
        let err = MigrationSet::new(vec![boxed(0)]).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidVersion(0)));
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Up.to_string(), "up");
        assert_eq!(Direction::Down.to_string(), "down");
    }
}
