//! oxide-rebuild CLI
//!
//! Inspects and migrates a database with no migrations linked in. Projects
//! build their own binary around [`oxide_rebuild::cli::run`].

use oxide_rebuild::migration::MigrationSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    oxide_rebuild::cli::run(MigrationSet::new(Vec::new())?).await
}
