//! # Ledger Schema Migrations
//!
//! The ledger schema ships inside the binary. `001_initial_schema.sql` creates
//! the five tables the allocator needs:
//!
//! ```text
//! prefixes ──< sequence_counters ──< sequence_reservations ──< reclaim_tasks
//! branches (initials for branch-scoped codes)
//! ```
//!
//! Later files in `migrations/sqlite/` run in filename order. A change to the
//! counter or reservation tables must keep `UNIQUE (counter_id, sequence_number)`
//! intact, since that constraint is the last line against a duplicate code.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Files under `migrations/sqlite`, embedded at compile time.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// How far the open database is behind the embedded schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migrations embedded in this build.
    pub total: usize,
    /// Migrations recorded in `_sqlx_migrations`.
    pub applied: usize,
}

impl MigrationStatus {
    /// True when every embedded migration has been applied.
    pub fn is_current(&self) -> bool {
        self.applied >= self.total
    }
}

/// Brings the ledger schema up to date. Already-applied files are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(embedded = MIGRATOR.migrations.len(), "Checking ledger schema");

    MIGRATOR.run(pool).await?;

    info!("Ledger schema up to date");
    Ok(())
}

/// Counts embedded and applied migrations.
///
/// A database that was opened without migrating has no `_sqlx_migrations`
/// table yet and reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok(MigrationStatus {
        total: MIGRATOR.migrations.len(),
        applied: applied as usize,
    })
}
