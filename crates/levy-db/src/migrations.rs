//! # Schema Migrations
//!
//! SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied in file-name order by `Database::new`. sqlx records each applied
//! file (with its checksum) in `_sqlx_migrations`, so re-running is a no-op
//! and an edited, already-applied file is reported as `MigrationFailed`.
//!
//! | File                 | Creates                                              |
//! |----------------------|------------------------------------------------------|
//! | `001_tax_schema.sql` | regions, methods, types, rates, definitions, lines   |
//!
//! New schema changes go into a new `NNN_*.sql` file; applied files are
//! never edited.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(available = MIGRATOR.migrations.len(), "Applying migrations");
    MIGRATOR.run(pool).await?;
    info!("Tax schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts. A store that was never migrated
/// reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((embedded, applied as usize))
}
