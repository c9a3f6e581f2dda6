//! # Database Handle
//!
//! Opens the SQLite store behind the tax engine and hands out repositories.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::new(DbConfig)                                                │
//! │                                                                         │
//! │  1. connect      levy.db (created on first use) or :memory:            │
//! │                  WAL journal, NORMAL sync, foreign keys, busy timeout   │
//! │  2. migrate      migrations/sqlite/*.sql           (run_migrations)     │
//! │  3. seed         percentage / no_tax / fixed_tax   (run_migrations)     │
//! │                                                                         │
//! │  ┌────────────┐   regions()  tax_types()  tax_rates()                  │
//! │  │  Database  │── tax_definitions()  tax_methods()  tax_lines()        │
//! │  │ SqlitePool │                                                        │
//! │  └────────────┘   every repository clones the same pool                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rate lookups keep reading under WAL while `TaxLineRepository::apply`
//! holds its write transaction; concurrent writers wait up to
//! `busy_timeout` for the lock.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{
    DefinitionRepository, RegionRepository, TaxLineRepository, TaxMethodRepository,
    TaxRateRepository, TaxTypeRepository,
};
use crate::seed;

const MEMORY: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// How to open the tax store.
///
/// Usually built from `[database]` by [`crate::LevyConfig::db_config`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool size. In-memory stores are pinned to one connection.
    pub max_connections: u32,

    /// How long a writer waits for another writer's lock.
    pub busy_timeout: Duration,

    /// Time allowed to acquire a pooled connection.
    pub acquire_timeout: Duration,

    /// Apply migrations and seed the built-in tax methods on open.
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
            run_migrations: true,
        }
    }

    /// A private in-memory store. Every call gives a fresh, empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            ..Self::new(MEMORY)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(MEMORY)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Open tax store.
///
/// Cheap to clone: every repository shares the same pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
/// let region = TaxRegion::new("UAE");
/// db.regions().save(&region).await?;
/// let types = db.tax_types().list_for_region(&region.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the store, then migrates and seeds it when `run_migrations`
    /// is set.
    ///
    /// ## Returns
    /// * `Err(DbError::ConnectionFailed)` - bad path or SQLite refused to open
    /// * `Err(DbError::MigrationFailed)` - a migration did not apply
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening tax store");

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}?mode=rwc",
            config.database_path.display()
        ))
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        // tax_types → tax_regions, tax_rates → tax_types, ...
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // Dropping the last connection drops the database
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(max_connections = config.max_connections, "Pool ready");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
            seed::ensure_tax_methods(&db.pool).await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn regions(&self) -> RegionRepository {
        RegionRepository::new(self.pool.clone())
    }

    pub fn tax_types(&self) -> TaxTypeRepository {
        TaxTypeRepository::new(self.pool.clone())
    }

    pub fn tax_rates(&self) -> TaxRateRepository {
        TaxRateRepository::new(self.pool.clone())
    }

    pub fn tax_definitions(&self) -> DefinitionRepository {
        DefinitionRepository::new(self.pool.clone())
    }

    pub fn tax_methods(&self) -> TaxMethodRepository {
        TaxMethodRepository::new(self.pool.clone())
    }

    /// Tax lines are only written through [`TaxLineRepository::apply`].
    pub fn tax_lines(&self) -> TaxLineRepository {
        TaxLineRepository::new(self.pool.clone())
    }

    /// Closes every connection. Later queries fail with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing tax store");
        self.pool.close().await;
    }

    /// Whether a trivial query still succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        db.close().await;
        assert!(!db.health_check().await);
    }

    #[tokio::test]
    async fn test_in_memory_stores_are_isolated() {
        let a = Database::new(DbConfig::in_memory()).await.unwrap();
        let b = Database::new(DbConfig::in_memory()).await.unwrap();

        a.regions().save(&levy_core::TaxRegion::new("UAE")).await.unwrap();
        assert_eq!(a.regions().list().await.unwrap().len(), 1);
        assert!(b.regions().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_built_in_methods_seeded_on_open() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut kinds: Vec<_> = db
            .tax_methods()
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.kind)
            .collect();
        kinds.sort();
        assert_eq!(kinds, vec!["fixed_tax", "no_tax", "percentage"]);
    }

    #[tokio::test]
    async fn test_no_schema_when_migrations_disabled() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        assert!(db.tax_methods().list().await.is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/var/lib/levy/levy.db")
            .max_connections(8)
            .busy_timeout(Duration::from_millis(250))
            .run_migrations(false);

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
