//! # Levy Configuration
//!
//! Configuration for the database, the engine caches and default-region
//! handling.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LEVY_DB_PATH=/var/lib/levy/levy.db                                 │
//! │     LEVY_DB_MAX_CONNECTIONS=8                                          │
//! │     LEVY_CACHE_MAX_ENTRIES=10000                                       │
//! │     LEVY_DEFAULT_REGION_POLICY=pinned                                  │
//! │     LEVY_BASE_CURRENCY=AED                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ./levy.toml unless a path is given                                 │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "levy.db"
//! max_connections = 5
//! run_migrations = true
//!
//! [cache]
//! max_entries = 0          # 0 = unbounded
//!
//! [region]
//! default_policy = "refresh"   # refresh | pinned
//!
//! [currency]
//! base = "AED"
//! rates = { USD = 3672500, EUR = 3990000 }   # base units per foreign unit, 6 decimals
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use levy_core::{Currency, ExchangeRates};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Default Region Policy
// =============================================================================

/// When the cached default region is dropped.
///
/// ```text
/// REFRESH (default)                    PINNED
/// ─────────────────                    ──────
/// • cleared whenever a region is       • loaded once per engine
///   saved through the engine           • survives region edits
/// • next lookup re-reads the first     • only invalidate_default_region()
///   active region                        clears it
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRegionPolicy {
    #[default]
    Refresh,
    Pinned,
}

impl std::fmt::Display for DefaultRegionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultRegionPolicy::Refresh => write!(f, "refresh"),
            DefaultRegionPolicy::Pinned => write!(f, "pinned"),
        }
    }
}

impl std::str::FromStr for DefaultRegionPolicy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "refresh" => Ok(DefaultRegionPolicy::Refresh),
            "pinned" | "pin" => Ok(DefaultRegionPolicy::Pinned),
            other => Err(DbError::InvalidConfig(format!(
                "Unknown default region policy: '{}'. Valid options: refresh, pinned",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run migrations and seed built-in tax methods on connect.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("levy.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Upper bound per engine cache. 0 keeps every entry.
    #[serde(default)]
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn capacity(&self) -> Option<usize> {
        (self.max_entries > 0).then_some(self.max_entries)
    }
}

/// `[region]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionSettings {
    #[serde(default)]
    pub default_policy: DefaultRegionPolicy,
}

/// `[currency]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    /// Base currency the rates are quoted against.
    #[serde(default = "default_base_currency")]
    pub base: String,

    /// Base units per unit of each foreign currency, 6 decimal places.
    #[serde(default)]
    pub rates: BTreeMap<String, i64>,
}

fn default_base_currency() -> String {
    "USD".to_string()
}

impl Default for CurrencySettings {
    fn default() -> Self {
        CurrencySettings {
            base: default_base_currency(),
            rates: BTreeMap::new(),
        }
    }
}

impl CurrencySettings {
    /// Builds the exchange rate table.
    pub fn exchange_rates(&self) -> DbResult<ExchangeRates> {
        let base: Currency = self.base.parse()?;
        let mut rates = ExchangeRates::new(base);
        for (code, micros) in &self.rates {
            rates = rates.with_rate(code.parse()?, *micros);
        }
        Ok(rates)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete Levy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevyConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub region: RegionSettings,

    #[serde(default)]
    pub currency: CurrencySettings,
}

impl LevyConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`levy.toml` unless `config_path` is given)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            info!(?path, "Loading levy config from file");
            let contents = std::fs::read_to_string(&path)?;
            config = Self::from_toml(&contents)?;
        } else {
            debug!(?path, "Config file not found, using defaults");
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load levy config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml(contents: &str) -> DbResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(DbError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if let Some((code, _)) = self.currency.rates.iter().find(|(_, r)| **r <= 0) {
            return Err(DbError::InvalidConfig(format!(
                "currency.rates.{} must be positive",
                code
            )));
        }

        // Currency codes
        self.currency.exchange_rates().map_err(|e| DbError::InvalidConfig(e.to_string()))?;

        Ok(())
    }

    /// Applies `LEVY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("LEVY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = var("LEVY_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid LEVY_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(max) = var("LEVY_CACHE_MAX_ENTRIES") {
            match max.parse::<usize>() {
                Ok(n) => self.cache.max_entries = n,
                Err(_) => warn!(value = %max, "Ignoring invalid LEVY_CACHE_MAX_ENTRIES"),
            }
        }

        if let Some(policy) = var("LEVY_DEFAULT_REGION_POLICY") {
            match policy.parse() {
                Ok(parsed) => {
                    debug!(policy = %policy, "Overriding default region policy from environment");
                    self.region.default_policy = parsed;
                }
                Err(_) => warn!(policy = %policy, "Unknown default region policy in environment"),
            }
        }

        if let Some(base) = var("LEVY_BASE_CURRENCY") {
            self.currency.base = base;
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("levy.toml")
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.database.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory().run_migrations(self.database.run_migrations);
        }
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .run_migrations(self.database.run_migrations)
    }

    /// Configuration for tests: in-memory database, defaults elsewhere.
    pub fn in_memory() -> Self {
        LevyConfig {
            database: DatabaseSettings {
                path: PathBuf::from(":memory:"),
                max_connections: 1,
                run_migrations: true,
            },
            ..Self::default()
        }
    }
}
