//! # levy-db: Storage and Engine for Levy
//!
//! SQLite persistence for regions, tax types, rates, definitions, method
//! records and tax lines, plus the [`TaxEngine`] that computes and
//! reconciles tax lines against them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Levy Data Flow                                │
//! │                                                                         │
//! │  Document processing (GRN line saved)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     levy-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   TaxEngine   │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (engine.rs)  │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ RegionRepo    │    │              │  │   │
//! │  │   │ RateResolver  │───►│ TaxTypeRepo   │    │ 001_tax_     │  │   │
//! │  │   │ EntityCaches  │    │ TaxRateRepo   │    │   schema.sql │  │   │
//! │  │   │ MethodRegistry│    │ TaxLineRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                                │   │
//! │  └────────────────────────────────┼────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (Database / pool.rs)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `levy.toml` and `LEVY_*` environment overrides
//! - [`engine`] - Rate resolution, computation and reconciliation service
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`seed`] - Built-in tax method records
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use levy_db::{LevyConfig, TaxEngine, TaxRequest};
//!
//! let config = LevyConfig::load(None)?;
//! let engine = TaxEngine::open(&config).await?;
//!
//! let mut plan = engine.compute_tax(&request).await?;
//! let net_change = engine.apply(&mut plan, aed).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod seed;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DefaultRegionPolicy, LevyConfig};
pub use engine::{AppliedTaxes, TaxEngine, TaxRequest};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    DefinitionRepository, RegionRepository, TaxLineRepository, TaxMethodRepository,
    TaxRateRepository, TaxTypeRepository,
};
