//! # Repository Module
//!
//! Database repository implementations for Levy.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  TaxEngine (caches)                                                    │
//! │       │                                                                 │
//! │       │  db.tax_rates().list_for_type("vat")                           │
//! │       ▼                                                                 │
//! │  TaxRateRepository                                                     │
//! │  ├── save(&self, &mut rate)      ← write-once checks, then upsert      │
//! │  ├── get_by_id(&self, id)                                              │
//! │  └── list_for_type(&self, type)  ← newest first                        │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Repositories never cache; the engine owns every cache.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`RegionRepository`] - Tax regions and the default region
//! - [`TaxTypeRepository`] - Tax types per region
//! - [`TaxRateRepository`] - Effective-dated rates
//! - [`DefinitionRepository`] - Category → type mappings
//! - [`TaxMethodRepository`] - Persisted method records
//! - [`TaxLineRepository`] - Tax lines of parent documents

pub mod definition;
pub mod region;
pub mod tax_line;
pub mod tax_method;
pub mod tax_rate;
pub mod tax_type;

pub use definition::DefinitionRepository;
pub use region::RegionRepository;
pub use tax_line::TaxLineRepository;
pub use tax_method::TaxMethodRepository;
pub use tax_rate::TaxRateRepository;
pub use tax_type::TaxTypeRepository;
