//! # levy-core: Pure Tax Logic for Levy
//!
//! Rate resolution, tax computation and tax-line reconciliation as pure
//! functions over in-memory values. Storage lives in `levy-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Levy Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Calling document (GRN line, invoice, ...)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ compute_tax / apply                    │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                levy-db::TaxEngine (async, SQLite)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ levy-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   rate    │  │ reconcile │  │   │
//! │  │   │  TaxType  │  │   Money   │  │  as-of    │  │  insert/  │  │   │
//! │  │   │  TaxRate  │  │ Currency  │  │  lookup   │  │  update/  │  │   │
//! │  │   │   Tax     │  │Percentage │  │  caches   │  │  delete   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                 │   │
//! │  │   │  method   │  │   cache   │  │validation │                 │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                 │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO GLOBAL STATE                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Tax entities (TaxRegion, TaxType, TaxRate, Tax, ...)
//! - [`money`] - Integer money, currencies, basis-point percentages, conversion
//! - [`method`] - Tax method strategies and their registry
//! - [`rate`] - As-of rate resolution with caching
//! - [`reconcile`] - Tax-line reconciliation
//! - [`cache`] - Keyed cache used by the resolvers
//! - [`error`] - Domain error types
//! - [`validation`] - Entity validation
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use levy_core::money::Percentage;
//! use levy_core::rate::RateResolver;
//! use levy_core::types::TaxRate;
//!
//! let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
//! let rows = vec![
//!     TaxRate::new("vat", Percentage::from_percent(7), d(2023, 1, 1)),
//!     TaxRate::new("vat", Percentage::from_percent(5), d(2020, 1, 1)),
//! ];
//!
//! let resolver = RateResolver::new();
//! let epoch = resolver.epoch();
//! assert_eq!(resolver.select("vat", d(2022, 6, 1), &rows, epoch), Percentage::from_percent(5));
//! assert_eq!(resolver.select("vat", d(2019, 1, 1), &rows, epoch), Percentage::zero());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod method;
pub mod money;
pub mod rate;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cache::EntityCache;
pub use error::{CoreError, CoreResult, ValidationError};
pub use method::{MethodRegistry, TaxInput, TaxMethod};
pub use money::{Currency, CurrencyConverter, ExchangeRates, Money, Percentage};
pub use rate::{Epoch, RateResolver};
pub use reconcile::{reconcile, Assessment, TaxReconciliation};
pub use types::*;
