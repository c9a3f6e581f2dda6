//! # Error Types
//!
//! Domain-specific error types for levy-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  levy-core errors (this file)                                          │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  levy-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rate resolution has no error type at all: a missing rate resolves to a
//! zero percentage.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core tax logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A field was changed after the record was persisted.
    ///
    /// ## When This Occurs
    /// - Changing the rate or type of a stored `TaxRate`
    /// - Moving a stored `TaxType` to another region or tax method
    ///
    /// This is a programming error on the caller's side.
    #[error("Change not allowed: {field}")]
    SetNotAllowed { field: String },

    /// A required reference or value is missing or malformed.
    #[error("Invalid value: {field}")]
    InvalidValue { field: String },

    /// The operation is not allowed in the current state.
    ///
    /// ## When This Occurs
    /// - Validating a tax line that was not produced by reconciliation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No exchange rate is known for a currency pair.
    #[error("No exchange rate from {from} to {to}")]
    MissingExchangeRate { from: String, to: String },

    /// Two amounts in different currencies were combined.
    ///
    /// ## When This Occurs
    /// - Summing tax lines without converting them to one currency first
    #[error("Currency mismatch: {left} and {right}")]
    CurrencyMismatch { left: String, right: String },

    /// A tax method record names a kind nobody registered.
    #[error("Unknown tax method: {0}")]
    UnknownTaxMethod(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a SetNotAllowed error for the given field.
    pub fn set_not_allowed(field: impl Into<String>) -> Self {
        CoreError::SetNotAllowed {
            field: field.into(),
        }
    }

    /// Creates an InvalidValue error for the given field.
    pub fn invalid_value(field: impl Into<String>) -> Self {
        CoreError::InvalidValue {
            field: field.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before anything is written.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same tax type twice for a category).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// A date period ends before it starts.
    #[error("{field}: {from} is after {to}")]
    InvalidPeriod {
        field: String,
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
