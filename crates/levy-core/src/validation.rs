//! # Validation Module
//!
//! Validation of tax entities before they are written.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Entity setters (types.rs)                                    │
//! │  └── Write-once references (SetNotAllowed)                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required references, name lengths                                 │
//! │  └── Date periods, rate ranges                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (type, effective_from), UNIQUE (category, type)            │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use levy_core::validation::validate_name;
//!
//! assert!(validate_name("VAT").is_ok());
//! assert!(validate_name("  ").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{TaxDefinition, TaxMethodRecord, TaxRate, TaxRegion, TaxType};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Highest accepted rate: 100%.
pub const MAX_RATE_BPS: u32 = 10_000;

const MAX_NAME_LEN: usize = 100;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an entity name (regions, types, methods).
///
/// ## Rules
/// - Must not be empty
/// - At most 100 characters
pub fn validate_name(name: &str) -> ValidationResult<()> {
    required("name", name)?;

    if name.trim().chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use levy_core::validation::validate_uuid;
///
/// assert!(validate_uuid("region", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("region", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    required(field, id)?;

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Entity Validators
// =============================================================================

pub fn validate_region(region: &TaxRegion) -> ValidationResult<()> {
    validate_name(&region.name)
}

/// Validates a tax type.
///
/// ## Rules
/// - Name required
/// - Region required
/// - `applicable_from <= applicable_to`
pub fn validate_tax_type(tax_type: &TaxType) -> ValidationResult<()> {
    validate_name(&tax_type.name)?;
    required("region", tax_type.region_id())?;

    if tax_type.applicable_from > tax_type.applicable_to {
        return Err(ValidationError::InvalidPeriod {
            field: "Applicable Period".to_string(),
            from: tax_type.applicable_from,
            to: tax_type.applicable_to,
        });
    }

    Ok(())
}

/// Validates a tax rate.
///
/// ## Rules
/// - Type required
/// - Rate between 0% and 100%
pub fn validate_tax_rate(rate: &TaxRate) -> ValidationResult<()> {
    required("type", rate.type_id())?;

    if rate.rate().bps() > MAX_RATE_BPS {
        return Err(ValidationError::OutOfRange {
            field: "rate".to_string(),
            min: 0,
            max: MAX_RATE_BPS as i64,
        });
    }

    Ok(())
}

/// Validates a tax definition in isolation. The region match against the
/// type and the duplicate check need storage and live in the repository.
pub fn validate_tax_definition(definition: &TaxDefinition) -> ValidationResult<()> {
    required("category", &definition.category)?;
    required("region", &definition.region_id)?;
    required("type", &definition.type_id)?;
    Ok(())
}

pub fn validate_tax_method(method: &TaxMethodRecord) -> ValidationResult<()> {
    validate_name(&method.name)?;
    required("kind", &method.kind)?;

    if method.fixed_amount_minor < 0 {
        return Err(ValidationError::OutOfRange {
            field: "fixed amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
