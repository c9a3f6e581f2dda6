//! # Domain Types
//!
//! Tax entities used throughout Levy.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tax Entities                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   TaxRegion     │◄──│    TaxType      │──►│ TaxMethodRecord │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  name, active   │   │  display_order  │   │  kind (registry │       │
//! │  └─────────────────┘   │  applicable     │   │  key)           │       │
//! │          ▲             │  period         │   └─────────────────┘       │
//! │          │             └────────┬────────┘                              │
//! │  ┌───────┴─────────┐            │            ┌─────────────────┐       │
//! │  │ TaxDefinition   │────────────┤            │    TaxRate      │       │
//! │  │  category +     │            └───────────►│  rate (bps)     │       │
//! │  │  region → type  │                         │  effective_from │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Tax (tax line): linked to a parent document, produced only by │   │
//! │  │  reconciliation                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write-once references
//! A stored `TaxRate` never changes its type or rate, and a stored `TaxType`
//! never changes its region or method. Records built with `new` are
//! editable until the repository marks them persisted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Percentage};

/// First day a tax type applies to unless configured otherwise.
pub fn default_applicable_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Last day a tax type applies to unless configured otherwise.
pub fn default_applicable_to() -> NaiveDate {
    NaiveDate::from_ymd_opt(2999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Generates a new entity ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Tax Region
// =============================================================================

/// A jurisdiction grouping tax types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxRegion {
    pub id: String,
    pub name: String,
    /// Inactive regions are never picked as the default region.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaxRegion {
    /// Creates a new, active region.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        TaxRegion {
            id: generate_id(),
            name: name.into(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Tax Method Record
// =============================================================================

/// A persisted tax computation method.
///
/// `kind` is the registry key of the strategy (see [`crate::method`]).
/// Exactly one record exists per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxMethodRecord {
    pub id: String,
    pub name: String,
    pub kind: String,
    /// Amount charged by the fixed-tax method, in minor units of the local
    /// currency. Ignored by other kinds.
    pub fixed_amount_minor: i64,
}

impl TaxMethodRecord {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        TaxMethodRecord {
            id: generate_id(),
            name: name.into(),
            kind: kind.into(),
            fixed_amount_minor: 0,
        }
    }
}

// =============================================================================
// Tax Type
// =============================================================================

/// A kind of tax (VAT, excise, ...) within one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxType {
    pub id: String,
    pub name: String,
    region_id: String,
    tax_method_id: Option<String>,
    pub display_order: i32,
    pub applicable_from: NaiveDate,
    pub applicable_to: NaiveDate,
    #[serde(skip)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    is_new: bool,
}

impl TaxType {
    /// Creates a new tax type for a region, applicable over the default
    /// period. Without a method the percentage method is assigned on save.
    pub fn new(name: impl Into<String>, region_id: impl Into<String>) -> Self {
        TaxType {
            id: generate_id(),
            name: name.into(),
            region_id: region_id.into(),
            tax_method_id: None,
            display_order: 0,
            applicable_from: default_applicable_from(),
            applicable_to: default_applicable_to(),
            is_new: true,
        }
    }

    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    pub fn tax_method_id(&self) -> Option<&str> {
        self.tax_method_id.as_deref()
    }

    /// Moves the type to another region. Only allowed before it is stored.
    pub fn set_region(&mut self, region_id: impl Into<String>) -> CoreResult<()> {
        let region_id = region_id.into();
        if !self.is_new && region_id != self.region_id {
            return Err(CoreError::set_not_allowed("Region"));
        }
        self.region_id = region_id;
        Ok(())
    }

    /// Sets the computation method. Only allowed before it is stored.
    pub fn set_tax_method(&mut self, method_id: impl Into<String>) -> CoreResult<()> {
        let method_id = method_id.into();
        if !self.is_new && self.tax_method_id.as_deref() != Some(method_id.as_str()) {
            return Err(CoreError::set_not_allowed("Tax Method"));
        }
        self.tax_method_id = Some(method_id);
        Ok(())
    }

    /// Whether the type applies on `date`.
    pub fn is_applicable_on(&self, date: NaiveDate) -> bool {
        self.applicable_from <= date && date <= self.applicable_to
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Called by the repository once the type is stored.
    pub fn mark_persisted(&mut self) {
        self.is_new = false;
    }
}

// =============================================================================
// Tax Rate
// =============================================================================

/// A percentage rate for a tax type, effective from a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxRate {
    pub id: String,
    type_id: String,
    rate: Percentage,
    pub effective_from: NaiveDate,
    #[serde(skip)]
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    is_new: bool,
}

impl TaxRate {
    pub fn new(type_id: impl Into<String>, rate: Percentage, effective_from: NaiveDate) -> Self {
        TaxRate {
            id: generate_id(),
            type_id: type_id.into(),
            rate,
            effective_from,
            is_new: true,
        }
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn rate(&self) -> Percentage {
        self.rate
    }

    /// Changes the rate. A stored rate is immutable; add a new effective
    /// date instead.
    pub fn set_rate(&mut self, rate: Percentage) -> CoreResult<()> {
        if !self.is_new {
            return Err(CoreError::set_not_allowed("Rate"));
        }
        self.rate = rate;
        Ok(())
    }

    pub fn set_type(&mut self, type_id: impl Into<String>) -> CoreResult<()> {
        let type_id = type_id.into();
        if !self.is_new && type_id != self.type_id {
            return Err(CoreError::set_not_allowed("Type"));
        }
        self.type_id = type_id;
        Ok(())
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn mark_persisted(&mut self) {
        self.is_new = false;
    }
}

// =============================================================================
// Tax Definition
// =============================================================================

/// Maps an item tax category within a region to one applicable tax type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TaxDefinition {
    pub id: String,
    pub category: String,
    pub region_id: String,
    pub type_id: String,
}

impl TaxDefinition {
    pub fn new(
        category: impl Into<String>,
        region_id: impl Into<String>,
        type_id: impl Into<String>,
    ) -> Self {
        TaxDefinition {
            id: generate_id(),
            category: category.into(),
            region_id: region_id.into(),
            type_id: type_id.into(),
        }
    }
}

// =============================================================================
// Item Type
// =============================================================================

/// The taxable item being priced. Only its tax category matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: String,
    pub name: String,
    pub tax_category: String,
}

// =============================================================================
// Tax Line
// =============================================================================

/// What reconciliation decided about a tax line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxLineStatus {
    /// Stored line is still correct.
    #[default]
    Unchanged,
    /// Line did not exist and must be inserted.
    New,
    /// Stored line got a new rate or amount and must be updated.
    Recomputed,
    /// Stored line belongs to another region and must be deleted.
    RegionChanged,
    /// Stored line's type no longer applies and must be deleted.
    NotApplicable,
}

impl TaxLineStatus {
    /// Numeric code as used by document processing (0..=4).
    pub const fn code(&self) -> u8 {
        match self {
            TaxLineStatus::Unchanged => 0,
            TaxLineStatus::New => 1,
            TaxLineStatus::Recomputed => 2,
            TaxLineStatus::RegionChanged => 3,
            TaxLineStatus::NotApplicable => 4,
        }
    }

    pub const fn is_delete(&self) -> bool {
        matches!(self, TaxLineStatus::RegionChanged | TaxLineStatus::NotApplicable)
    }
}

/// A computed tax line attached to a parent document.
///
/// Tax lines are only written through reconciliation: `validate` fails
/// unless the line carries the internal flag reconciliation sets, and the
/// flag is cleared again by `mark_saved`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tax {
    id: String,
    parent_id: String,
    region_id: String,
    type_id: String,
    rate: Percentage,
    tax: Money,
    #[serde(skip)]
    status: TaxLineStatus,
    #[serde(skip)]
    internal: bool,
}

impl Tax {
    /// Rebuilds a line read from storage.
    pub fn stored(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        region_id: impl Into<String>,
        type_id: impl Into<String>,
        rate: Percentage,
        tax: Money,
    ) -> Self {
        Tax {
            id: id.into(),
            parent_id: parent_id.into(),
            region_id: region_id.into(),
            type_id: type_id.into(),
            rate,
            tax,
            status: TaxLineStatus::Unchanged,
            internal: false,
        }
    }

    pub(crate) fn computed(parent_id: &str, tax_type: &TaxType, rate: Percentage, tax: Money) -> Self {
        Tax {
            id: generate_id(),
            parent_id: parent_id.to_string(),
            region_id: tax_type.region_id().to_string(),
            type_id: tax_type.id.clone(),
            rate,
            tax,
            status: TaxLineStatus::New,
            internal: true,
        }
    }

    pub(crate) fn recompute(&mut self, rate: Percentage, tax: Money) {
        self.rate = rate;
        self.tax = tax;
        self.status = TaxLineStatus::Recomputed;
        self.internal = true;
    }

    pub(crate) fn mark_stale(&mut self, status: TaxLineStatus) {
        self.status = status;
        self.internal = true;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn rate(&self) -> Percentage {
        self.rate
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn status(&self) -> TaxLineStatus {
        self.status
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Checks the line may be written.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.internal {
            return Err(CoreError::InvalidState("Illegal access".to_string()));
        }
        if self.parent_id.is_empty() {
            return Err(CoreError::invalid_value("Parent"));
        }
        if self.type_id.is_empty() {
            return Err(CoreError::invalid_value("Type"));
        }
        Ok(())
    }

    /// Called by the repository after the line was written or deleted.
    pub fn mark_saved(&mut self) {
        self.internal = false;
        self.status = TaxLineStatus::Unchanged;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_tax_rate_is_write_once() {
        let mut rate = TaxRate::new("vat", Percentage::from_percent(5), date(2020, 1, 1));
        assert!(rate.set_rate(Percentage::from_percent(7)).is_ok());

        rate.mark_persisted();
        let err = rate.set_rate(Percentage::from_percent(9)).unwrap_err();
        assert!(matches!(err, CoreError::SetNotAllowed { ref field } if field == "Rate"));
        assert_eq!(rate.rate(), Percentage::from_percent(7));

        // Same type is a no-op, another type is refused
        assert!(rate.set_type("vat").is_ok());
        assert!(rate.set_type("excise").is_err());

        // Effective date stays editable
        rate.effective_from = date(2021, 1, 1);
    }

    #[test]
    fn test_tax_type_region_is_write_once() {
        let mut tt = TaxType::new("VAT", "uae");
        assert!(tt.set_region("ksa").is_ok());
        tt.mark_persisted();
        assert!(tt.set_region("uae").is_err());
        assert!(tt.set_tax_method("percentage").is_err());
    }

    #[test]
    fn test_tax_type_applicable_period() {
        let mut tt = TaxType::new("VAT", "uae");
        assert!(tt.is_applicable_on(date(2024, 6, 1)));
        tt.applicable_from = date(2025, 1, 1);
        assert!(!tt.is_applicable_on(date(2024, 6, 1)));
        assert!(tt.is_applicable_on(date(2025, 1, 1)));
    }

    #[test]
    fn test_stored_tax_cannot_be_validated() {
        let aed: Currency = "AED".parse().unwrap();
        let tax = Tax::stored(
            "t1",
            "grn-1",
            "uae",
            "vat",
            Percentage::from_percent(5),
            Money::from_minor(50, aed),
        );
        let err = tax.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid state: Illegal access");
    }

    #[test]
    fn test_computed_tax_validates_until_saved() {
        let aed: Currency = "AED".parse().unwrap();
        let tt = TaxType::new("VAT", "uae");
        let mut tax = Tax::computed("grn-1", &tt, Percentage::from_percent(5), Money::from_minor(50, aed));
        assert_eq!(tax.status(), TaxLineStatus::New);
        assert!(tax.validate().is_ok());

        tax.mark_saved();
        assert!(tax.validate().is_err());
        assert_eq!(tax.status(), TaxLineStatus::Unchanged);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TaxLineStatus::Unchanged.code(), 0);
        assert_eq!(TaxLineStatus::New.code(), 1);
        assert_eq!(TaxLineStatus::Recomputed.code(), 2);
        assert_eq!(TaxLineStatus::RegionChanged.code(), 3);
        assert_eq!(TaxLineStatus::NotApplicable.code(), 4);
        assert!(TaxLineStatus::RegionChanged.is_delete());
        assert!(!TaxLineStatus::Recomputed.is_delete());
    }

    #[test]
    fn test_tax_line_serializes_without_transient_fields() {
        let aed: Currency = "AED".parse().unwrap();
        let tt = TaxType::new("VAT", "uae");
        let tax = Tax::computed("grn-1", &tt, Percentage::from_percent(5), Money::from_minor(50, aed));
        let json = serde_json::to_value(&tax).unwrap();
        assert!(json.get("status").is_none());
        assert!(json.get("internal").is_none());
        assert_eq!(json["tax"]["currency"], "AED");
    }
}
