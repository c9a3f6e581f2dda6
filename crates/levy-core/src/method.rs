//! # Tax Methods
//!
//! Strategies that turn quantity, unit cost and rate into a tax amount.
//!
//! ## Strategy Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  kind          strategy          amount                                 │
//! │  ───────────   ───────────────   ─────────────────────────────────────  │
//! │  percentage    PercentageTax     round(convert(cost × qty × rate/100))  │
//! │  no_tax        NoTax             0                                      │
//! │  fixed_tax     FixedTax          configured amount                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Persisted `TaxMethodRecord`s name their strategy by `kind`; the
//! [`MethodRegistry`] maps kinds to factories. Additional kinds are added
//! with [`MethodRegistry::register`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::money::{Currency, CurrencyConverter, Money, Percentage};
use crate::types::{ItemType, TaxMethodRecord};

pub const PERCENTAGE: &str = "percentage";
pub const NO_TAX: &str = "no_tax";
pub const FIXED_TAX: &str = "fixed_tax";

/// Method records that must always exist, as `(name, kind)`.
pub const BUILTIN_METHODS: &[(&str, &str)] = &[
    ("Percentage", PERCENTAGE),
    ("NoTax", NO_TAX),
    ("FixedTax", FIXED_TAX),
];

/// Everything a strategy may look at.
pub struct TaxInput<'a> {
    pub item_type: &'a ItemType,
    pub quantity: i64,
    pub unit_cost: Money,
    pub local_currency: Currency,
    pub converter: &'a dyn CurrencyConverter,
}

/// A tax computation strategy.
pub trait TaxMethod: Send + Sync + fmt::Debug {
    /// Registry key of this strategy.
    fn kind(&self) -> &'static str;

    /// Computes the tax in the local currency.
    fn tax(&self, input: &TaxInput<'_>, rate: Percentage) -> CoreResult<Money>;

    /// Rounding convention applied to computed amounts. Identity by default.
    fn round(&self, amount: Money) -> Money {
        amount
    }
}

/// Percentage of the line cost, converted to the local currency.
#[derive(Debug, Default, Clone, Copy)]
pub struct PercentageTax;

impl TaxMethod for PercentageTax {
    fn kind(&self) -> &'static str {
        PERCENTAGE
    }

    fn tax(&self, input: &TaxInput<'_>, rate: Percentage) -> CoreResult<Money> {
        let raw = input.unit_cost.percent_of_quantity(input.quantity, rate)?;
        let local = input.converter.convert(raw, input.local_currency)?;
        Ok(self.round(local))
    }
}

/// Always zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTax;

impl TaxMethod for NoTax {
    fn kind(&self) -> &'static str {
        NO_TAX
    }

    fn tax(&self, input: &TaxInput<'_>, _rate: Percentage) -> CoreResult<Money> {
        Ok(Money::zero(input.local_currency))
    }
}

/// A constant amount per line, whatever the quantity, cost or rate.
#[derive(Debug, Clone, Copy)]
pub struct FixedTax {
    amount_minor: i64,
}

impl FixedTax {
    pub fn new(amount_minor: i64) -> Self {
        FixedTax { amount_minor }
    }
}

impl TaxMethod for FixedTax {
    fn kind(&self) -> &'static str {
        FIXED_TAX
    }

    fn tax(&self, input: &TaxInput<'_>, _rate: Percentage) -> CoreResult<Money> {
        Ok(self.round(Money::from_minor(self.amount_minor, input.local_currency)))
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Builds a strategy from its persisted record.
pub type MethodFactory = fn(&TaxMethodRecord) -> Arc<dyn TaxMethod>;

/// Maps method kinds to strategy factories.
#[derive(Clone)]
pub struct MethodRegistry {
    factories: HashMap<String, MethodFactory>,
}

impl MethodRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        MethodRegistry {
            factories: HashMap::new(),
        }
    }

    /// A registry with the percentage, no-tax and fixed-tax strategies.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(PERCENTAGE, |_| Arc::new(PercentageTax));
        registry.register(NO_TAX, |_| Arc::new(NoTax));
        registry.register(FIXED_TAX, |record| Arc::new(FixedTax::new(record.fixed_amount_minor)));
        registry
    }

    /// Registers (or replaces) the factory for a kind.
    pub fn register(&mut self, kind: impl Into<String>, factory: MethodFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Builds the strategy for a record.
    pub fn build(&self, record: &TaxMethodRecord) -> CoreResult<Arc<dyn TaxMethod>> {
        let factory = self
            .factories
            .get(&record.kind)
            .ok_or_else(|| CoreError::UnknownTaxMethod(record.kind.clone()))?;
        debug!(method = %record.name, kind = %record.kind, "Building tax method");
        Ok(factory(record))
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("MethodRegistry").field("kinds", &kinds).finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::ExchangeRates;

    fn item() -> ItemType {
        ItemType {
            id: "item-1".to_string(),
            name: "Soft drink".to_string(),
            tax_category: "1".to_string(),
        }
    }

    fn aed() -> Currency {
        "AED".parse().unwrap()
    }

    #[test]
    fn test_percentage_tax() {
        let item = item();
        let rates = ExchangeRates::new(aed());
        let input = TaxInput {
            item_type: &item,
            quantity: 4,
            unit_cost: Money::from_minor(1250, aed()),
            local_currency: aed(),
            converter: &rates,
        };
        // 4 × 12.50 × 7% = 3.50
        let tax = PercentageTax.tax(&input, Percentage::from_percent(7)).unwrap();
        assert_eq!(tax, Money::from_minor(350, aed()));
    }

    #[test]
    fn test_percentage_tax_converts_to_local_currency() {
        let item = item();
        let usd: Currency = "USD".parse().unwrap();
        let rates = ExchangeRates::new(aed()).with_rate(usd, 3_672_500);
        let input = TaxInput {
            item_type: &item,
            quantity: 10,
            unit_cost: Money::from_minor(1000, usd),
            local_currency: aed(),
            converter: &rates,
        };
        // USD 100 × 5% = USD 5.00 → AED 18.3625 → 18.36
        let tax = PercentageTax.tax(&input, Percentage::from_percent(5)).unwrap();
        assert_eq!(tax, Money::from_minor(1836, aed()));
    }

    #[test]
    fn test_percentage_tax_overflow_is_an_error() {
        let item = item();
        let rates = ExchangeRates::new(aed());
        let input = TaxInput {
            item_type: &item,
            quantity: 1_000,
            unit_cost: Money::from_minor(i64::MAX / 2, aed()),
            local_currency: aed(),
            converter: &rates,
        };
        let err = PercentageTax.tax(&input, Percentage::from_percent(100)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { .. }));
    }

    #[test]
    fn test_fixed_tax_ignores_inputs() {
        let item = item();
        let rates = ExchangeRates::new(aed());
        let method = FixedTax::new(500);
        for (quantity, cost, rate) in [(1, 100, 0), (1000, 99_999, 2500), (0, 0, 10_000)] {
            let input = TaxInput {
                item_type: &item,
                quantity,
                unit_cost: Money::from_minor(cost, aed()),
                local_currency: aed(),
                converter: &rates,
            };
            let tax = method.tax(&input, Percentage::from_bps(rate)).unwrap();
            assert_eq!(tax, Money::from_minor(500, aed()));
        }
    }

    #[test]
    fn test_no_tax_is_zero() {
        let item = item();
        let rates = ExchangeRates::new(aed());
        let input = TaxInput {
            item_type: &item,
            quantity: 3,
            unit_cost: Money::from_minor(1000, aed()),
            local_currency: aed(),
            converter: &rates,
        };
        assert!(NoTax.tax(&input, Percentage::from_percent(20)).unwrap().is_zero());
    }

    #[test]
    fn test_registry_builds_from_record() {
        let registry = MethodRegistry::with_builtins();
        for (name, kind) in BUILTIN_METHODS {
            let method = registry.build(&TaxMethodRecord::new(*name, *kind)).unwrap();
            assert_eq!(method.kind(), *kind);
        }

        let err = registry
            .build(&TaxMethodRecord::new("Slab", "slab"))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownTaxMethod(ref k) if k == "slab"));
    }

    #[test]
    fn test_registry_accepts_custom_kind() {
        #[derive(Debug)]
        struct WholeUnits;

        impl TaxMethod for WholeUnits {
            fn kind(&self) -> &'static str {
                "whole_units"
            }

            fn tax(&self, input: &TaxInput<'_>, rate: Percentage) -> CoreResult<Money> {
                PercentageTax.tax(input, rate).map(|m| self.round(m))
            }

            fn round(&self, amount: Money) -> Money {
                let scale = 10_i64.pow(amount.currency().minor_digits());
                let units = (amount.minor() + scale / 2) / scale;
                Money::from_minor(units * scale, amount.currency())
            }
        }

        let mut registry = MethodRegistry::with_builtins();
        registry.register("whole_units", |_| Arc::new(WholeUnits));
        let method = registry
            .build(&TaxMethodRecord::new("Whole", "whole_units"))
            .unwrap();

        let item = item();
        let rates = ExchangeRates::new(aed());
        let input = TaxInput {
            item_type: &item,
            quantity: 1,
            unit_cost: Money::from_minor(1250, aed()),
            local_currency: aed(),
            converter: &rates,
        };
        // 0.875 → 0.88 → 1.00
        let tax = method.tax(&input, Percentage::from_percent(7)).unwrap();
        assert_eq!(tax.minor(), 100);
    }
}
