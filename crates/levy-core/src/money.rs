//! # Money Module
//!
//! Provides `Money`, `Currency`, `Percentage` and currency conversion.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units + integer basis points               │
//! │    AED 12.50 = 1250 fils, 7% = 700 bps                                 │
//! │    Tax = 1250 × 700 / 10000 = 87.5 → rounded once, half up → 88        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use levy_core::money::{Currency, Money, Percentage};
//!
//! let aed: Currency = "AED".parse().unwrap();
//! let cost = Money::from_minor(1250, aed); // AED 12.50
//! let tax = cost.percent(Percentage::from_bps(700)).unwrap();
//! assert_eq!(tax.minor(), 88);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Divides with half-up rounding (away from zero on ties).
pub(crate) fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if (numerator < 0) != (denominator < 0) {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    }
}

/// Narrows an intermediate result back to minor units.
fn to_minor(value: Option<i128>) -> CoreResult<i64> {
    value
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| CoreError::invalid_value("Tax"))
}

// =============================================================================
// Currency
// =============================================================================

/// An ISO 4217 currency code.
///
/// Stored as three ASCII upper-case letters so the type stays `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Number of minor-unit digits used by this currency.
    ///
    /// Most currencies use 2; the exceptions below are the ones that show
    /// up in Gulf and Asian deployments.
    pub fn minor_digits(&self) -> u32 {
        match self.code() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "IQD" | "LYD" => 3,
            _ => 2,
        }
    }

    /// Returns the three-letter code.
    pub fn code(&self) -> &str {
        // Constructed only from validated ASCII letters
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }

    fn scale(&self) -> i128 {
        10_i128.pow(self.minor_digits())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(ValidationError::InvalidFormat {
                field: "currency".to_string(),
                reason: format!("'{}' is not a three-letter ISO code", s),
            });
        }
        Ok(Currency([bytes[0], bytes[1], bytes[2]]))
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.code())
    }
}

// =============================================================================
// Percentage
// =============================================================================

/// A percentage rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 700 bps = 7%, 825 bps = 8.25%
///
/// The default value is the zero percentage, which is also what rate
/// resolution returns when no rate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Percentage(u32);

impl Percentage {
    /// Creates a percentage from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percentage(bps)
    }

    /// Creates a percentage from a whole-number percent (7 → 7%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Percentage(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero percentage.
    #[inline]
    pub const fn zero() -> Self {
        Percentage(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Money
// =============================================================================

/// A monetary value in the smallest unit of its currency.
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values for reversals and deltas
/// - **Currency carried alongside**: conversion is explicit, never implied
/// - Arithmetic requires both sides to share a currency; a zero amount
///   adopts the currency of the other operand. [`Money::checked_add`] and
///   [`Money::checked_sub`] report a mismatch or overflow as an error, the
///   `+` and `-` operators panic on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    /// Creates a Money value from minor units (cents, fils, ...).
    #[inline]
    pub const fn from_minor(minor: i64, currency: Currency) -> Self {
        Money { minor, currency }
    }

    /// Zero in the given currency.
    #[inline]
    pub const fn zero(currency: Currency) -> Self {
        Money { minor: 0, currency }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the currency.
    #[inline]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Multiplies by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use levy_core::money::{Currency, Money};
    ///
    /// let usd: Currency = "USD".parse().unwrap();
    /// let line = Money::from_minor(299, usd).multiply_quantity(3).unwrap();
    /// assert_eq!(line.minor(), 897);
    /// ```
    pub fn multiply_quantity(&self, qty: i64) -> CoreResult<Self> {
        let minor = self
            .minor
            .checked_mul(qty)
            .ok_or_else(|| CoreError::invalid_value("Tax"))?;
        Ok(Money::from_minor(minor, self.currency))
    }

    /// Applies a percentage, rounding half up to the minor unit.
    ///
    /// `(minor × bps) / 10000`, computed in i128.
    pub fn percent(&self, rate: Percentage) -> CoreResult<Money> {
        self.percent_of_quantity(1, rate)
    }

    /// Applies a percentage to `quantity` units of this unit amount.
    ///
    /// Rounds once, after the multiplication, so a fractional minor unit per
    /// item does not accumulate.
    ///
    /// ## Returns
    /// * `Err(CoreError::InvalidValue)` - the tax does not fit in minor units
    pub fn percent_of_quantity(&self, quantity: i64, rate: Percentage) -> CoreResult<Money> {
        let raw = (self.minor as i128)
            .checked_mul(quantity as i128)
            .and_then(|v| v.checked_mul(rate.bps() as i128));
        let minor = to_minor(raw.map(|v| div_round_half_up(v, 10_000)))?;
        Ok(Money::from_minor(minor, self.currency))
    }

    /// Sum of two amounts of the same currency.
    pub fn checked_add(self, other: Money) -> CoreResult<Money> {
        let currency = self.unify(other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or_else(|| CoreError::invalid_value("Tax"))?;
        Ok(Money::from_minor(minor, currency))
    }

    /// Difference of two amounts of the same currency.
    pub fn checked_sub(self, other: Money) -> CoreResult<Money> {
        let currency = self.unify(other)?;
        let minor = self
            .minor
            .checked_sub(other.minor)
            .ok_or_else(|| CoreError::invalid_value("Tax"))?;
        Ok(Money::from_minor(minor, currency))
    }

    fn unify(self, other: Money) -> CoreResult<Currency> {
        if self.minor == 0 {
            Ok(other.currency)
        } else if other.minor == 0 || self.currency == other.currency {
            Ok(self.currency)
        } else {
            Err(CoreError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.currency.minor_digits();
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        if digits == 0 {
            return write!(f, "{} {}{}", self.currency, sign, abs);
        }
        let scale = 10_u64.pow(digits);
        write!(
            f,
            "{} {}{}.{:0width$}",
            self.currency,
            sign,
            abs / scale,
            abs % scale,
            width = digits as usize
        )
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        match self.checked_add(other) {
            Ok(sum) => sum,
            Err(e) => panic!("{self} + {other}: {e}"),
        }
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        match self.checked_sub(other) {
            Ok(difference) => difference,
            Err(e) => panic!("{self} - {other}: {e}"),
        }
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Money::from_minor(-self.minor, self.currency)
    }
}

// =============================================================================
// Currency Conversion
// =============================================================================

/// Converts amounts between currencies.
pub trait CurrencyConverter: Send + Sync {
    /// Converts `amount` into `to`. Same-currency conversion is the identity.
    fn convert(&self, amount: Money, to: Currency) -> CoreResult<Money>;
}

/// Exchange rates against a single base currency.
///
/// Each rate is the number of base units one unit of the foreign currency
/// buys, with 6 decimal places (`3_672_500` = 3.6725).
#[derive(Debug, Clone)]
pub struct ExchangeRates {
    base: Currency,
    rates: HashMap<Currency, i64>,
}

/// Fixed-point scale of exchange rates.
pub const RATE_SCALE: i64 = 1_000_000;

impl ExchangeRates {
    /// Creates a rate table with only the base currency.
    pub fn new(base: Currency) -> Self {
        ExchangeRates {
            base,
            rates: HashMap::new(),
        }
    }

    /// Sets the rate of `currency` against the base currency.
    pub fn with_rate(mut self, currency: Currency, rate_micros: i64) -> Self {
        self.rates.insert(currency, rate_micros);
        self
    }

    /// The base currency.
    pub fn base(&self) -> Currency {
        self.base
    }

    fn rate(&self, currency: Currency) -> Option<i64> {
        if currency == self.base {
            Some(RATE_SCALE)
        } else {
            self.rates.get(&currency).copied().filter(|r| *r > 0)
        }
    }
}

impl CurrencyConverter for ExchangeRates {
    fn convert(&self, amount: Money, to: Currency) -> CoreResult<Money> {
        let from = amount.currency();
        if from == to {
            return Ok(amount);
        }
        let missing = || CoreError::MissingExchangeRate {
            from: from.to_string(),
            to: to.to_string(),
        };
        let from_rate = self.rate(from).ok_or_else(missing)?;
        let to_rate = self.rate(to).ok_or_else(missing)?;

        // minor_to = minor_from × (from_rate / to_rate) × (scale_to / scale_from)
        let numerator = (amount.minor() as i128)
            .checked_mul(from_rate as i128)
            .and_then(|v| v.checked_mul(to.scale()));
        let denominator = to_rate as i128 * from.scale();
        let minor = to_minor(numerator.map(|n| div_round_half_up(n, denominator)))?;
        Ok(Money::from_minor(minor, to))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cur(code: &str) -> Currency {
        code.parse().unwrap()
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!(cur("aed").code(), "AED");
        assert!("AE".parse::<Currency>().is_err());
        assert!("A3D".parse::<Currency>().is_err());
        assert_eq!(cur("KWD").minor_digits(), 3);
        assert_eq!(cur("JPY").minor_digits(), 0);
        assert_eq!(cur("USD").minor_digits(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099, cur("USD")).to_string(), "USD 10.99");
        assert_eq!(Money::from_minor(-550, cur("USD")).to_string(), "USD -5.50");
        assert_eq!(Money::from_minor(1500, cur("KWD")).to_string(), "KWD 1.500");
        assert_eq!(Money::from_minor(1500, cur("JPY")).to_string(), "JPY 1500");
        assert_eq!(Percentage::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_percent_rounds_half_up() {
        let aed = cur("AED");
        // 12.50 × 7% = 0.875 → 0.88
        let tax = Money::from_minor(1250, aed).percent(Percentage::from_percent(7)).unwrap();
        assert_eq!(tax.minor(), 88);
        // Negative amounts round away from zero on ties
        let tax = Money::from_minor(-1250, aed).percent(Percentage::from_percent(7)).unwrap();
        assert_eq!(tax.minor(), -88);
    }

    #[test]
    fn test_percent_of_quantity_rounds_once() {
        let usd = cur("USD");
        // 0.05 × 7% = 0.0035 per unit; × 1000 units = 3.50
        let unit = Money::from_minor(5, usd);
        assert_eq!(unit.percent_of_quantity(1000, Percentage::from_percent(7)).unwrap().minor(), 350);
        // Rounding per unit would have given 0
        assert_eq!(unit.percent(Percentage::from_percent(7)).unwrap().minor(), 0);
    }

    #[test]
    fn test_oversized_amounts_are_rejected() {
        let aed = cur("AED");
        let huge = Money::from_minor(i64::MAX / 2, aed);

        let err = huge
            .percent_of_quantity(1_000, Percentage::from_percent(100))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { ref field } if field == "Tax"));
        assert!(huge.multiply_quantity(3).is_err());
        assert!(huge.checked_add(huge).and_then(|m| m.checked_add(huge)).is_err());

        // The largest amount that still fits
        let fits = huge.percent_of_quantity(2, Percentage::from_percent(100)).unwrap();
        assert_eq!(fits.minor(), i64::MAX - 1);
        assert_eq!(huge.multiply_quantity(2).unwrap().minor(), i64::MAX - 1);
    }

    #[test]
    fn test_checked_arithmetic_rejects_mixed_currencies() {
        let aed = Money::from_minor(700, cur("AED"));
        let usd = Money::from_minor(191, cur("USD"));

        let err = aed.checked_sub(usd).unwrap_err();
        assert!(matches!(err, CoreError::CurrencyMismatch { .. }));
        assert!(aed.checked_add(usd).is_err());
        assert_eq!(aed.checked_sub(Money::zero(cur("USD"))).unwrap(), aed);
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_operator_panics_on_mixed_currencies() {
        let _ = Money::from_minor(700, cur("AED")) - Money::from_minor(191, cur("USD"));
    }

    #[test]
    fn test_arithmetic_with_zero_adopts_currency() {
        let aed = cur("AED");
        let usd = cur("USD");
        let total = Money::zero(usd) + Money::from_minor(100, aed);
        assert_eq!(total.currency(), aed);
        assert_eq!((total - Money::from_minor(40, aed)).minor(), 60);
        assert_eq!((-total).minor(), -100);
    }

    #[test]
    fn test_conversion_via_base() {
        let aed = cur("AED");
        let usd = cur("USD");
        let kwd = cur("KWD");
        let rates = ExchangeRates::new(aed)
            .with_rate(usd, 3_672_500)
            .with_rate(kwd, 11_950_000);

        // USD 10.00 → AED 36.73 (36.725 rounded half up)
        let converted = rates.convert(Money::from_minor(1000, usd), aed).unwrap();
        assert_eq!(converted, Money::from_minor(3673, aed));

        // AED 11.95 → KWD 1.000
        let converted = rates.convert(Money::from_minor(1195, aed), kwd).unwrap();
        assert_eq!(converted, Money::from_minor(1000, kwd));

        // Identity
        let same = rates.convert(Money::from_minor(5, aed), aed).unwrap();
        assert_eq!(same.minor(), 5);
    }

    #[test]
    fn test_conversion_overflow() {
        let rates = ExchangeRates::new(cur("AED")).with_rate(cur("KWD"), 11_950_000);
        let err = rates
            .convert(Money::from_minor(i64::MAX, cur("KWD")), cur("AED"))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { .. }));
    }

    #[test]
    fn test_conversion_missing_rate() {
        let rates = ExchangeRates::new(cur("AED"));
        let err = rates
            .convert(Money::from_minor(100, cur("EUR")), cur("AED"))
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingExchangeRate { .. }));
    }
}
