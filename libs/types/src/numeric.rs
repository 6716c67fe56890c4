//! Fixed-point numeric types for prices, quantities and collateral amounts
//!
//! Prices and quantities use `rust_decimal` for deterministic arithmetic
//! (no floating-point errors). Collateral crosses into the ledger as an
//! [`Amount`] of native units, i.e. an integer count of the asset's
//! smallest unit. Products such as `quantity × price` are first expressed
//! at the 18-decimal internal scale ([`Wad`]) and must then be rescaled by
//! `10^(INTERNAL_SCALE − asset_decimals)`. Skipping that rescale inflates a
//! 6-decimal asset reservation by a factor of 10^12.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimals of the internal fixed-point scale.
pub const INTERNAL_SCALE: u32 = 18;

/// Largest asset precision the venue accepts.
pub const MAX_ASSET_DECIMALS: u32 = INTERNAL_SCALE;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("invalid decimal literal: {0}")]
    Parse(String),

    #[error("value must be non-negative: {0}")]
    Negative(String),

    #[error("value {value} has more than {max} decimals")]
    PrecisionLoss { value: String, max: u32 },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("asset decimals {0} exceed the internal scale")]
    UnsupportedDecimals(u32),

    #[error("amount {raw} at scale {scale} is not representable at {decimals} decimals")]
    Inexact { raw: u128, scale: u32, decimals: u32 },
}

/// Rounding direction when dropping precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Down,
    /// Away from zero; used for reservations so collateral is never short.
    Up,
}

fn pow10(exp: u32) -> Result<u128, NumericError> {
    10u128.checked_pow(exp).ok_or(NumericError::Overflow)
}

fn is_multiple(value: Decimal, step: Decimal) -> bool {
    !step.is_zero() && (value % step).is_zero()
}

// ── Price ───────────────────────────────────────────────────────────

/// Non-negative contract price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// # Panics
    /// Panics on a negative value; use [`Price::try_new`] for untrusted input.
    pub fn new(value: Decimal) -> Self {
        Self::try_new(value).expect("Price must be non-negative")
    }

    pub fn try_new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True if the price is an integer multiple of `tick`.
    pub fn is_multiple_of(&self, tick: Decimal) -> bool {
        is_multiple(self.0, tick)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| NumericError::Negative(value.to_string()))
    }
}

impl From<Price> for Decimal {
    fn from(value: Price) -> Self {
        value.0
    }
}

impl FromStr for Price {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(value).ok_or_else(|| NumericError::Negative(s.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Quantity ────────────────────────────────────────────────────────

/// Non-negative contract quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    /// # Panics
    /// Panics on a negative value; use [`Quantity::try_new`] for untrusted input.
    pub fn new(value: Decimal) -> Self {
        Self::try_new(value).expect("Quantity must be non-negative")
    }

    pub fn try_new(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True if the quantity is an integer multiple of `step`.
    pub fn is_multiple_of(&self, step: Decimal) -> bool {
        is_multiple(self.0, step)
    }

    /// `self − other`, or `None` if the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        Self::try_new(self.0 - other.0)
    }

    /// `self − other`, floored at zero.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        self.checked_sub(other).unwrap_or_else(Quantity::zero)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or_else(|| NumericError::Negative(value.to_string()))
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl FromStr for Quantity {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(value).ok_or_else(|| NumericError::Negative(s.to_string()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Amount ──────────────────────────────────────────────────────────

/// Collateral amount in an asset's native units (smallest indivisible unit).
///
/// This is the only unit the ledger accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    pub fn units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Whole-asset value for display, e.g. `1_000_000` at 6 decimals → `1.000000`.
    pub fn to_decimal(&self, asset_decimals: u32) -> Option<Decimal> {
        let mantissa = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(mantissa, asset_decimals).ok()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Wad (18-decimal internal scale) ─────────────────────────────────

/// Non-negative value at the 18-decimal internal scale.
///
/// `Wad(1_000_000_000_000_000_000)` is one whole unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Wad(u128);

impl Wad {
    pub const ONE: Wad = Wad(1_000_000_000_000_000_000);

    pub fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    /// Convert an exact decimal to the internal scale.
    ///
    /// Fails on negative values and on values finer than 18 decimals.
    pub fn from_decimal(value: Decimal) -> Result<Self, NumericError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(NumericError::Negative(value.to_string()));
        }
        let value = value.normalize();
        let scale = value.scale();
        if scale > INTERNAL_SCALE {
            return Err(NumericError::PrecisionLoss {
                value: value.to_string(),
                max: INTERNAL_SCALE,
            });
        }
        let mantissa = u128::try_from(value.mantissa()).map_err(|_| NumericError::Overflow)?;
        mantissa
            .checked_mul(pow10(INTERNAL_SCALE - scale)?)
            .map(Wad)
            .ok_or(NumericError::Overflow)
    }

    /// Internal-scale value of `a × b`, computed exactly before scaling.
    pub fn from_product(a: Decimal, b: Decimal) -> Result<Self, NumericError> {
        let product = a.checked_mul(b).ok_or(NumericError::Overflow)?;
        Self::from_decimal(product)
    }

    /// Rescale to the asset's native precision: divide by
    /// `10^(INTERNAL_SCALE − asset_decimals)`.
    pub fn to_native(&self, asset_decimals: u32, rounding: Rounding) -> Result<Amount, NumericError> {
        rescale(self.0, INTERNAL_SCALE, asset_decimals, rounding).map(Amount)
    }

    /// Rescale, failing if any precision would be dropped.
    pub fn to_native_exact(&self, asset_decimals: u32) -> Result<Amount, NumericError> {
        let down = self.to_native(asset_decimals, Rounding::Down)?;
        let up = self.to_native(asset_decimals, Rounding::Up)?;
        if down == up {
            Ok(down)
        } else {
            Err(NumericError::Inexact {
                raw: self.0,
                scale: INTERNAL_SCALE,
                decimals: asset_decimals,
            })
        }
    }
}

/// Move an integer from `from_scale` decimals to `to_scale` decimals.
pub fn rescale(raw: u128, from_scale: u32, to_scale: u32, rounding: Rounding) -> Result<u128, NumericError> {
    if to_scale > MAX_ASSET_DECIMALS {
        return Err(NumericError::UnsupportedDecimals(to_scale));
    }
    if to_scale >= from_scale {
        return raw
            .checked_mul(pow10(to_scale - from_scale)?)
            .ok_or(NumericError::Overflow);
    }
    let divisor = pow10(from_scale - to_scale)?;
    let quotient = raw / divisor;
    let remainder = raw % divisor;
    match rounding {
        Rounding::Up if remainder > 0 => quotient.checked_add(1).ok_or(NumericError::Overflow),
        _ => Ok(quotient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_parse_and_tick() {
        let price = Price::from_str("0.35").unwrap();
        assert!(price.is_multiple_of(Decimal::from_str_exact("0.01").unwrap()));
        assert!(!price.is_multiple_of(Decimal::from_str_exact("0.1").unwrap()));
        assert!(Price::from_str("-1").is_err());
        assert!(Price::from_str("abc").is_err());
    }

    #[test]
    fn test_quantity_arithmetic() {
        let a = Quantity::from_u64(10);
        let b = Quantity::from_u64(4);
        assert_eq!(a.checked_sub(b), Some(Quantity::from_u64(6)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), Quantity::zero());
        assert_eq!(a + b, Quantity::from_u64(14));
    }

    #[test]
    fn test_quantity_min_size_multiple() {
        let step = Decimal::from_str_exact("0.5").unwrap();
        assert!(Quantity::from_str("2.5").unwrap().is_multiple_of(step));
        assert!(!Quantity::from_str("2.2").unwrap().is_multiple_of(step));
        assert!(!Quantity::from_u64(1).is_multiple_of(Decimal::ZERO));
    }

    #[test]
    fn test_wad_from_decimal() {
        assert_eq!(Wad::from_decimal(Decimal::ONE).unwrap(), Wad::ONE);
        let half = Wad::from_decimal(Decimal::from_str_exact("0.5").unwrap()).unwrap();
        assert_eq!(half.raw(), 500_000_000_000_000_000);
        assert!(Wad::from_decimal(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_wad_rejects_sub_internal_precision() {
        let tiny = Decimal::from_i128_with_scale(1, 20);
        assert!(matches!(
            Wad::from_decimal(tiny),
            Err(NumericError::PrecisionLoss { .. })
        ));
    }

    #[test]
    fn test_rescale_to_six_decimal_asset() {
        // 100 units × 0.01 = 1.0 at the internal scale → 1.000000 of a 6-decimal asset
        let notional = Wad::from_product(
            Decimal::from(100),
            Decimal::from_str_exact("0.01").unwrap(),
        )
        .unwrap();
        assert_eq!(notional.raw(), 10u128.pow(18));

        let native = notional.to_native(6, Rounding::Up).unwrap();
        assert_eq!(native, Amount::new(1_000_000));
        assert_eq!(native.to_decimal(6), Some(Decimal::ONE));

        // Unscaled value would demand 10^12 times the collateral
        assert_eq!(notional.raw() / native.units(), 10u128.pow(12));
    }

    #[test]
    fn test_rescale_rounding() {
        let raw = 1_500_000_000_000u128; // 0.0000015 at 18 decimals
        let wad = Wad::from_raw(raw);
        assert_eq!(wad.to_native(6, Rounding::Down).unwrap(), Amount::new(1));
        assert_eq!(wad.to_native(6, Rounding::Up).unwrap(), Amount::new(2));
        assert!(wad.to_native_exact(6).is_err());
        assert_eq!(wad.to_native_exact(18).unwrap(), Amount::new(raw));
    }

    #[test]
    fn test_rescale_rejects_oversized_decimals() {
        assert_eq!(
            Wad::ONE.to_native(19, Rounding::Down),
            Err(NumericError::UnsupportedDecimals(19))
        );
    }

    #[test]
    fn test_amount_checked_ops() {
        let a = Amount::new(5);
        assert_eq!(a.checked_sub(Amount::new(6)), None);
        assert_eq!(a.checked_add(Amount::new(6)), Some(Amount::new(11)));
        assert_eq!(a.saturating_sub(Amount::new(6)), Amount::ZERO);
    }

    #[test]
    fn test_negative_price_and_quantity_rejected_on_the_wire() {
        assert!(serde_json::from_str::<Price>("\"-0.50\"").is_err());
        assert!(serde_json::from_str::<Quantity>("\"-5\"").is_err());

        let price: Price = serde_json::from_str("\"0.50\"").unwrap();
        assert_eq!(price, Price::from_str("0.50").unwrap());
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"0.50\"");
        let qty: Quantity = serde_json::from_str("\"5\"").unwrap();
        assert_eq!(qty, Quantity::from_u64(5));
    }

    #[test]
    fn test_amount_serialization() {
        let amount = Amount::new(1_000_000);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "1000000");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
