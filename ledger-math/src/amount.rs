//! Amount module providing arbitrary precision arithmetic with commodity support
//!
//! Quantities are held as `BigRational` so sums never drift. Rounding only
//! happens when asked for, and always to the commodity's display precision
//! unless the amount is flagged to keep its full precision.
//!
//! Multiplication and division are asymmetric in their commodity: the result
//! carries the left operand's commodity, falling back to the right operand's
//! when the left has none. That is what lets a per-unit price times a share
//! count come out in the price's currency.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::commodity::{
    annotate_commodity, null_commodity, Annotation, Commodity, CommodityFlags, CommodityRef,
};

/// Precision type for tracking decimal places
pub type Precision = u16;

/// Extra digits kept by division so repeated cost math stays exact enough
pub const EXTEND_BY_DIGITS: Precision = 6;

const MAX_PRECISION: Precision = 1024;

/// Errors that can occur during amount operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot add or subtract amounts with different commodities: {0} and {1}")]
    CommodityMismatch(String, String),
    #[error("Cannot parse amount from string: {0}")]
    ParseError(String),
    #[error("Amount is null (uninitialized)")]
    NullAmount,
}

/// Result type for amount operations
pub type AmountResult<T> = Result<T, AmountError>;

/// An exact quantity, optionally denominated in a commodity
#[derive(Clone)]
pub struct Amount {
    quantity: Option<BigRational>,
    commodity: Option<CommodityRef>,
    precision: Precision,
    keep_precision: bool,
}

impl Amount {
    /// Create a null amount (uninitialized)
    pub fn null() -> Self {
        Self { quantity: None, commodity: None, precision: 0, keep_precision: false }
    }

    /// Create an amount from a BigRational value
    pub fn from_rational(rational: BigRational) -> Self {
        Self { quantity: Some(rational), commodity: None, precision: 0, keep_precision: false }
    }

    /// Create an amount from an integer
    pub fn from_i64(value: i64) -> Self {
        Self::from_rational(BigRational::from_integer(BigInt::from(value)))
    }

    /// Create an amount from a decimal, keeping its scale as precision
    pub fn from_decimal(decimal: Decimal) -> Self {
        let scale = decimal.scale();
        let denominator = BigInt::from(10).pow(scale);
        Self {
            quantity: Some(BigRational::new(BigInt::from(decimal.mantissa()), denominator)),
            commodity: None,
            precision: scale as Precision,
            keep_precision: false,
        }
    }

    /// Create an amount of `commodity`
    pub fn with_commodity(value: Decimal, commodity: CommodityRef) -> Self {
        let mut amount = Self::from_decimal(value);
        amount.set_commodity(commodity);
        amount
    }

    /// Parse a bare number such as `-12.50`
    pub fn parse(value_str: &str) -> AmountResult<Self> {
        let decimal = value_str
            .trim()
            .parse::<Decimal>()
            .map_err(|e| AmountError::ParseError(format!("{value_str}: {e}")))?;
        Ok(Self::from_decimal(decimal))
    }

    /// Parse a number that never rounds for display
    pub fn exact(value_str: &str) -> AmountResult<Self> {
        let mut amount = Self::parse(value_str)?;
        amount.keep_precision = true;
        Ok(amount)
    }

    /// Check if this amount is null (uninitialized)
    pub fn is_null(&self) -> bool {
        self.quantity.is_none()
    }

    /// Check if this amount is exactly zero
    pub fn is_realzero(&self) -> bool {
        self.quantity.as_ref().map_or(true, Zero::is_zero)
    }

    /// Check if this amount is zero once rounded to its display precision
    pub fn is_zero(&self) -> bool {
        if self.keep_precision || self.is_realzero() {
            return self.is_realzero();
        }
        self.rounded().is_realzero()
    }

    /// Check if this amount is non-zero
    pub fn is_nonzero(&self) -> bool {
        !self.is_zero()
    }

    /// Returns -1, 0, or 1
    pub fn sign(&self) -> i32 {
        match &self.quantity {
            Some(q) if q.is_positive() => 1,
            Some(q) if q.is_negative() => -1,
            _ => 0,
        }
    }

    /// Get the absolute value of this amount
    pub fn abs(&self) -> Self {
        let mut result = self.clone();
        if let Some(q) = &mut result.quantity {
            *q = q.abs();
        }
        result
    }

    /// Negate this amount in place
    pub fn in_place_negate(&mut self) {
        if let Some(q) = &mut self.quantity {
            *q = -&*q;
        }
    }

    /// Get the negated value of this amount
    pub fn negated(&self) -> Self {
        let mut result = self.clone();
        result.in_place_negate();
        result
    }

    /// Internal precision (decimal places seen so far)
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Check if this amount keeps full precision
    pub fn keep_precision(&self) -> bool {
        self.keep_precision
    }

    /// Set whether to keep full precision
    pub fn set_keep_precision(&mut self, keep: bool) {
        self.keep_precision = keep;
    }

    /// Precision used for rounding and printing
    pub fn display_precision(&self) -> Precision {
        match &self.commodity {
            Some(commodity) if !commodity.is_null() => {
                if self.keep_precision {
                    commodity.precision().max(self.precision)
                } else {
                    commodity.precision()
                }
            }
            _ => self.precision,
        }
    }

    /// Get the commodity reference
    pub fn commodity(&self) -> Option<&CommodityRef> {
        self.commodity.as_ref()
    }

    /// The commodity, with commodity-less amounts mapped to the null commodity
    pub fn commodity_or_null(&self) -> CommodityRef {
        self.commodity.clone().unwrap_or_else(null_commodity)
    }

    /// Check if this amount has a real (non-null) commodity
    pub fn has_commodity(&self) -> bool {
        self.commodity.as_ref().is_some_and(|c| !c.is_null())
    }

    /// Set the commodity for this amount
    pub fn set_commodity(&mut self, commodity: CommodityRef) {
        if self.quantity.is_none() {
            self.quantity = Some(BigRational::zero());
        }
        self.commodity = Some(commodity);
    }

    /// Clear the commodity from this amount
    pub fn clear_commodity(&mut self) {
        self.commodity = None;
    }

    /// Get a copy of this amount without commodity information
    pub fn number(&self) -> Self {
        let mut result = self.clone();
        result.clear_commodity();
        result
    }

    /// Check the amount's internal consistency
    pub fn valid(&self) -> bool {
        if self.quantity.is_none() && self.commodity.is_some() {
            return false;
        }
        self.precision <= MAX_PRECISION
    }

    /// Exact value, if not null
    pub fn to_rational(&self) -> Option<&BigRational> {
        self.quantity.as_ref()
    }

    /// Whether the commodity carries lot details
    pub fn is_annotated(&self) -> bool {
        self.commodity.as_ref().is_some_and(|c| c.is_annotated())
    }

    /// Lot details of the commodity, if any
    pub fn annotation(&self) -> Option<&Annotation> {
        self.commodity.as_ref().and_then(|c| c.annotation())
    }

    /// Copy of this amount whose commodity carries `annotation`
    pub fn annotated(&self, annotation: Annotation) -> Self {
        let mut result = self.clone();
        result.commodity = Some(annotate_commodity(&self.commodity_or_null(), annotation));
        result
    }

    /// Copy of this amount in the plain commodity
    pub fn strip_annotations(&self) -> Self {
        let mut result = self.clone();
        if let Some(commodity) = &self.commodity {
            result.commodity = Some(Commodity::base_of(commodity));
        }
        result
    }

    /// Add another amount to this amount (in-place)
    pub fn add_amount(&mut self, other: &Amount) -> AmountResult<()> {
        self.check_commodity_compatibility(other)?;

        let Some(b) = &other.quantity else {
            return Ok(());
        };
        let Some(a) = &self.quantity else {
            *self = other.clone();
            return Ok(());
        };

        self.quantity = Some(a + b);
        self.precision = self.precision.max(other.precision);
        if !self.has_commodity() && other.has_commodity() {
            self.commodity = other.commodity.clone();
        }
        Ok(())
    }

    /// Subtract another amount from this amount (in-place)
    pub fn sub_amount(&mut self, other: &Amount) -> AmountResult<()> {
        self.add_amount(&other.negated())
    }

    /// Multiply this amount by another amount (in-place); the result keeps
    /// this amount's commodity
    pub fn mul_amount(&mut self, other: &Amount) -> AmountResult<()> {
        let (Some(a), Some(b)) = (&self.quantity, &other.quantity) else {
            return Err(AmountError::NullAmount);
        };

        self.quantity = Some(a * b);
        self.precision = (self.precision + other.precision).min(MAX_PRECISION);
        if !self.has_commodity() {
            self.commodity = other.commodity.clone();
        }
        Ok(())
    }

    /// Divide this amount by another amount (in-place); the result keeps
    /// this amount's commodity
    pub fn div_amount(&mut self, other: &Amount) -> AmountResult<()> {
        let (Some(a), Some(b)) = (&self.quantity, &other.quantity) else {
            return Err(AmountError::NullAmount);
        };
        if b.is_zero() {
            return Err(AmountError::DivisionByZero);
        }

        self.quantity = Some(a / b);
        self.precision =
            (self.precision + other.precision + EXTEND_BY_DIGITS).min(MAX_PRECISION);
        if !self.has_commodity() {
            self.commodity = other.commodity.clone();
        }
        Ok(())
    }

    fn check_commodity_compatibility(&self, other: &Amount) -> AmountResult<()> {
        match (&self.commodity, &other.commodity) {
            (Some(a), Some(b)) if !a.is_null() && !b.is_null() && a != b => {
                Err(AmountError::CommodityMismatch(a.to_string(), b.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Round this amount to its display precision (in-place)
    pub fn in_place_round(&mut self) {
        if self.keep_precision {
            return;
        }
        let places = self.display_precision();
        self.in_place_roundto(places);
    }

    /// Round half away from zero to `places` decimal places
    pub fn in_place_roundto(&mut self, places: Precision) {
        if let Some(q) = &mut self.quantity {
            let scale = BigInt::from(10).pow(u32::from(places));
            let scaled = &*q * BigRational::from_integer(scale.clone());
            let half = BigRational::new(BigInt::one(), BigInt::from(2));
            let nudged = if scaled.is_negative() { scaled - half } else { scaled + half };
            *q = BigRational::new(nudged.to_integer(), scale);
            self.precision = places;
        }
    }

    /// Get the rounded version of this amount
    pub fn rounded(&self) -> Self {
        let mut result = self.clone();
        result.in_place_round();
        result
    }

    /// Get the rounded version of this amount to specific places
    pub fn roundto(&self, places: Precision) -> Self {
        let mut result = self.clone();
        result.in_place_roundto(places);
        result
    }

    /// Copy that prints and compares at full precision
    pub fn unrounded(&self) -> Self {
        let mut result = self.clone();
        result.keep_precision = true;
        result
    }

    /// Order by commodity first, then by quantity; null sorts lowest
    pub fn total_cmp(&self, other: &Amount) -> Ordering {
        self.commodity_or_null()
            .cmp(&other.commodity_or_null())
            .then_with(|| self.quantity.cmp(&other.quantity))
    }

    /// The quantity alone, formatted at display precision
    pub fn quantity_string(&self) -> String {
        let Some(q) = &self.quantity else {
            return String::new();
        };
        let places = if self.keep_precision {
            exact_places(q, self.precision).max(self.display_precision_floor())
        } else {
            self.display_precision()
        };
        format_rational(q, places)
    }

    fn display_precision_floor(&self) -> Precision {
        match &self.commodity {
            Some(commodity) if !commodity.is_null() => commodity.precision(),
            _ => 0,
        }
    }
}

/// Fewest decimal places (up to `limit`) that represent `q` exactly
fn exact_places(q: &BigRational, limit: Precision) -> Precision {
    let ten = BigRational::from_integer(BigInt::from(10));
    let mut scaled = q.clone();
    for places in 0..limit {
        if scaled.is_integer() {
            return places;
        }
        scaled = scaled * &ten;
    }
    limit
}

fn format_rational(q: &BigRational, places: Precision) -> String {
    let scale = BigInt::from(10).pow(u32::from(places));
    let scaled = q * BigRational::from_integer(scale.clone());
    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let nudged = if scaled.is_negative() { scaled - half } else { scaled + half };
    let units = nudged.to_integer();

    let magnitude = units.abs();
    let whole = &magnitude / &scale;
    let sign = if units.is_negative() { "-" } else { "" };
    if places == 0 {
        return format!("{sign}{whole}");
    }
    let frac = (&magnitude % &scale).to_string();
    format!("{sign}{whole}.{frac:0>width$}", width = usize::from(places))
}

impl Default for Amount {
    fn default() -> Self {
        Self::null()
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.quantity == other.quantity && self.commodity_or_null() == other.commodity_or_null()
    }
}

impl Eq for Amount {}

impl Hash for Amount {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.quantity.hash(state);
        self.commodity_or_null().hash(state);
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "<null>");
        }
        let quantity = self.quantity_string();
        match &self.commodity {
            Some(commodity) if !commodity.is_null() => {
                let base = commodity.referent();
                if base.has_flags(CommodityFlags::STYLE_SUFFIXED) {
                    write!(f, "{} {}", quantity, base.symbol())?;
                } else {
                    write!(f, "{}{}", base.symbol(), quantity)?;
                }
                if let Some(annotation) = commodity.annotation() {
                    write!(f, "{}", annotation)?;
                }
                Ok(())
            }
            _ => write!(f, "{}", quantity),
        }
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quantity {
            None => write!(f, "AMOUNT(<null>)"),
            Some(q) => write!(f, "AMOUNT({} = {})", self, q),
        }
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::from_decimal(value)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        self.negated()
    }
}

impl Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        self.negated()
    }
}

macro_rules! amount_binop {
    ($trait:ident, $method:ident, $inplace:ident) => {
        impl $trait<&Amount> for &Amount {
            type Output = AmountResult<Amount>;

            fn $method(self, rhs: &Amount) -> Self::Output {
                let mut result = self.clone();
                result.$inplace(rhs)?;
                Ok(result)
            }
        }

        impl $trait<Amount> for Amount {
            type Output = AmountResult<Amount>;

            fn $method(mut self, rhs: Amount) -> Self::Output {
                self.$inplace(&rhs)?;
                Ok(self)
            }
        }
    };
}

amount_binop!(Add, add, add_amount);
amount_binop!(Sub, sub, sub_amount);
amount_binop!(Mul, mul, mul_amount);
amount_binop!(Div, div, div_amount);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::CommodityPool;

    fn d(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    fn dollars(pool: &mut CommodityPool, value: &str) -> Amount {
        Amount::with_commodity(d(value), pool.create("$", 2))
    }

    #[test]
    fn test_null_and_zero() {
        let null = Amount::null();
        assert!(null.is_null());
        assert!(null.is_zero());
        assert_eq!(null.sign(), 0);

        let tiny = Amount::parse("0.001").unwrap();
        assert!(!tiny.is_zero());
        assert!(tiny.roundto(2).is_zero());
    }

    #[test]
    fn test_zero_at_display_precision() {
        let mut pool = CommodityPool::new();
        let dust = dollars(&mut pool, "0.004");
        assert!(dust.is_zero());
        assert!(!dust.is_realzero());
        assert!(!dust.unrounded().is_zero());
    }

    #[test]
    fn test_add_and_mismatch() {
        let mut pool = CommodityPool::new();
        let usd = dollars(&mut pool, "10.50");
        let more = dollars(&mut pool, "4.50");
        let eur = Amount::with_commodity(d("1"), pool.create("EUR", 2));

        assert_eq!((&usd + &more).unwrap(), dollars(&mut pool, "15"));
        assert!(matches!(&usd + &eur, Err(AmountError::CommodityMismatch(_, _))));
        assert_eq!((&usd - &usd).unwrap().sign(), 0);
    }

    #[test]
    fn test_mul_div_keep_left_commodity() {
        let mut pool = CommodityPool::new();
        let total = dollars(&mut pool, "300");
        let shares = Amount::with_commodity(d("2"), pool.find_or_create("AAPL"));

        let per_share = (&total / &shares).unwrap();
        assert_eq!(per_share.commodity().unwrap().symbol(), "$");
        assert_eq!(per_share, dollars(&mut pool, "150"));

        let back = (&per_share * &shares.negated()).unwrap();
        assert_eq!(back, dollars(&mut pool, "-300"));

        let scaled = (&Amount::parse("0.1").unwrap() * &total).unwrap();
        assert_eq!(scaled.commodity().unwrap().symbol(), "$");
    }

    #[test]
    fn test_division_by_zero() {
        let one = Amount::from_i64(1);
        assert_eq!((&one / &Amount::from_i64(0)).unwrap_err(), AmountError::DivisionByZero);
        assert_eq!((&one * &Amount::null()).unwrap_err(), AmountError::NullAmount);
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(Amount::parse("2.345").unwrap().roundto(2), Amount::parse("2.35").unwrap());
        assert_eq!(Amount::parse("-2.345").unwrap().roundto(2), Amount::parse("-2.35").unwrap());
        assert_eq!(Amount::parse("2.344").unwrap().roundto(2), Amount::parse("2.34").unwrap());
    }

    #[test]
    fn test_display() {
        let mut pool = CommodityPool::new();
        assert_eq!(dollars(&mut pool, "-12.5").to_string(), "$-12.50");

        let aapl = Amount::with_commodity(d("2"), pool.find_or_create("AAPL"));
        assert_eq!(aapl.to_string(), "2 AAPL");

        let third = (&dollars(&mut pool, "1") / &Amount::from_i64(3)).unwrap();
        assert_eq!(third.to_string(), "$0.33");
        assert_eq!(Amount::exact("1.250").unwrap().to_string(), "1.25");
        assert_eq!(Amount::null().to_string(), "<null>");
    }

    #[test]
    fn test_annotation_round_trip() {
        let mut pool = CommodityPool::new();
        let price = dollars(&mut pool, "150");
        let shares = Amount::with_commodity(d("2"), pool.find_or_create("AAPL"));

        let lot = shares.annotated(Annotation::with_price(price.clone()));
        assert!(lot.is_annotated());
        assert_eq!(lot.annotation().unwrap().price.as_ref(), Some(&price));
        assert_ne!(lot, shares);
        assert_eq!(lot.strip_annotations(), shares);
        assert_eq!(lot.to_string(), "2 AAPL {$150.00}");
    }
}
