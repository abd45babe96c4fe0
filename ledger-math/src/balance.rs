//! Balance module providing a multi-commodity amounts container
//!
//! A balance keeps one running amount per commodity. Entries are kept in a
//! `BTreeMap` keyed by commodity, so iteration order is the commodity pool's
//! creation order and is stable across runs. Components that cancel out to
//! exactly zero are removed.

use std::collections::BTreeMap;
use std::fmt;

use crate::amount::{Amount, AmountError, Precision};
use crate::commodity::CommodityRef;

/// Error type for balance operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalanceError {
    /// Cannot add an uninitialized amount to a balance
    #[error("Cannot add an uninitialized amount to a balance")]
    NullAmount,

    /// Cannot convert empty balance to amount
    #[error("Cannot convert an empty balance to an amount")]
    EmptyToAmount,

    /// Cannot convert multi-commodity balance to amount
    #[error("Cannot convert a balance with multiple commodities to an amount")]
    MultiCommodityToAmount,

    /// Amount operation error
    #[error("Amount operation failed: {0}")]
    AmountError(#[from] AmountError),
}

/// Result type for balance operations
pub type BalanceResult<T> = Result<T, BalanceError>;

/// Running per-commodity sums
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Balance {
    amounts: BTreeMap<CommodityRef, Amount>,
}

impl Balance {
    /// Create a new empty balance
    pub fn new() -> Self {
        Self { amounts: BTreeMap::new() }
    }

    /// Create a balance holding a single amount
    pub fn from_amount(amount: Amount) -> BalanceResult<Self> {
        let mut balance = Self::new();
        balance.add_amount(&amount)?;
        Ok(balance)
    }

    /// Add an amount to the component of its commodity
    pub fn add_amount(&mut self, amount: &Amount) -> BalanceResult<()> {
        if amount.is_null() {
            return Err(BalanceError::NullAmount);
        }
        if amount.is_realzero() {
            return Ok(());
        }

        let key = amount.commodity_or_null();
        match self.amounts.get_mut(&key) {
            Some(existing) => {
                existing.add_amount(amount)?;
                if existing.is_realzero() {
                    self.amounts.remove(&key);
                }
            }
            None => {
                self.amounts.insert(key, amount.clone());
            }
        }
        Ok(())
    }

    /// Subtract an amount from the component of its commodity
    pub fn subtract_amount(&mut self, amount: &Amount) -> BalanceResult<()> {
        if amount.is_null() {
            return Err(BalanceError::NullAmount);
        }
        self.add_amount(&amount.negated())
    }

    /// Add every component of another balance
    pub fn add_balance(&mut self, other: &Balance) -> BalanceResult<()> {
        other.amounts.values().try_for_each(|amount| self.add_amount(amount))
    }

    /// True when the balance holds no components at all
    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    /// True when every component is zero at its commodity's precision
    pub fn is_zero(&self) -> bool {
        self.amounts
            .values()
            .all(|amount| amount.roundto(commodity_places(amount)).is_realzero())
    }

    /// True when every component is exactly zero
    pub fn is_realzero(&self) -> bool {
        self.amounts.values().all(Amount::is_realzero)
    }

    /// Number of commodities held
    pub fn commodity_count(&self) -> usize {
        self.amounts.len()
    }

    /// Whether the balance has a single commodity
    pub fn single_amount(&self) -> bool {
        self.amounts.len() == 1
    }

    /// The sole component of a single-commodity balance
    pub fn to_amount(&self) -> BalanceResult<Amount> {
        let mut values = self.amounts.values();
        match (values.next(), values.next()) {
            (None, _) => Err(BalanceError::EmptyToAmount),
            (Some(amount), None) => Ok(amount.clone()),
            (Some(_), Some(_)) => Err(BalanceError::MultiCommodityToAmount),
        }
    }

    /// Components in commodity order
    pub fn amounts(&self) -> impl Iterator<Item = (&CommodityRef, &Amount)> {
        self.amounts.iter()
    }

    /// Component for one commodity
    pub fn amount_for(&self, commodity: &CommodityRef) -> Option<&Amount> {
        self.amounts.get(commodity)
    }

    /// Round each component to its commodity's precision, dropping zeros.
    /// Amounts that keep full precision are rounded too.
    pub fn in_place_round(&mut self) {
        for amount in self.amounts.values_mut() {
            let places = commodity_places(amount);
            amount.in_place_roundto(places);
        }
        self.amounts.retain(|_, amount| !amount.is_realzero());
    }

    /// Get the rounded version of this balance
    pub fn rounded(&self) -> Self {
        let mut result = self.clone();
        result.in_place_round();
        result
    }

    /// Negate every component
    pub fn negated(&self) -> Self {
        let amounts = self.amounts.iter().map(|(c, a)| (c.clone(), a.negated())).collect();
        Self { amounts }
    }
}

fn commodity_places(amount: &Amount) -> Precision {
    match amount.commodity() {
        Some(commodity) if !commodity.is_null() => commodity.precision(),
        _ => amount.precision(),
    }
}

impl TryFrom<Amount> for Balance {
    type Error = BalanceError;

    fn try_from(amount: Amount) -> BalanceResult<Self> {
        Self::from_amount(amount)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amounts.is_empty() {
            return write!(f, "0");
        }
        let mut first = true;
        for amount in self.amounts.values() {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", amount)?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BALANCE(")?;
        let mut first = true;
        for amount in self.amounts.values() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", amount)?;
            first = false;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::CommodityPool;
    use rust_decimal::Decimal;

    fn amount(pool: &mut CommodityPool, value: &str, symbol: &str) -> Amount {
        let decimal: Decimal = value.parse().unwrap();
        Amount::with_commodity(decimal, pool.create(symbol, 2))
    }

    #[test]
    fn test_components_cancel() {
        let mut pool = CommodityPool::new();
        let mut balance = Balance::new();
        balance.add_amount(&amount(&mut pool, "10.00", "$")).unwrap();
        balance.add_amount(&amount(&mut pool, "5", "EUR")).unwrap();
        assert_eq!(balance.commodity_count(), 2);

        balance.subtract_amount(&amount(&mut pool, "10", "$")).unwrap();
        assert_eq!(balance.commodity_count(), 1);
        assert_eq!(balance.to_amount().unwrap(), amount(&mut pool, "5", "EUR"));
    }

    #[test]
    fn test_iteration_follows_creation_order() {
        let mut pool = CommodityPool::new();
        let usd = amount(&mut pool, "1", "USD");
        let aapl = amount(&mut pool, "1", "AAPL");
        let eur = amount(&mut pool, "1", "EUR");

        let mut balance = Balance::new();
        for a in [&eur, &aapl, &usd] {
            balance.add_amount(a).unwrap();
        }
        let symbols: Vec<_> = balance.amounts().map(|(c, _)| c.symbol().to_string()).collect();
        assert_eq!(symbols, ["USD", "AAPL", "EUR"]);
    }

    #[test]
    fn test_null_amount_rejected() {
        let mut balance = Balance::new();
        assert_eq!(balance.add_amount(&Amount::null()), Err(BalanceError::NullAmount));
        assert_eq!(balance.to_amount(), Err(BalanceError::EmptyToAmount));
    }

    #[test]
    fn test_round_drops_dust() {
        let mut pool = CommodityPool::new();
        let mut balance = Balance::new();
        balance.add_amount(&amount(&mut pool, "0.001", "$")).unwrap();
        balance.add_amount(&amount(&mut pool, "2.5", "EUR")).unwrap();
        assert!(!balance.is_realzero());

        balance.in_place_round();
        assert_eq!(balance.commodity_count(), 1);
        assert_eq!(format!("{:?}", balance), "BALANCE(2.50 EUR)");
    }

    #[test]
    fn test_round_ignores_keep_precision() {
        let mut pool = CommodityPool::new();
        let mut balance = Balance::new();
        let dust = amount(&mut pool, "-0.003333", "$").unrounded();
        balance.add_amount(&dust).unwrap();
        assert!(balance.is_zero());
        assert!(!balance.is_realzero());

        balance.add_amount(&amount(&mut pool, "1.004", "$").unrounded()).unwrap();
        balance.in_place_round();
        assert_eq!(balance.to_amount().unwrap(), amount(&mut pool, "1", "$"));
    }

    #[test]
    fn test_display_multi_line() {
        let mut pool = CommodityPool::new();
        let mut balance = Balance::new();
        balance.add_amount(&amount(&mut pool, "-3", "$")).unwrap();
        balance.add_amount(&amount(&mut pool, "4", "EUR")).unwrap();
        assert_eq!(balance.to_string(), "$-3.00\n4.00 EUR");
        assert_eq!(Balance::new().to_string(), "0");
        assert!(balance.negated().add_balance(&balance).is_ok());
    }
}
