//! Commodity exchange: turning a posting's quantity and total cost into a
//! priced lot.

use chrono::NaiveDate;
use log::trace;

use crate::amount::{Amount, AmountResult};
use crate::balance::{Balance, BalanceResult};
use crate::commodity::{Annotation, AnnotationFlags};

/// Outcome of exchanging an amount for a total cost
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// The amount re-expressed in a lot annotated with per-unit price,
    /// acquisition date and tag
    pub annotated: Amount,
    /// The total cost as given
    pub final_cost: Amount,
    /// What the amount cost originally; the lot price times the amount when
    /// the amount already carried a price, otherwise the final cost
    pub basis_cost: Amount,
}

impl Exchange {
    /// Gain (positive) or loss realized by this exchange, as
    /// `basis_cost - final_cost`. The two may be in different commodities,
    /// in which case both stay in the result.
    pub fn gain_loss(&self) -> BalanceResult<Balance> {
        let mut result = Balance::new();
        result.add_amount(&self.basis_cost)?;
        result.subtract_amount(&self.final_cost)?;
        Ok(result)
    }
}

/// Exchange `amount` for `total_cost` at `moment`, tagging the lot with
/// `tag`.
///
/// The per-unit price is `total_cost / amount` and is kept unrounded.
/// Market price history is not recorded.
pub fn exchange(
    amount: &Amount,
    total_cost: &Amount,
    moment: Option<NaiveDate>,
    tag: Option<&str>,
) -> AmountResult<Exchange> {
    let per_unit = (total_cost / amount)?.unrounded();

    let basis_cost = match amount.annotation().and_then(|a| a.price.as_ref()) {
        Some(price) => (price * amount)?,
        None => total_cost.clone(),
    };

    let mut flags = AnnotationFlags::PRICE_CALCULATED;
    if moment.is_some() {
        flags |= AnnotationFlags::DATE_CALCULATED;
    }
    if tag.is_some() {
        flags |= AnnotationFlags::TAG_CALCULATED;
    }
    let annotation = Annotation {
        price: Some(per_unit),
        date: moment,
        tag: tag.map(str::to_string),
        flags,
    };

    let annotated = amount.strip_annotations().annotated(annotation);
    trace!(target: "ledger.math.exchange", "{} for {} -> {}", amount, total_cost, annotated);

    Ok(Exchange { annotated, final_cost: total_cost.clone(), basis_cost })
}
