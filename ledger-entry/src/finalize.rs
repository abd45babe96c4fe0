//! Balancing an entry
//!
//! Finalize runs once per entry, after the pre-pass of automated entries and
//! before the post-pass. It works on a running [`Balance`] that has to come
//! back to zero:
//!
//! 1. sum the cost (or else the amount) of every balancing posting, noting
//!    the one posting without an amount, if any;
//! 2. give a lone posting a generated partner on the journal's basket account;
//! 3. let the posting without an amount absorb whatever is left, one
//!    generated posting per extra commodity;
//! 4. with no such posting and exactly two commodities, price every posting
//!    of the second commodity at the rate implied by the totals;
//! 5. exchange every posting that carries a cost, annotating plain amounts
//!    with their lot price and folding gain or loss of priced lots back in;
//! 6. round what is left and fail unless it is zero.
//!
//! The order in which postings and commodities are visited is observable:
//! balances iterate in commodity creation order and postings in entry order.

use chrono::NaiveDate;
use ledger_math::{exchange, Amount, Balance};
use log::debug;

use crate::entry::EntryBase;
use crate::error::{ContextError, EntryContext, Error, ErrorContext, Result, ValueContext};
use crate::journal::Journal;
use crate::posting::{Posting, XactFlags};

const TARGET: &str = "ledger.journal.finalize";

impl EntryBase {
    /// Resolve the missing amount, compute implied costs and check that the
    /// entry balances.
    ///
    /// `code` tags lots created from postings with a cost; `moment` dates
    /// them when the posting has no date of its own. On failure the entry may
    /// be partially modified and should be discarded.
    pub fn finalize(
        &mut self,
        journal: Option<&Journal>,
        code: Option<&str>,
        moment: Option<NaiveDate>,
    ) -> Result<()> {
        let (mut balance, mut null_xact) = self.initial_balance()?;
        debug!(target: TARGET, "initial balance = {:?}", balance);

        if self.xacts.len() == 1 {
            if let Some(basket) = journal.and_then(Journal::basket) {
                let mut generated = Posting::new(basket, XactFlags::GENERATED);
                generated.state = self.xacts[0].state;
                debug!(target: TARGET, "balancing lone posting against the basket account");
                null_xact = Some(self.xacts.len());
                self.add_xact(generated);
            }
        }

        if let Some(index) = null_xact {
            self.resolve_null_xact(index, &balance);
            balance = Balance::new();
        } else if balance.commodity_count() == 2 {
            self.assign_implied_costs(&mut balance)?;
        }

        self.reconcile_costs(&mut balance, code, moment)?;
        debug!(target: TARGET, "final balance = {:?}", balance);

        if !balance.is_empty() {
            balance.in_place_round();
            if !balance.is_zero() {
                let accounts = journal.map(|j| &j.accounts);
                let mut err = ContextError::new("Entry does not balance");
                err.push_back(ErrorContext::Entry(EntryContext::new(
                    "While balancing entry:",
                    self,
                    accounts,
                )));
                err.push_front(ErrorContext::Value(ValueContext::balance(
                    "Unbalanced remainder is:",
                    balance,
                )));
                return Err(Error::Balance(err));
            }
        }

        self.mark_finalized();
        Ok(())
    }

    /// Sum of cost-or-amount over balancing postings, plus the index of the
    /// single posting that has neither
    fn initial_balance(&self) -> Result<(Balance, Option<usize>)> {
        let mut balance = Balance::new();
        let mut null_xact = None;

        for (index, xact) in self.xacts.iter().enumerate() {
            if !xact.must_balance() {
                continue;
            }
            let value = match &xact.cost {
                Some(cost) => Some(cost),
                None => xact.amount.as_ref(),
            };
            match value.filter(|v| !v.is_null()) {
                Some(value) => balance.add_amount(value)?,
                None if null_xact.is_some() => {
                    let pos = self.pos.clone().unwrap_or_default();
                    return Err(Error::AmbiguousNull {
                        beg_line: pos.beg_line,
                        end_line: pos.end_line,
                    });
                }
                None => null_xact = Some(index),
            }
        }
        Ok((balance, null_xact))
    }

    /// The posting at `index` takes the negation of the first commodity in
    /// `balance`; each further commodity gets a generated posting on the
    /// same account.
    fn resolve_null_xact(&mut self, index: usize, balance: &Balance) {
        let account = self.xacts[index].account;
        let mut remainders = balance.amounts().map(|(_, amount)| amount.negated());

        match remainders.next() {
            Some(first) => {
                debug!(target: TARGET, "null posting receives {}", first);
                self.xacts[index].set_calculated_amount(first);
            }
            None => {
                debug!(target: TARGET, "null posting balances an empty entry");
                self.xacts[index].set_calculated_amount(Amount::from_i64(0));
            }
        }
        for remainder in remainders {
            debug!(target: TARGET, "generated posting receives {}", remainder);
            self.add_xact(Posting::with_amount(account, remainder, XactFlags::GENERATED));
        }
    }

    /// Price postings in the second commodity at `|x / y|`, where `x` and `y`
    /// are the two totals in balance order
    fn assign_implied_costs(&mut self, balance: &mut Balance) -> Result<()> {
        let (x, y) = {
            let mut totals = balance.amounts().map(|(_, amount)| amount.clone());
            match (totals.next(), totals.next()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Ok(()),
            }
        };
        if y.is_realzero() {
            return Ok(());
        }

        let rate = (&x / &y)?.abs();
        let commodity = x.commodity_or_null();
        debug!(target: TARGET, "implied rate = {} per {}", rate, y.commodity_or_null());

        for xact in self.xacts.iter_mut() {
            if xact.cost.is_some() || !xact.must_balance() {
                continue;
            }
            let Some(amount) = xact.amount.clone() else {
                continue;
            };
            if amount.commodity_or_null() == commodity {
                continue;
            }

            balance.subtract_amount(&amount)?;
            let cost = (&rate * &amount)?;
            debug!(target: TARGET, "{} costs {}", amount, cost);
            balance.add_amount(&cost)?;
            xact.set_calculated_cost(cost);
        }
        Ok(())
    }

    /// Exchange every posting with a cost. Plain amounts become priced lots;
    /// amounts already in a lot fold the difference between their recorded
    /// basis and this cost into the balance.
    fn reconcile_costs(
        &mut self,
        balance: &mut Balance,
        code: Option<&str>,
        moment: Option<NaiveDate>,
    ) -> Result<()> {
        for xact in self.xacts.iter_mut() {
            let (Some(amount), Some(cost)) = (&xact.amount, &xact.cost) else {
                continue;
            };
            debug_assert!(
                amount.commodity_or_null() != cost.commodity_or_null(),
                "posting cost must be in a different commodity than its amount"
            );

            let date = xact.effective_date.or(xact.actual_date).or(moment);
            let result = exchange(amount, cost, date, code)?;

            if amount.is_annotated() {
                let gain_loss = result.gain_loss()?;
                debug!(target: TARGET, "lot {} realizes {:?}", amount, gain_loss);
                balance.add_balance(&gain_loss)?;
            } else {
                xact.amount = Some(result.annotated);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::posting::{Position, XactState};
    use ledger_math::{Annotation, CommodityPool, Decimal};

    struct Fixture {
        journal: Journal,
        pool: CommodityPool,
    }

    impl Fixture {
        fn new() -> Self {
            Self { journal: Journal::new(), pool: CommodityPool::new() }
        }

        fn amount(&mut self, value: &str, symbol: &str) -> Amount {
            let decimal: Decimal = value.parse().unwrap();
            let precision = if symbol == "$" || symbol == "USD" || symbol == "EUR" { 2 } else { 0 };
            Amount::with_commodity(decimal, self.pool.create(symbol, precision))
        }

        fn post(&mut self, account: &str, amount: Option<Amount>) -> Posting {
            let account = self.journal.accounts.find_account(account, true).unwrap();
            match amount {
                Some(amount) => Posting::with_amount(account, amount, XactFlags::NORMAL),
                None => Posting::new(account, XactFlags::NORMAL),
            }
        }

        fn entry(&self, xacts: Vec<Posting>) -> Entry {
            let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
            let mut entry = Entry::new(date, "Test");
            for xact in xacts {
                entry.add_xact(xact);
            }
            entry
        }
    }

    #[test]
    fn test_balanced_entry_is_untouched() {
        let mut fx = Fixture::new();
        let a = fx.amount("-100", "$");
        let b = fx.amount("100", "$");
        let xacts = vec![fx.post("Assets:Cash", Some(a.clone())), fx.post("Expenses", Some(b.clone()))];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        assert_eq!(entry.xacts()[0].amount, Some(a));
        assert_eq!(entry.xacts()[1].amount, Some(b));
        assert!(!entry.xacts()[1].is_calculated());
        assert!(entry.base().is_finalized());
    }

    #[test]
    fn test_null_posting_takes_remainder() {
        let mut fx = Fixture::new();
        let a = fx.amount("-100", "$");
        let xacts = vec![fx.post("Assets:Cash", Some(a)), fx.post("Expenses", None)];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        let null = &entry.xacts()[1];
        assert_eq!(null.amount, Some(fx.amount("100", "$")));
        assert!(null.is_calculated());
    }

    #[test]
    fn test_null_posting_splits_per_commodity() {
        let mut fx = Fixture::new();
        let usd = fx.amount("-100", "USD");
        let eur = fx.amount("50", "EUR");
        let xacts = vec![
            fx.post("A", Some(usd)),
            fx.post("B", Some(eur)),
            fx.post("C", None),
        ];
        let mut entry = fx.entry(xacts);
        let null_id = entry.xacts()[2].id();

        entry.finalize(Some(&fx.journal)).unwrap();
        let xacts = entry.xacts();
        assert_eq!(xacts.len(), 4);
        assert_eq!(xacts[2].id(), null_id);
        assert_eq!(xacts[2].amount, Some(fx.amount("100", "USD")));
        assert_eq!(xacts[3].amount, Some(fx.amount("-50", "EUR")));
        assert_eq!(xacts[3].account, xacts[2].account);
        assert!(xacts[3].has_flags(XactFlags::GENERATED));
    }

    #[test]
    fn test_two_null_postings_are_ambiguous() {
        let mut fx = Fixture::new();
        let a = fx.amount("10", "$");
        let xacts = vec![fx.post("A", Some(a)), fx.post("B", None), fx.post("C", None)];
        let mut entry = fx.entry(xacts);
        entry.base_mut().pos = Some(Position::lines(7, 10));

        let err = entry.finalize(Some(&fx.journal)).unwrap_err();
        assert!(matches!(err, Error::AmbiguousNull { beg_line: 7, end_line: 10 }));
        assert!(entry.xacts()[1].amount.is_none());
        assert!(entry.xacts()[2].amount.is_none());
        assert!(!entry.base().is_finalized());
    }

    #[test]
    fn test_virtual_postings_do_not_balance() {
        let mut fx = Fixture::new();
        let a = fx.amount("10", "$");
        let b = fx.amount("-10", "$");
        let budget = fx.amount("500", "$");
        let mut xacts = vec![fx.post("A", Some(a)), fx.post("B", Some(b))];
        let account = fx.journal.accounts.find_account("Budget", true).unwrap();
        xacts.push(Posting::with_amount(account, budget, XactFlags::VIRTUAL));
        xacts.push(Posting::new(account, XactFlags::VIRTUAL));
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        assert!(entry.xacts()[3].amount.is_none());
    }

    #[test]
    fn test_lone_posting_uses_basket() {
        let mut fx = Fixture::new();
        let basket = fx.journal.accounts.find_account("Equity:Basket", true).unwrap();
        fx.journal.set_basket(Some(basket));
        let a = fx.amount("25", "$");
        let xacts = vec![fx.post("Assets:Cash", Some(a)).with_state(XactState::Cleared)];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        let generated = &entry.xacts()[1];
        assert_eq!(generated.account, basket);
        assert_eq!(generated.state, XactState::Cleared);
        assert_eq!(generated.amount, Some(fx.amount("-25", "$")));
        assert!(generated.has_flags(XactFlags::GENERATED | XactFlags::CALCULATED));
        assert_eq!(generated.entry, Some(entry.id()));
    }

    #[test]
    fn test_lone_posting_without_basket_fails() {
        let mut fx = Fixture::new();
        let a = fx.amount("25", "$");
        let xacts = vec![fx.post("Assets:Cash", Some(a))];
        let mut entry = fx.entry(xacts);

        let err = entry.finalize(Some(&fx.journal)).unwrap_err();
        assert!(matches!(err, Error::Balance(_)));
        assert_eq!(entry.xacts().len(), 1);
    }

    #[test]
    fn test_implied_exchange_rate() {
        let mut fx = Fixture::new();
        let usd = fx.amount("300", "USD");
        let shares = fx.amount("-2", "AAPL");
        let xacts = vec![fx.post("Assets:Brokerage", Some(shares)), fx.post("Assets:Cash", Some(usd))];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        let stock = &entry.xacts()[0];
        assert_eq!(stock.cost, Some(fx.amount("-300", "USD")));
        assert!(stock.has_flags(XactFlags::COST_CALCULATED));

        let lot = stock.amount.as_ref().unwrap();
        let annotation = lot.annotation().unwrap();
        assert_eq!(annotation.price, Some(fx.amount("150", "USD")));
        assert_eq!(annotation.date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(lot.strip_annotations(), fx.amount("-2", "AAPL"));
        assert!(entry.xacts()[1].cost.is_none());
    }

    #[test]
    fn test_explicit_cost_tags_lot_with_code() {
        let mut fx = Fixture::new();
        let cash = fx.amount("-1000", "$");
        let shares = fx.amount("10", "AAPL");
        let cost = fx.amount("1000", "$");
        let xacts = vec![fx.post("Assets:Brokerage", Some(shares)).with_cost(cost), fx.post("Assets:Cash", Some(cash))];
        let mut entry = fx.entry(xacts);
        entry.code = Some("T1".to_string());

        entry.finalize(Some(&fx.journal)).unwrap();
        let annotation = entry.xacts()[0].amount.as_ref().unwrap().annotation().unwrap().clone();
        assert_eq!(annotation.tag.as_deref(), Some("T1"));
        assert_eq!(annotation.price, Some(fx.amount("100", "$")));
    }

    #[test]
    fn test_sale_of_lot_folds_gain_into_balance() {
        let mut fx = Fixture::new();
        let bought_at = fx.amount("100", "$");
        let lot = fx.amount("-2", "AAPL").annotated(Annotation::with_price(bought_at));
        let proceeds = fx.amount("-300", "$");
        let cash = fx.amount("300", "$");
        let gain = fx.amount("-100", "$");
        let xacts = vec![
            fx.post("Assets:Brokerage", Some(lot.clone())).with_cost(proceeds),
            fx.post("Assets:Cash", Some(cash)),
            fx.post("Income:Gains", Some(gain)),
        ];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        assert_eq!(entry.xacts()[0].amount, Some(lot));
    }

    #[test]
    fn test_lot_priced_in_other_currency_reports_remainder() {
        let mut fx = Fixture::new();
        let bought_at = fx.amount("100", "EUR");
        let lot = fx.amount("-2", "AAPL").annotated(Annotation::with_price(bought_at));
        let proceeds = fx.amount("-300", "$");
        let cash = fx.amount("300", "$");
        let xacts = vec![
            fx.post("Assets:Brokerage", Some(lot)).with_cost(proceeds),
            fx.post("Assets:Cash", Some(cash)),
        ];
        let mut entry = fx.entry(xacts);

        let err = entry.finalize(Some(&fx.journal)).unwrap_err();
        assert!(matches!(err, Error::Balance(_)), "{err:?}");
        let described = err.describe();
        assert!(described.contains("-200.00 EUR"), "{described}");
        assert!(described.contains("$300.00"), "{described}");
    }

    #[test]
    fn test_lot_sale_at_rounded_price_balances() {
        let mut fx = Fixture::new();
        let shares = fx.amount("3", "AAPL");
        let paid = fx.amount("100", "$");
        let cash = fx.amount("-100", "$");
        let xacts = vec![
            fx.post("Assets:Brokerage", Some(shares)).with_cost(paid),
            fx.post("Assets:Cash", Some(cash)),
        ];
        let mut purchase = fx.entry(xacts);
        purchase.finalize(Some(&fx.journal)).unwrap();
        let annotation =
            purchase.xacts()[0].amount.as_ref().unwrap().annotation().unwrap().clone();

        let lot = fx.amount("-1", "AAPL").annotated(annotation);
        let proceeds = fx.amount("-33.33", "$");
        let cash = fx.amount("33.33", "$");
        let xacts = vec![
            fx.post("Assets:Brokerage", Some(lot.clone())).with_cost(proceeds),
            fx.post("Assets:Cash", Some(cash)),
        ];
        let mut sale = fx.entry(xacts);

        sale.finalize(Some(&fx.journal)).unwrap();
        assert_eq!(sale.xacts()[0].amount, Some(lot));
    }

    #[test]
    fn test_implied_cost_in_lot_commodity_fails_to_balance() {
        let mut fx = Fixture::new();
        let bought_at = fx.amount("100", "$");
        let plain = fx.amount("1", "AAPL");
        let lot = fx.amount("-1", "AAPL").annotated(Annotation::with_price(bought_at));
        let xacts = vec![fx.post("A", Some(plain)), fx.post("B", Some(lot))];
        let mut entry = fx.entry(xacts);

        let err = entry.finalize(Some(&fx.journal)).unwrap_err();
        assert!(matches!(err, Error::Balance(_)), "{err:?}");
        assert!(entry.xacts()[1].has_flags(XactFlags::COST_CALCULATED));
    }

    #[test]
    fn test_unbalanced_entry_reports_remainder() {
        let mut fx = Fixture::new();
        let a = fx.amount("-100", "$");
        let b = fx.amount("90", "$");
        let xacts = vec![fx.post("Assets:Cash", Some(a)), fx.post("Expenses:Food", Some(b))];
        let mut entry = fx.entry(xacts);
        entry.base_mut().pos = Some(Position::lines(3, 5));

        let err = entry.finalize(Some(&fx.journal)).unwrap_err();
        insta::assert_snapshot!(err.describe(), @r"
        Unbalanced remainder is:
                 $-10.00
        While balancing entry at lines 3-5:
        2024/01/15 Test
            Assets:Cash        $-100.00
            Expenses:Food        $90.00
        Error: Entry does not balance
        ");
    }

    #[test]
    fn test_rounding_absorbs_dust() {
        let mut fx = Fixture::new();
        let a = fx.amount("-10.001", "$");
        let b = fx.amount("10", "$");
        let xacts = vec![fx.post("A", Some(a)), fx.post("B", Some(b))];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
    }

    #[test]
    fn test_null_posting_against_empty_balance() {
        let mut fx = Fixture::new();
        let xacts = vec![fx.post("A", None)];
        let mut entry = fx.entry(xacts);

        entry.finalize(Some(&fx.journal)).unwrap();
        let xact = &entry.xacts()[0];
        assert!(xact.amount.as_ref().unwrap().is_realzero());
        assert!(xact.is_calculated());
    }
}
